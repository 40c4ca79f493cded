//! Backend capability probes
//!
//! What a rendering backend can do: the API major version it was created
//! with, which optional extensions are present, and the uniform block size
//! limit. The resolver reads these once at setup.

use serde::{Deserialize, Serialize};

/// Default `MAX_UNIFORM_BLOCK_SIZE` in bytes (the minimum a version 2 context guarantees)
pub const DEFAULT_MAX_UNIFORM_BLOCK_SIZE: usize = 16_384;

/// Major version of the rendering API
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ApiVersion {
    /// Version 1: no uniform buffers, 32-bit indices only via extension
    #[default]
    V1,
    /// Version 2: uniform buffers and 32-bit indices in core
    V2,
}

impl ApiVersion {
    /// Numeric major version
    pub const fn major(self) -> u32 {
        match self {
            Self::V1 => 1,
            Self::V2 => 2,
        }
    }

    /// Parse a major version, `None` for anything but 1 or 2
    pub const fn from_major(major: u32) -> Option<Self> {
        match major {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            _ => None,
        }
    }
}

impl TryFrom<u32> for ApiVersion {
    type Error = String;

    fn try_from(major: u32) -> Result<Self, Self::Error> {
        Self::from_major(major).ok_or_else(|| format!("unsupported API major version {major}"))
    }
}

impl From<ApiVersion> for u32 {
    fn from(version: ApiVersion) -> Self {
        version.major()
    }
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.major())
    }
}

bitflags::bitflags! {
    /// Optional extensions a backend may expose
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Extensions: u32 {
        /// Batched indexed draws (`WEBGL_multi_draw`)
        const MULTI_DRAW = 1 << 0;
        /// Single indexed draw with base vertex / base instance
        const DRAW_BASE_VERTEX_BASE_INSTANCE = 1 << 1;
        /// Batched indexed draws with base vertex / base instance
        const MULTI_DRAW_BASE_VERTEX_BASE_INSTANCE = 1 << 2;
        /// 32-bit element indices on version 1 (`OES_element_index_uint`)
        const ELEMENT_INDEX_UINT = 1 << 3;
    }
}

impl Extensions {
    /// Map a backend extension name to its flag
    pub fn from_extension_name(name: &str) -> Option<Self> {
        match name {
            "WEBGL_multi_draw" => Some(Self::MULTI_DRAW),
            "WEBGL_draw_instanced_base_vertex_base_instance" => {
                Some(Self::DRAW_BASE_VERTEX_BASE_INSTANCE)
            }
            "WEBGL_multi_draw_instanced_base_vertex_base_instance" => {
                Some(Self::MULTI_DRAW_BASE_VERTEX_BASE_INSTANCE)
            }
            "OES_element_index_uint" => Some(Self::ELEMENT_INDEX_UINT),
            _ => None,
        }
    }

    /// Extension name for a single flag
    pub fn name(self) -> &'static str {
        if self == Self::MULTI_DRAW {
            "WEBGL_multi_draw"
        } else if self == Self::DRAW_BASE_VERTEX_BASE_INSTANCE {
            "WEBGL_draw_instanced_base_vertex_base_instance"
        } else if self == Self::MULTI_DRAW_BASE_VERTEX_BASE_INSTANCE {
            "WEBGL_multi_draw_instanced_base_vertex_base_instance"
        } else if self == Self::ELEMENT_INDEX_UINT {
            "OES_element_index_uint"
        } else {
            "<extension set>"
        }
    }
}

/// Everything the resolver needs to know about a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// API major version of the created context
    pub api_version: ApiVersion,
    /// Extensions that were successfully enabled
    pub extensions: Extensions,
    /// Maximum size of one uniform block in bytes
    pub max_uniform_block_size: usize,
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self {
            api_version: ApiVersion::V1,
            extensions: Extensions::empty(),
            max_uniform_block_size: DEFAULT_MAX_UNIFORM_BLOCK_SIZE,
        }
    }
}

impl BackendCapabilities {
    /// Whether every flag in `extensions` is available
    pub fn supports(&self, extensions: Extensions) -> bool {
        self.extensions.contains(extensions)
    }

    /// Whether 32-bit element indices can be used
    pub fn supports_wide_indices(&self) -> bool {
        self.api_version >= ApiVersion::V2 || self.supports(Extensions::ELEMENT_INDEX_UINT)
    }

    /// Build capabilities from a serialized profile
    ///
    /// Unknown extension names are skipped with a warning.
    pub fn from_profile(profile: &BackendProfile) -> Self {
        let mut extensions = Extensions::empty();
        for name in &profile.extensions {
            match Extensions::from_extension_name(name) {
                Some(flag) => extensions |= flag,
                None => log::warn!("Ignoring unknown extension '{}' in backend profile", name),
            }
        }

        Self {
            api_version: profile.api_version,
            extensions,
            max_uniform_block_size: profile.max_uniform_block_size,
        }
    }
}

/// Serializable description of a backend, used to configure headless runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendProfile {
    /// API major version the backend provides
    pub api_version: ApiVersion,
    /// Extension names the backend exposes
    pub extensions: Vec<String>,
    /// Maximum uniform block size in bytes
    pub max_uniform_block_size: usize,
}

impl Default for BackendProfile {
    fn default() -> Self {
        Self {
            api_version: ApiVersion::V2,
            extensions: vec![
                "WEBGL_multi_draw".to_string(),
                "WEBGL_draw_instanced_base_vertex_base_instance".to_string(),
                "WEBGL_multi_draw_instanced_base_vertex_base_instance".to_string(),
            ],
            max_uniform_block_size: DEFAULT_MAX_UNIFORM_BLOCK_SIZE,
        }
    }
}
