//! Capability Resolution
//!
//! Turns the requested feature flags into a configuration the backend can
//! actually run. Nothing here is fatal: every unsupported combination is
//! demoted to a weaker mode and reported as a [`Downgrade`], down to the
//! separate-uniform path that every backend supports.
//!
//! Rules are applied in a fixed order, each one seeing the result of the
//! previous ones:
//!
//! ```text
//! api version clamp
//!   → base vertex needs its extension (multi or single, per multi-draw flag)
//!   → multi-draw needs its extension (base vertex re-checked if demoted)
//!   → uniform blocks need version 2, a usable block size, and multi-draw
//!   → multi-draw alone picks an upload mode (blocks on version 2, else attributes)
//!   → base vertex needs a buffer-backed upload mode
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::batch::pool::{index_format_for, TRANSFORM_RECORD_BYTES};
use crate::batch::strategy::SubmissionStrategy;
use crate::render::backend::{IndexFormat, ShaderVariant};
use crate::render::capabilities::{ApiVersion, BackendCapabilities, Extensions};

/// Feature flags as requested by the configuration source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestedFeatures {
    /// Upload transforms as per-vertex attributes
    pub use_attributes: bool,
    /// Upload transforms as uniform block arrays
    pub use_uniform_blocks: bool,
    /// Batch draws through the multi-draw extension
    pub use_multi_draw: bool,
    /// Use base-vertex/base-instance draws instead of index remapping
    pub use_base_vertex_base_instance: bool,
    /// Requested API major version
    pub api_version: ApiVersion,
}

/// How per-object transform parameters reach the shader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadMode {
    /// Six scalar uniforms pushed before every draw
    SeparateUniforms,
    /// Per-vertex attributes in a static vertex buffer
    Attributes,
    /// Uniform block arrays indexed by draw id
    UniformBlocks,
}

/// A requested feature that was turned off or replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Downgrade {
    /// The backend offers an older API version than requested
    ApiVersion {
        /// Version asked for
        requested: ApiVersion,
        /// Version the backend has
        available: ApiVersion,
    },
    /// Base-vertex drawing disabled, the named extension is missing
    BaseVertexUnavailable {
        /// Missing extension
        extension: &'static str,
    },
    /// Multi-draw disabled, the extension is missing
    MultiDrawUnavailable,
    /// Uniform blocks disabled, they need API version 2
    UniformBlocksNeedApiV2,
    /// Uniform blocks disabled, not even one record fits in a block
    UniformBlocksTooSmall {
        /// Reported `MAX_UNIFORM_BLOCK_SIZE`
        max_uniform_block_size: usize,
    },
    /// Uniform blocks disabled, they are only drawn through multi-draw
    UniformBlocksNeedMultiDraw,
    /// Multi-draw was requested without a buffer-backed upload mode
    DefaultedUploadMode(UploadMode),
    /// Both buffer-backed modes were requested; uniform blocks win
    AttributesSuperseded,
    /// Base-vertex drawing disabled, separate uniforms draw by slot offset
    BaseVertexNeedsBufferUpload,
}

impl fmt::Display for Downgrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiVersion { requested, available } => write!(
                f,
                "API version {requested} unavailable, falling back to version {available}"
            ),
            Self::BaseVertexUnavailable { extension } => write!(
                f,
                "Disabling use_base_vertex_base_instance: {extension} not available"
            ),
            Self::MultiDrawUnavailable => {
                write!(f, "Disabling use_multi_draw: WEBGL_multi_draw not available")
            }
            Self::UniformBlocksNeedApiV2 => {
                write!(f, "Disabling use_ubos: API version is not 2")
            }
            Self::UniformBlocksTooSmall { max_uniform_block_size } => write!(
                f,
                "Disabling use_ubos: uniform block size {max_uniform_block_size} holds no draw record"
            ),
            Self::UniformBlocksNeedMultiDraw => {
                write!(f, "Disabling use_ubos: use_multi_draw not enabled")
            }
            Self::DefaultedUploadMode(UploadMode::UniformBlocks) => {
                write!(f, "Defaulting to use_ubos")
            }
            Self::DefaultedUploadMode(_) => write!(f, "Defaulting to use_attributes"),
            Self::AttributesSuperseded => {
                write!(f, "Ignoring use_attributes: use_ubos takes precedence")
            }
            Self::BaseVertexNeedsBufferUpload => write!(
                f,
                "Disabling use_base_vertex_base_instance: separate uniforms draw by slot"
            ),
        }
    }
}

/// Validated, internally consistent configuration, fixed for the stage's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// API version after clamping to the backend
    pub api_version: ApiVersion,
    /// Submission path; also determines upload mode and draw flags
    pub strategy: SubmissionStrategy,
    /// Records per uniform block (`MAX_UNIFORM_BLOCK_SIZE / 32`)
    pub max_uniform_block_array_size: usize,
    /// Whether 32-bit indices are available
    pub wide_indices_supported: bool,
}

impl ResolvedConfig {
    /// Active transform upload mode
    pub fn upload_mode(&self) -> UploadMode {
        self.strategy.upload_mode()
    }

    /// Whether draws are batched through multi-draw
    pub fn multi_draw(&self) -> bool {
        self.strategy.is_multi_draw()
    }

    /// Whether draws use base vertex / base instance
    pub fn base_vertex_base_instance(&self) -> bool {
        self.strategy.uses_base_vertex()
    }

    /// Index width for a pool of the given capacity
    pub fn index_format(&self, capacity: usize) -> IndexFormat {
        index_format_for(capacity)
    }

    /// Program variant matching the upload mode
    pub fn shader_variant(&self) -> ShaderVariant {
        match self.upload_mode() {
            UploadMode::SeparateUniforms => ShaderVariant::SeparateUniforms,
            UploadMode::Attributes => ShaderVariant::Attributes,
            UploadMode::UniformBlocks => ShaderVariant::UniformBlocks {
                max_array_size: self.max_uniform_block_array_size,
            },
        }
    }
}

/// Output of [`resolve`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The configuration to run with
    pub config: ResolvedConfig,
    /// Every demotion that was applied, in rule order
    pub downgrades: Vec<Downgrade>,
}

/// Resolve requested features against backend capabilities
///
/// Each downgrade is logged as a warning and returned for inspection.
pub fn resolve(requested: &RequestedFeatures, caps: &BackendCapabilities) -> Resolution {
    let mut downgrades = Vec::new();
    let mut wants = *requested;

    let api_version = requested.api_version.min(caps.api_version);
    if api_version < requested.api_version {
        downgrades.push(Downgrade::ApiVersion {
            requested: requested.api_version,
            available: caps.api_version,
        });
    }

    if wants.use_base_vertex_base_instance {
        let extension = if wants.use_multi_draw {
            Extensions::MULTI_DRAW_BASE_VERTEX_BASE_INSTANCE
        } else {
            Extensions::DRAW_BASE_VERTEX_BASE_INSTANCE
        };
        if !caps.supports(extension) {
            wants.use_base_vertex_base_instance = false;
            downgrades.push(Downgrade::BaseVertexUnavailable {
                extension: extension.name(),
            });
        }
    }

    if wants.use_multi_draw && !caps.supports(Extensions::MULTI_DRAW) {
        wants.use_multi_draw = false;
        downgrades.push(Downgrade::MultiDrawUnavailable);

        // Single draws need the single-draw flavour of the extension
        if wants.use_base_vertex_base_instance
            && !caps.supports(Extensions::DRAW_BASE_VERTEX_BASE_INSTANCE)
        {
            wants.use_base_vertex_base_instance = false;
            downgrades.push(Downgrade::BaseVertexUnavailable {
                extension: Extensions::DRAW_BASE_VERTEX_BASE_INSTANCE.name(),
            });
        }
    }

    let max_uniform_block_array_size = caps.max_uniform_block_size / TRANSFORM_RECORD_BYTES;

    if wants.use_uniform_blocks && api_version < ApiVersion::V2 {
        wants.use_uniform_blocks = false;
        downgrades.push(Downgrade::UniformBlocksNeedApiV2);
    }
    if wants.use_uniform_blocks && max_uniform_block_array_size == 0 {
        wants.use_uniform_blocks = false;
        downgrades.push(Downgrade::UniformBlocksTooSmall {
            max_uniform_block_size: caps.max_uniform_block_size,
        });
    }
    if wants.use_uniform_blocks && !wants.use_multi_draw {
        wants.use_uniform_blocks = false;
        downgrades.push(Downgrade::UniformBlocksNeedMultiDraw);
    }

    if wants.use_multi_draw && !(wants.use_uniform_blocks || wants.use_attributes) {
        let mode = if api_version == ApiVersion::V2 && max_uniform_block_array_size > 0 {
            wants.use_uniform_blocks = true;
            UploadMode::UniformBlocks
        } else {
            wants.use_attributes = true;
            UploadMode::Attributes
        };
        downgrades.push(Downgrade::DefaultedUploadMode(mode));
    }

    if wants.use_uniform_blocks && wants.use_attributes {
        wants.use_attributes = false;
        downgrades.push(Downgrade::AttributesSuperseded);
    }

    if wants.use_base_vertex_base_instance && !(wants.use_uniform_blocks || wants.use_attributes) {
        wants.use_base_vertex_base_instance = false;
        downgrades.push(Downgrade::BaseVertexNeedsBufferUpload);
    }

    for downgrade in &downgrades {
        log::warn!("{}", downgrade);
    }

    let base_vertex = wants.use_base_vertex_base_instance;
    let strategy = if wants.use_multi_draw {
        if wants.use_uniform_blocks {
            if base_vertex {
                SubmissionStrategy::ChunkedMultiDrawBaseVertex {
                    chunk_size: max_uniform_block_array_size,
                }
            } else {
                SubmissionStrategy::ChunkedMultiDraw {
                    chunk_size: max_uniform_block_array_size,
                }
            }
        } else if base_vertex {
            SubmissionStrategy::MultiDrawBaseVertex
        } else {
            SubmissionStrategy::MultiDraw
        }
    } else if wants.use_attributes {
        SubmissionStrategy::PerObject { base_vertex }
    } else {
        SubmissionStrategy::SeparateUniforms
    };

    log::info!(
        "Resolved draw strategy {:?} (API version {}, {} records per uniform block)",
        strategy,
        api_version,
        max_uniform_block_array_size
    );

    Resolution {
        config: ResolvedConfig {
            api_version,
            strategy,
            max_uniform_block_array_size,
            wide_indices_supported: caps.supports_wide_indices(),
        },
        downgrades,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(api_version: ApiVersion, extensions: Extensions) -> BackendCapabilities {
        BackendCapabilities {
            api_version,
            extensions,
            ..BackendCapabilities::default()
        }
    }

    fn all_requests() -> Vec<RequestedFeatures> {
        let mut requests = Vec::new();
        for bits in 0..32_u32 {
            requests.push(RequestedFeatures {
                use_attributes: bits & 1 != 0,
                use_uniform_blocks: bits & 2 != 0,
                use_multi_draw: bits & 4 != 0,
                use_base_vertex_base_instance: bits & 8 != 0,
                api_version: if bits & 16 != 0 { ApiVersion::V2 } else { ApiVersion::V1 },
            });
        }
        requests
    }

    fn all_capabilities() -> Vec<BackendCapabilities> {
        let mut result = Vec::new();
        for version in [ApiVersion::V1, ApiVersion::V2] {
            for bits in 0..16_u32 {
                result.push(caps(version, Extensions::from_bits_truncate(bits)));
            }
        }
        result
    }

    #[test]
    fn test_resolved_invariants_hold_everywhere() {
        for requested in all_requests() {
            for caps in all_capabilities() {
                let config = resolve(&requested, &caps).config;
                let mode = config.upload_mode();

                if mode == UploadMode::UniformBlocks {
                    assert!(config.multi_draw(), "{requested:?} / {caps:?}");
                    assert_eq!(config.api_version, ApiVersion::V2);
                }
                if config.multi_draw() {
                    assert_ne!(mode, UploadMode::SeparateUniforms, "{requested:?} / {caps:?}");
                    assert!(caps.supports(Extensions::MULTI_DRAW));
                }
                if config.base_vertex_base_instance() {
                    let needed = if config.multi_draw() {
                        Extensions::MULTI_DRAW_BASE_VERTEX_BASE_INSTANCE
                    } else {
                        Extensions::DRAW_BASE_VERTEX_BASE_INSTANCE
                    };
                    assert!(caps.supports(needed), "{requested:?} / {caps:?}");
                }
                assert!(config.api_version <= caps.api_version);
            }
        }
    }

    #[test]
    fn test_everything_supported() {
        let requested = RequestedFeatures {
            use_attributes: false,
            use_uniform_blocks: true,
            use_multi_draw: true,
            use_base_vertex_base_instance: true,
            api_version: ApiVersion::V2,
        };
        let resolution = resolve(&requested, &caps(ApiVersion::V2, Extensions::all()));
        assert!(resolution.downgrades.is_empty());
        assert_eq!(
            resolution.config.strategy,
            SubmissionStrategy::ChunkedMultiDrawBaseVertex { chunk_size: 512 }
        );
    }

    #[test]
    fn test_multi_draw_alone_defaults_upload_mode() {
        let requested = RequestedFeatures {
            use_multi_draw: true,
            api_version: ApiVersion::V2,
            ..RequestedFeatures::default()
        };
        let on_v2 = resolve(&requested, &caps(ApiVersion::V2, Extensions::MULTI_DRAW));
        assert_eq!(on_v2.config.upload_mode(), UploadMode::UniformBlocks);
        assert_eq!(
            on_v2.downgrades,
            vec![Downgrade::DefaultedUploadMode(UploadMode::UniformBlocks)]
        );

        let on_v1 = resolve(&requested, &caps(ApiVersion::V1, Extensions::MULTI_DRAW));
        assert_eq!(on_v1.config.upload_mode(), UploadMode::Attributes);
        assert_eq!(on_v1.config.strategy, SubmissionStrategy::MultiDraw);
    }

    #[test]
    fn test_uniform_blocks_need_version_two() {
        let requested = RequestedFeatures {
            use_uniform_blocks: true,
            use_multi_draw: true,
            api_version: ApiVersion::V2,
            ..RequestedFeatures::default()
        };
        let resolution = resolve(&requested, &caps(ApiVersion::V1, Extensions::MULTI_DRAW));
        assert_eq!(
            resolution.downgrades,
            vec![
                Downgrade::ApiVersion {
                    requested: ApiVersion::V2,
                    available: ApiVersion::V1,
                },
                Downgrade::UniformBlocksNeedApiV2,
                Downgrade::DefaultedUploadMode(UploadMode::Attributes),
            ]
        );
        assert_eq!(resolution.config.strategy, SubmissionStrategy::MultiDraw);
    }

    #[test]
    fn test_uniform_blocks_without_multi_draw_fall_back() {
        let requested = RequestedFeatures {
            use_uniform_blocks: true,
            api_version: ApiVersion::V2,
            ..RequestedFeatures::default()
        };
        let resolution = resolve(&requested, &caps(ApiVersion::V2, Extensions::all()));
        assert_eq!(resolution.downgrades, vec![Downgrade::UniformBlocksNeedMultiDraw]);
        assert_eq!(resolution.config.strategy, SubmissionStrategy::SeparateUniforms);
    }

    #[test]
    fn test_base_vertex_rechecked_after_multi_draw_demotion() {
        let requested = RequestedFeatures {
            use_attributes: true,
            use_multi_draw: true,
            use_base_vertex_base_instance: true,
            ..RequestedFeatures::default()
        };

        let only_multi_flavour = caps(
            ApiVersion::V1,
            Extensions::MULTI_DRAW_BASE_VERTEX_BASE_INSTANCE,
        );
        let resolution = resolve(&requested, &only_multi_flavour);
        assert_eq!(
            resolution.config.strategy,
            SubmissionStrategy::PerObject { base_vertex: false }
        );
        assert_eq!(resolution.downgrades.len(), 2);

        let both_flavours = caps(
            ApiVersion::V1,
            Extensions::MULTI_DRAW_BASE_VERTEX_BASE_INSTANCE
                | Extensions::DRAW_BASE_VERTEX_BASE_INSTANCE,
        );
        let resolution = resolve(&requested, &both_flavours);
        assert_eq!(
            resolution.config.strategy,
            SubmissionStrategy::PerObject { base_vertex: true }
        );
    }

    #[test]
    fn test_base_vertex_with_separate_uniforms_demoted() {
        let requested = RequestedFeatures {
            use_base_vertex_base_instance: true,
            ..RequestedFeatures::default()
        };
        let resolution = resolve(&requested, &caps(ApiVersion::V1, Extensions::all()));
        assert_eq!(resolution.downgrades, vec![Downgrade::BaseVertexNeedsBufferUpload]);
        assert_eq!(resolution.config.strategy, SubmissionStrategy::SeparateUniforms);
    }

    #[test]
    fn test_tiny_uniform_blocks_demoted() {
        let requested = RequestedFeatures {
            use_uniform_blocks: true,
            use_multi_draw: true,
            api_version: ApiVersion::V2,
            ..RequestedFeatures::default()
        };
        let tiny = BackendCapabilities {
            max_uniform_block_size: 16,
            ..caps(ApiVersion::V2, Extensions::MULTI_DRAW)
        };
        let resolution = resolve(&requested, &tiny);
        assert_eq!(resolution.config.upload_mode(), UploadMode::Attributes);
        assert!(resolution
            .downgrades
            .contains(&Downgrade::UniformBlocksTooSmall { max_uniform_block_size: 16 }));
    }

    #[test]
    fn test_shader_variant_carries_array_size() {
        let requested = RequestedFeatures {
            use_uniform_blocks: true,
            use_multi_draw: true,
            api_version: ApiVersion::V2,
            ..RequestedFeatures::default()
        };
        let config = resolve(&requested, &caps(ApiVersion::V2, Extensions::MULTI_DRAW)).config;
        assert_eq!(
            config.shader_variant(),
            ShaderVariant::UniformBlocks { max_array_size: 512 }
        );
    }
}
