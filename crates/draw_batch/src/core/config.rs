//! Benchmark configuration
//!
//! Typed settings of one benchmark run. They come from a TOML/RON file
//! through [`Config`], from string key/value parameters through
//! [`BenchConfig::apply_params`], or both (file first, parameters on top).

use serde::{Deserialize, Serialize};

use crate::batch::draw_list::DrawListPattern;
use crate::batch::pool::MAX_CAPACITY;
use crate::batch::resolver::RequestedFeatures;
use crate::config::{Config, ConfigError};
use crate::render::capabilities::ApiVersion;

/// Default number of frames between draw list rotations
pub const DEFAULT_DRAW_LIST_INTERVAL: u32 = 50;

/// Settings of one benchmark run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Objects allocated at setup
    pub initial_object_count: usize,

    /// Frames between draw list rotations
    pub draw_list_interval: u32,

    /// RNG seed for reproducible runs; entropy seeded when absent
    pub seed: Option<u64>,

    /// Requested upload and draw features
    pub features: RequestedFeatures,

    /// Candidate draw lists, in rotation order
    pub draw_lists: Vec<DrawListPattern>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            initial_object_count: 0,
            draw_list_interval: DEFAULT_DRAW_LIST_INTERVAL,
            seed: None,
            features: RequestedFeatures::default(),
            draw_lists: DrawListPattern::default_set(),
        }
    }
}

impl Config for BenchConfig {}

impl BenchConfig {
    /// Build from key/value parameters on top of the defaults
    pub fn from_params<I, K, V>(params: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        config.apply_params(params)?;
        config.validate()?;
        Ok(config)
    }

    /// Override settings from key/value parameters
    ///
    /// Feature flags are on for any non-empty value. `webgl_version` selects
    /// version 2 only for the number 2; anything else means version 1. Count,
    /// interval and seed must be integers. Unknown keys are skipped.
    pub fn apply_params<I, K, V>(&mut self, params: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in params {
            let (key, value) = (key.as_ref(), value.as_ref());
            let flag = !value.is_empty();
            match key {
                "use_attributes" => self.features.use_attributes = flag,
                "use_ubos" => self.features.use_uniform_blocks = flag,
                "use_multi_draw" => self.features.use_multi_draw = flag,
                "use_base_vertex_base_instance" => {
                    self.features.use_base_vertex_base_instance = flag;
                }
                "webgl_version" => {
                    let major = value.trim().parse::<f64>().unwrap_or(0.0);
                    self.features.api_version = if (major - 2.0).abs() < f64::EPSILON {
                        ApiVersion::V2
                    } else {
                        ApiVersion::V1
                    };
                }
                "object_count" => self.initial_object_count = parse_param(key, value)?,
                "draw_list_interval" => self.draw_list_interval = parse_param(key, value)?,
                "seed" => self.seed = Some(parse_param(key, value)?),
                _ => log::debug!("Ignoring unknown parameter '{}'", key),
            }
        }
        Ok(())
    }

    /// Reject settings the stage cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.draw_lists.is_empty() {
            return Err(ConfigError::Invalid("at least one draw list is required".into()));
        }
        if self.initial_object_count > MAX_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "object count {} exceeds the pool limit of {MAX_CAPACITY}",
                self.initial_object_count
            )));
        }
        if self.draw_list_interval == 0 {
            return Err(ConfigError::Invalid("draw_list_interval must be at least 1".into()));
        }
        for pattern in &self.draw_lists {
            pattern.validate().map_err(ConfigError::Invalid)?;
        }
        Ok(())
    }
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidParameter {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BenchConfig::default();
        assert_eq!(config.draw_list_interval, 50);
        assert_eq!(config.draw_lists.len(), 5);
        assert_eq!(config.features.api_version, ApiVersion::V1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_params_set_flags_when_non_empty() {
        let config = BenchConfig::from_params([
            ("use_ubos", "1"),
            ("use_multi_draw", "true"),
            ("use_attributes", ""),
            ("webgl_version", "2"),
            ("object_count", "25000"),
            ("seed", "42"),
            ("fullscreen", "yes"),
        ])
        .unwrap();

        assert!(config.features.use_uniform_blocks);
        assert!(config.features.use_multi_draw);
        assert!(!config.features.use_attributes);
        assert_eq!(config.features.api_version, ApiVersion::V2);
        assert_eq!(config.initial_object_count, 25_000);
        assert_eq!(config.seed, Some(42));
    }

    #[test]
    fn test_webgl_version_falls_back_to_one() {
        for raw in ["0", "abc", "", "3", "1"] {
            let config = BenchConfig::from_params([("webgl_version", raw)]).unwrap();
            assert_eq!(config.features.api_version, ApiVersion::V1, "{raw:?}");
        }
    }

    #[test]
    fn test_bad_integer_parameter() {
        let err = BenchConfig::from_params([("draw_list_interval", "soon")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidParameter { ref key, .. } if key == "draw_list_interval"
        ));
    }

    #[test]
    fn test_object_count_above_pool_limit() {
        let err = BenchConfig::from_params([("object_count", "18446744073709551615")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let limit = MAX_CAPACITY.to_string();
        let config = BenchConfig::from_params([("object_count", limit.as_str())]).unwrap();
        assert_eq!(config.initial_object_count, MAX_CAPACITY);
    }

    #[test]
    fn test_validate_rejects_degenerate_settings() {
        let zero_interval = BenchConfig::from_params([("draw_list_interval", "0")]);
        assert!(matches!(zero_interval, Err(ConfigError::Invalid(_))));

        let config = BenchConfig {
            draw_lists: vec![DrawListPattern::Scaled { divisor: 4, scale: 0 }],
            ..BenchConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BenchConfig {
            draw_lists: Vec::new(),
            ..BenchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_file_round_trip() {
        let config = BenchConfig {
            initial_object_count: 2_000,
            draw_lists: vec![
                DrawListPattern::All,
                DrawListPattern::Fixed { slots: vec![1, 2] },
            ],
            seed: Some(9),
            ..BenchConfig::default()
        };
        let path = std::env::temp_dir().join(format!("draw_batch_bench_{}.toml", std::process::id()));
        config.save_to_file(&path).unwrap();
        let loaded = BenchConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_ron() {
        let config: BenchConfig = ron::from_str("(initial_object_count: 300, draw_list_interval: 3)").unwrap();
        assert_eq!(config.initial_object_count, 300);
        assert_eq!(config.draw_list_interval, 3);
        assert_eq!(config.draw_lists, DrawListPattern::default_set());
    }
}
