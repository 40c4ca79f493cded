//! Triangle batch benchmark
//!
//! Runs the draw-batch stage headless against a recording backend that
//! advertises the capabilities from the configuration, and logs submission
//! throughput.
//!
//! ```text
//! triangle_bench [bench.toml | bench.ron] [key=value ...]
//! ```
//!
//! `key=value` arguments use the benchmark parameter names (`use_ubos`,
//! `use_multi_draw`, `webgl_version`, `object_count`, ...) and override the file.

mod driver;

use draw_batch::batch::{BenchStage, StageError};
use draw_batch::config::{Config, ConfigError};
use draw_batch::core::BenchConfig;
use draw_batch::foundation::logging::{self, LevelFilter};
use draw_batch::render::{BackendCapabilities, BackendProfile, RecordingBackend};
use serde::{Deserialize, Serialize};

use driver::{DriverConfig, RampDriver};

/// Everything one run needs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct AppConfig {
    bench: BenchConfig,
    backend: BackendProfile,
    driver: DriverConfig,
}

impl Config for AppConfig {}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Benchmark failed: {0}")]
    Stage(#[from] StageError),
}

/// Split arguments into an optional config file and key/value overrides
fn parse_args(args: &[String]) -> (Option<&str>, Vec<(&str, &str)>) {
    let mut path = None;
    let mut params = Vec::new();
    for arg in args {
        match arg.split_once('=') {
            Some((key, value)) => params.push((key, value)),
            None if path.is_none() => path = Some(arg.as_str()),
            None => log::warn!("Ignoring extra argument '{}'", arg),
        }
    }
    (path, params)
}

fn load_config(args: &[String]) -> Result<AppConfig, ConfigError> {
    let (path, params) = parse_args(args);
    let mut config = match path {
        Some(path) => {
            log::info!("Loading configuration from {}", path);
            AppConfig::load_from_file(path)?
        }
        None => AppConfig::default(),
    };
    config.bench.apply_params(params)?;
    config.bench.validate()?;
    Ok(config)
}

fn run(args: &[String]) -> Result<(), AppError> {
    let config = load_config(args)?;
    let capabilities = BackendCapabilities::from_profile(&config.backend);
    log::info!(
        "Backend: API version {}, extensions {:?}, {} byte uniform blocks",
        capabilities.api_version,
        capabilities.extensions,
        capabilities.max_uniform_block_size
    );

    let backend = RecordingBackend::new(capabilities).without_command_log();
    let mut stage = BenchStage::new(backend, &config.bench)?;
    let total = RampDriver::new(config.driver).run(&mut stage)?;

    let counters = stage.backend().counters();
    log::info!(
        "Done: {} frames, {:.0} objects/frame, {:.1} us/frame, {:.0} objects/s, {} draw calls ({} multi-draw), {} uniform writes, {} bytes uploaded",
        total.frames,
        total.avg_objects_per_frame(),
        total.avg_frame_time_us(),
        total.objects_per_second(),
        counters.draw_calls,
        counters.multi_draw_calls,
        counters.uniform_writes,
        counters.bytes_transferred
    );
    Ok(())
}

fn main() {
    logging::init_with_level(LevelFilter::Info);
    log::info!("Starting triangle batch benchmark");

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => log::info!("Benchmark completed successfully"),
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let args: Vec<String> = ["bench.toml", "use_ubos=1", "webgl_version=2", "extra"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let (path, params) = parse_args(&args);
        assert_eq!(path, Some("bench.toml"));
        assert_eq!(params, vec![("use_ubos", "1"), ("webgl_version", "2")]);
    }

    #[test]
    fn test_params_without_file() {
        let args = vec!["use_multi_draw=1".to_string(), "object_count=300".to_string()];
        let config = load_config(&args).unwrap();
        assert!(config.bench.features.use_multi_draw);
        assert_eq!(config.bench.initial_object_count, 300);
        assert_eq!(config.backend, BackendProfile::default());
    }

    #[test]
    fn test_sample_config_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/bench.toml");
        let args = vec![path.to_string(), "seed=3".to_string()];
        let config = load_config(&args).unwrap();
        assert!(config.bench.features.use_uniform_blocks);
        assert_eq!(config.bench.draw_lists.len(), 3);
        assert_eq!(config.bench.seed, Some(3));
        assert_eq!(config.driver.target_object_count, 20_000);
        assert_eq!(config.backend, BackendProfile::default());
    }
}
