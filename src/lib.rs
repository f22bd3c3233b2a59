pub mod capture;
pub mod error;
pub mod pipeline;

use std::path::Path;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

pub use capture::{Frame, StreamingEngine};
pub use error::{Result, StreamError};

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// System configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub command: CommandConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub buffer_count: usize,
    pub start_acquisition: bool,
    pub buffer_alignment: usize, // Requested alignment for transport-layer buffers
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub poll_interval_ms: u64,
    pub timeout_ms: u64, // 0 waits forever
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub ring_buffer_size: usize,
    pub enable_profiling: bool,
    pub run_seconds: u64, // 0 runs until interrupted
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_count: 4,
            start_acquisition: true,
            buffer_alignment: 128,
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            timeout_ms: 10_000,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ring_buffer_size: 8,
            enable_profiling: false,
            run_seconds: 0,
        }
    }
}

impl Config {
    /// Load from a TOML file, then apply `FRAMESTREAM_*` environment overrides
    /// (e.g. `FRAMESTREAM_STREAM__BUFFER_COUNT=8`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("FRAMESTREAM")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.stream.buffer_count, 4);
        assert!(config.stream.start_acquisition);
        assert_eq!(config.command.poll_interval_ms, 100);
        assert_eq!(config.pipeline.ring_buffer_size, 8);
    }

    #[test]
    fn test_load_partial_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[stream]\nbuffer_count = 12\nstart_acquisition = false\n\n[command]\ntimeout_ms = 0"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.stream.buffer_count, 12);
        assert!(!config.stream.start_acquisition);
        assert_eq!(config.stream.buffer_alignment, 128);
        assert_eq!(config.command.timeout_ms, 0);
        assert_eq!(config.command.poll_interval_ms, 100);
        assert_eq!(config.pipeline, PipelineConfig::default());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::load("/nonexistent/framestream.toml").unwrap_err();
        assert!(matches!(err, StreamError::Config(_)));
    }
}
