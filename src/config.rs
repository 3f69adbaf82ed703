//! Run configuration for the miner
//!
//! Settings come from an optional JSON file; command-line flags override
//! individual fields.
//!
//! ```json
//! { "threads": 8, "kernel": "four-way", "tune_file": "tune_config" }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::algorithm::{KernelKind, TUNE_FILE, TUNE_SEGMENT_SECS};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("File I/O error: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    InvalidFormat(#[from] serde_json::Error),

    #[error("Invalid setting: {0}")]
    InvalidValue(String),
}

/// Hash kernel as named on the command line and in config files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KernelChoice {
    #[default]
    Scalar,
    FourWay,
}

impl From<KernelChoice> for KernelKind {
    fn from(choice: KernelChoice) -> Self {
        match choice {
            KernelChoice::Scalar => KernelKind::Scalar,
            KernelChoice::FourWay => KernelKind::FourWay,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MinerConfig {
    /// Worker threads (default: number of CPU cores)
    pub threads: Option<usize>,
    pub kernel: KernelChoice,
    /// Where the tuned configuration is read from and written to
    pub tune_file: PathBuf,
    /// Seconds per tuning segment
    pub tune_segment_secs: f64,
    /// Seconds per benchmark rotation; realistic weighting when unset
    pub bench_segment_secs: Option<f64>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            threads: None,
            kernel: KernelChoice::default(),
            tune_file: PathBuf::from(TUNE_FILE),
            tune_segment_secs: TUNE_SEGMENT_SECS,
            bench_segment_secs: None,
        }
    }
}

impl MinerConfig {
    /// Load from a JSON file; absent fields keep their defaults
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no run can use
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == Some(0) {
            return Err(ConfigError::InvalidValue("threads must be at least 1".into()));
        }
        let segments = [Some(self.tune_segment_secs), self.bench_segment_secs];
        if segments.into_iter().flatten().any(|s| !(s.is_finite() && s > 0.0)) {
            return Err(ConfigError::InvalidValue(
                "segment lengths must be positive seconds".into(),
            ));
        }
        Ok(())
    }

    pub fn thread_count(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MinerConfig::default();
        assert_eq!(config.kernel, KernelChoice::Scalar);
        assert_eq!(config.tune_file, PathBuf::from("tune_config"));
        assert_eq!(config.tune_segment_secs, 12.5);
        assert!(config.bench_segment_secs.is_none());
        assert!(config.thread_count() >= 1);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("miner.json");
        fs::write(&path, r#"{ "threads": 3, "kernel": "four-way" }"#).unwrap();

        let config = MinerConfig::load_from_file(&path).unwrap();
        assert_eq!(config.thread_count(), 3);
        assert_eq!(KernelKind::from(config.kernel), KernelKind::FourWay);
        assert_eq!(config.tune_file, PathBuf::from("tune_config"));
    }

    #[test]
    fn test_rejects_unknown_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("miner.json");
        fs::write(&path, r#"{ "thread": 3 }"#).unwrap();

        assert!(matches!(
            MinerConfig::load_from_file(&path),
            Err(ConfigError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_rejects_zero_threads() {
        let config = MinerConfig {
            threads: Some(0),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_rejects_negative_segment() {
        let config = MinerConfig {
            bench_segment_secs: Some(-1.0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
