//! Engine configuration loaded from TOML.
//!
//! Every field has a default, so an empty document yields a working
//! configuration:
//!
//! ```toml
//! [estimation]
//! hours_per_point = 4.0
//! high_confidence_samples = 20
//!
//! [dependencies]
//! auto_resolve_on_deploy = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration from {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid TOML for this schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is outside its permitted range.
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid {
        /// Dotted field path.
        field: &'static str,
        /// What is wrong.
        reason: &'static str,
    },
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// `[estimation]` section.
    pub estimation: EstimationConfig,
    /// `[dependencies]` section.
    pub dependencies: DependencyConfig,
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed input and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read, otherwise
    /// as [`EngineConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = path.as_ref();
        let document = std::fs::read_to_string(file).map_err(|source| ConfigError::Read {
            path: file.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&document)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let estimation = &self.estimation;
        ensure_positive(estimation.hours_per_point, "estimation.hours_per_point")?;
        ensure_non_negative(estimation.hourly_rate, "estimation.hourly_rate")?;
        ensure_non_negative(
            estimation.cost_per_thousand_tokens,
            "estimation.cost_per_thousand_tokens",
        )?;
        if !(0.0..=1.0).contains(&estimation.history_weight_cap) {
            return Err(ConfigError::Invalid {
                field: "estimation.history_weight_cap",
                reason: "must lie in [0, 1]",
            });
        }
        if estimation.medium_confidence_samples == 0
            || estimation.medium_confidence_samples > estimation.high_confidence_samples
        {
            return Err(ConfigError::Invalid {
                field: "estimation.medium_confidence_samples",
                reason: "must be positive and not exceed high_confidence_samples",
            });
        }
        if estimation.accuracy_window == 0 {
            return Err(ConfigError::Invalid {
                field: "estimation.accuracy_window",
                reason: "must be positive",
            });
        }
        if estimation.improvement_window_weeks == 0 {
            return Err(ConfigError::Invalid {
                field: "estimation.improvement_window_weeks",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

/// Estimation model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EstimationConfig {
    /// Hours per story point before history is applied.
    pub hours_per_point: f64,
    /// Token budget per story point.
    pub tokens_per_point: u64,
    /// Cost of one hour.
    pub hourly_rate: f64,
    /// Cost of one thousand tokens.
    pub cost_per_thousand_tokens: f64,
    /// Maximum share of the estimate taken from history.
    pub history_weight_cap: f64,
    /// Samples needed for a medium confidence band.
    pub medium_confidence_samples: usize,
    /// Samples needed for a high confidence band and full coverage.
    pub high_confidence_samples: usize,
    /// Samples above which a project counts as learning.
    pub learning_sample_threshold: usize,
    /// Most recent samples used for the accuracy figure.
    pub accuracy_window: usize,
    /// Trailing weeks compared for weekly improvement.
    pub improvement_window_weeks: u32,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            hours_per_point: 4.0,
            tokens_per_point: 20_000,
            hourly_rate: 85.0,
            cost_per_thousand_tokens: 0.015,
            history_weight_cap: 0.8,
            medium_confidence_samples: 5,
            high_confidence_samples: 20,
            learning_sample_threshold: 5,
            accuracy_window: 50,
            improvement_window_weeks: 4,
        }
    }
}

/// Dependency resolver behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DependencyConfig {
    /// Re-read attempts after a concurrent graph change.
    pub max_commit_retries: u32,
    /// Resolve outgoing blocking edges when a prerequisite deploys.
    pub auto_resolve_on_deploy: bool,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            max_commit_retries: 3,
            auto_resolve_on_deploy: true,
        }
    }
}

fn ensure_positive(value: f64, field: &'static str) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: "must be a positive number",
        })
    }
}

fn ensure_non_negative(value: f64, field: &'static str) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: "must be a non-negative number",
        })
    }
}
