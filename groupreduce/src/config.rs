//! Runtime-configurable tuning parameters for the allreduce engine.
//!
//! All values have sensible defaults. Override via environment variables
//! (prefixed `GROUPREDUCE_`) or by constructing a custom `ReduceConfig`.

use crate::error::{ReduceError, Result};
use std::time::Duration;

/// Which algorithm family the engine may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlgorithmChoice {
    /// Recursive doubling for power-of-two groups, ring otherwise.
    #[default]
    Auto,
    /// Ring for every group larger than one.
    Ring,
}

impl std::str::FromStr for AlgorithmChoice {
    type Err = ReduceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(AlgorithmChoice::Auto),
            "ring" => Ok(AlgorithmChoice::Ring),
            other => Err(ReduceError::InvalidConfig(format!(
                "unknown algorithm {other:?} (expected \"auto\" or \"ring\")"
            ))),
        }
    }
}

/// Tuning parameters for collective operations.
#[derive(Debug, Clone)]
pub struct ReduceConfig {
    /// Wait budget per exchange step. Step `k` of a collective must finish
    /// by `start + (k + 1) * collective_timeout`.
    pub collective_timeout: Duration,

    /// Bound on each abort notification sent after a failure.
    pub abort_timeout: Duration,

    pub algorithm: AlgorithmChoice,
}

impl Default for ReduceConfig {
    fn default() -> Self {
        Self {
            collective_timeout: Duration::from_secs(30),
            abort_timeout: Duration::from_secs(1),
            algorithm: AlgorithmChoice::Auto,
        }
    }
}

impl ReduceConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `GROUPREDUCE_COLLECTIVE_TIMEOUT_MS`
    /// - `GROUPREDUCE_ABORT_TIMEOUT_MS`
    /// - `GROUPREDUCE_ALGORITHM` (`auto` or `ring`)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = lookup("GROUPREDUCE_COLLECTIVE_TIMEOUT_MS") {
            match v.parse::<u64>() {
                Ok(ms) => cfg.collective_timeout = Duration::from_millis(ms),
                Err(e) => tracing::warn!(value = %v, error = %e, "ignoring GROUPREDUCE_COLLECTIVE_TIMEOUT_MS"),
            }
        }
        if let Some(v) = lookup("GROUPREDUCE_ABORT_TIMEOUT_MS") {
            match v.parse::<u64>() {
                Ok(ms) => cfg.abort_timeout = Duration::from_millis(ms),
                Err(e) => tracing::warn!(value = %v, error = %e, "ignoring GROUPREDUCE_ABORT_TIMEOUT_MS"),
            }
        }
        if let Some(v) = lookup("GROUPREDUCE_ALGORITHM") {
            match v.parse::<AlgorithmChoice>() {
                Ok(choice) => cfg.algorithm = choice,
                Err(e) => tracing::warn!(value = %v, error = %e, "ignoring GROUPREDUCE_ALGORITHM"),
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<()> {
        if self.collective_timeout.is_zero() {
            return Err(ReduceError::InvalidConfig(
                "collective_timeout must be non-zero".into(),
            ));
        }
        if self.abort_timeout.is_zero() {
            return Err(ReduceError::InvalidConfig(
                "abort_timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = ReduceConfig::default();
        assert_eq!(cfg.collective_timeout, Duration::from_secs(30));
        assert_eq!(cfg.abort_timeout, Duration::from_secs(1));
        assert_eq!(cfg.algorithm, AlgorithmChoice::Auto);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let cfg = ReduceConfig::from_lookup(lookup_from(&[
            ("GROUPREDUCE_COLLECTIVE_TIMEOUT_MS", "250"),
            ("GROUPREDUCE_ABORT_TIMEOUT_MS", "50"),
            ("GROUPREDUCE_ALGORITHM", "Ring"),
        ]));
        assert_eq!(cfg.collective_timeout, Duration::from_millis(250));
        assert_eq!(cfg.abort_timeout, Duration::from_millis(50));
        assert_eq!(cfg.algorithm, AlgorithmChoice::Ring);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let cfg = ReduceConfig::from_lookup(lookup_from(&[
            ("GROUPREDUCE_COLLECTIVE_TIMEOUT_MS", "soon"),
            ("GROUPREDUCE_ALGORITHM", "butterfly"),
        ]));
        assert_eq!(cfg.collective_timeout, Duration::from_secs(30));
        assert_eq!(cfg.algorithm, AlgorithmChoice::Auto);
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let cfg = ReduceConfig {
            collective_timeout: Duration::ZERO,
            ..ReduceConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ReduceError::InvalidConfig(_))));
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!("auto".parse::<AlgorithmChoice>().unwrap(), AlgorithmChoice::Auto);
        assert_eq!(" RING ".parse::<AlgorithmChoice>().unwrap(), AlgorithmChoice::Ring);
        assert!("tree".parse::<AlgorithmChoice>().is_err());
    }
}
