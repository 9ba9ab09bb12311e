//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{HicsError, Result};
use super::sampler::DEFAULT_ALPHA;

/// Parameters of the incremental correlation engine.
///
/// Missing fields in a JSON config file fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HicsConfig {
    /// Slices drawn per contrast evaluation
    pub iterations: usize,
    /// Fraction of rows a slice should capture
    pub alpha: f64,
    /// Seed for reproducible runs. Each invocation derives its own stream from it.
    pub seed: Option<u64>,
    pub bivariate_runs: usize,
    pub multivariate_k: usize,
    pub multivariate_runs: usize,
    pub superset_k: usize,
    pub superset_runs: usize,
    pub subset_runs: usize,
    pub redundancy_k: usize,
    pub redundancy_runs: usize,
}

impl Default for HicsConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            alpha: DEFAULT_ALPHA,
            seed: None,
            bivariate_runs: 5,
            multivariate_k: 5,
            multivariate_runs: 50,
            superset_k: 5,
            superset_runs: 10,
            subset_runs: 5,
            redundancy_k: 5,
            redundancy_runs: 20,
        }
    }
}

impl HicsConfig {
    /// Load a config from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HicsConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(HicsError::InvalidParameter(format!(
                "alpha must be in (0, 1], got {}",
                self.alpha
            )));
        }
        let counts = [
            ("iterations", self.iterations),
            ("bivariate_runs", self.bivariate_runs),
            ("multivariate_k", self.multivariate_k),
            ("multivariate_runs", self.multivariate_runs),
            ("superset_k", self.superset_k),
            ("superset_runs", self.superset_runs),
            ("subset_runs", self.subset_runs),
            ("redundancy_k", self.redundancy_k),
            ("redundancy_runs", self.redundancy_runs),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(HicsError::InvalidParameter(format!(
                    "{} must be at least 1",
                    name
                )));
            }
        }
        if self.redundancy_k < 2 {
            return Err(HicsError::InvalidParameter(
                "redundancy_k must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = HicsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.iterations, 10);
        assert_eq!(config.alpha, 0.1);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"alpha": 0.2, "seed": 9}"#).unwrap();

        let config = HicsConfig::from_json_file(&path).unwrap();
        assert_eq!(config.alpha, 0.2);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.bivariate_runs, 5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = HicsConfig {
            alpha: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = HicsConfig {
            redundancy_k: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
