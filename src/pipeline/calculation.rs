//! Result sets, calculations and engine requests

use serde::{Deserialize, Serialize};

use super::error::{HicsError, Result};
use super::storage::FeatureSubset;

pub type ResultSetId = u64;
pub type CalculationId = u64;

/// Groups all evidence gathered for one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSet {
    pub id: ResultSetId,
    pub target: String,
}

/// Parameters of one engine configuration.
///
/// Field semantics follow the scheduling layer: `bivariate` evaluates every
/// feature on its own, a non-empty `features` list selects a fixed subset (or
/// the seed of random supersets when `calculate_supersets` is set), and an
/// empty list without `bivariate` evaluates random subsets of all features.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HicsRequest {
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub bivariate: bool,
    #[serde(default)]
    pub calculate_supersets: bool,
    #[serde(default)]
    pub calculate_redundancies: bool,
}

impl Default for HicsRequest {
    fn default() -> Self {
        Self::bivariate()
    }
}

impl HicsRequest {
    pub fn bivariate() -> Self {
        Self {
            features: Vec::new(),
            bivariate: true,
            calculate_supersets: false,
            calculate_redundancies: false,
        }
    }

    pub fn bivariate_with_redundancies() -> Self {
        Self {
            calculate_redundancies: true,
            ..Self::bivariate()
        }
    }

    pub fn multivariate() -> Self {
        Self {
            bivariate: false,
            ..Self::bivariate()
        }
    }

    pub fn fixed_subset<S: Into<String>>(features: impl IntoIterator<Item = S>) -> Self {
        Self {
            features: features.into_iter().map(Into::into).collect(),
            ..Self::multivariate()
        }
    }

    pub fn superset<S: Into<String>>(seed: impl IntoIterator<Item = S>) -> Self {
        Self {
            calculate_supersets: true,
            ..Self::fixed_subset(seed)
        }
    }

    /// Resolve the request into exactly one mode, rejecting invalid combinations
    pub fn mode(&self) -> Result<AnalysisMode> {
        if self.bivariate && !self.features.is_empty() {
            return Err(HicsError::InvalidSubsetRequest(
                "bivariate mode does not take an explicit feature subset".to_string(),
            ));
        }
        if self.bivariate && self.calculate_supersets {
            return Err(HicsError::InvalidSubsetRequest(
                "bivariate mode cannot calculate supersets".to_string(),
            ));
        }
        if self.calculate_supersets && self.features.is_empty() {
            return Err(HicsError::InvalidSubsetRequest(
                "superset mode needs a non-empty seed subset".to_string(),
            ));
        }
        if self.calculate_redundancies && !self.bivariate {
            return Err(HicsError::InvalidSubsetRequest(
                "redundancies are only calculated in bivariate mode".to_string(),
            ));
        }

        let subset = FeatureSubset::new(self.features.iter().cloned());
        if subset.len() != self.features.len() {
            return Err(HicsError::InvalidSubsetRequest(format!(
                "feature subset contains duplicates: {:?}",
                self.features
            )));
        }

        Ok(if self.bivariate {
            AnalysisMode::Bivariate {
                redundancies: self.calculate_redundancies,
            }
        } else if self.features.is_empty() {
            AnalysisMode::Multivariate
        } else if self.calculate_supersets {
            AnalysisMode::Superset(subset)
        } else {
            AnalysisMode::FixedSubset(subset)
        })
    }
}

/// The four mutually exclusive engine modes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisMode {
    Bivariate { redundancies: bool },
    Multivariate,
    FixedSubset(FeatureSubset),
    Superset(FeatureSubset),
}

impl std::fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisMode::Bivariate { redundancies: true } => write!(f, "bivariate+redundancies"),
            AnalysisMode::Bivariate { redundancies: false } => write!(f, "bivariate"),
            AnalysisMode::Multivariate => write!(f, "multivariate"),
            AnalysisMode::FixedSubset(s) => write!(f, "subset [{}]", s),
            AnalysisMode::Superset(s) => write!(f, "superset of [{}]", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CalculationStatus {
    NotStarted,
    Accumulating,
    Done,
}

/// Progress of one engine configuration against a result set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calculation {
    pub id: CalculationId,
    pub result_set: ResultSetId,
    pub request: HicsRequest,
    pub current_iteration: u32,
    pub max_iteration: u32,
}

impl Calculation {
    pub fn status(&self) -> CalculationStatus {
        if self.current_iteration >= self.max_iteration {
            CalculationStatus::Done
        } else if self.current_iteration == 0 {
            CalculationStatus::NotStarted
        } else {
            CalculationStatus::Accumulating
        }
    }

    pub fn is_done(&self) -> bool {
        self.status() == CalculationStatus::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_modes() {
        assert_eq!(
            HicsRequest::bivariate().mode().unwrap(),
            AnalysisMode::Bivariate { redundancies: false }
        );
        assert_eq!(
            HicsRequest::multivariate().mode().unwrap(),
            AnalysisMode::Multivariate
        );
        assert_eq!(
            HicsRequest::fixed_subset(["b", "a"]).mode().unwrap(),
            AnalysisMode::FixedSubset(FeatureSubset::new(["a", "b"]))
        );
        assert!(matches!(
            HicsRequest::superset(["a"]).mode().unwrap(),
            AnalysisMode::Superset(_)
        ));
    }

    #[test]
    fn test_invalid_combinations_rejected() {
        let bivariate_with_subset = HicsRequest {
            features: vec!["a".to_string()],
            ..HicsRequest::bivariate()
        };
        let bivariate_superset = HicsRequest {
            calculate_supersets: true,
            ..HicsRequest::bivariate()
        };
        let empty_superset = HicsRequest {
            calculate_supersets: true,
            ..HicsRequest::multivariate()
        };
        let multivariate_redundancies = HicsRequest {
            calculate_redundancies: true,
            ..HicsRequest::multivariate()
        };
        let duplicates = HicsRequest::fixed_subset(["a", "a"]);

        for request in [
            bivariate_with_subset,
            bivariate_superset,
            empty_superset,
            multivariate_redundancies,
            duplicates,
        ] {
            assert!(
                matches!(request.mode(), Err(HicsError::InvalidSubsetRequest(_))),
                "{:?} should be rejected",
                request
            );
        }
    }

    #[test]
    fn test_calculation_status() {
        let mut calculation = Calculation {
            id: 1,
            result_set: 1,
            request: HicsRequest::bivariate(),
            current_iteration: 0,
            max_iteration: 2,
        };
        assert_eq!(calculation.status(), CalculationStatus::NotStarted);
        calculation.current_iteration = 1;
        assert_eq!(calculation.status(), CalculationStatus::Accumulating);
        calculation.current_iteration = 2;
        assert!(calculation.is_done());
    }
}
