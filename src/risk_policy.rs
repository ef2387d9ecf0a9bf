//! Fraud probability to risk level mapping

use crate::error::PipelineError;
use crate::types::prediction::RiskLevel;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Configurable band boundaries.
///
/// Bands are closed-open: `[0, low)` is Low, `[low, high)` is Medium and
/// `[high, 1]` is High.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub low: f64,
    pub high: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low: 0.33,
            high: 0.66,
        }
    }
}

impl RiskThresholds {
    pub fn validate(&self) -> Result<()> {
        if !self.low.is_finite() || !self.high.is_finite() {
            bail!("risk thresholds must be finite");
        }
        if !(0.0..=1.0).contains(&self.low) || !(0.0..=1.0).contains(&self.high) {
            bail!(
                "risk thresholds must lie in [0, 1] (low={}, high={})",
                self.low,
                self.high
            );
        }
        if self.low > self.high {
            bail!(
                "low threshold {} must not exceed high threshold {}",
                self.low,
                self.high
            );
        }
        Ok(())
    }
}

/// Pure mapping from `p_fraud` to a [`RiskLevel`].
#[derive(Debug, Clone, Copy)]
pub struct RiskLevelPolicy {
    thresholds: RiskThresholds,
}

impl RiskLevelPolicy {
    pub fn new(thresholds: RiskThresholds) -> Result<Self> {
        thresholds.validate()?;
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> &RiskThresholds {
        &self.thresholds
    }

    pub fn classify(&self, p_fraud: f64) -> Result<RiskLevel, PipelineError> {
        if !p_fraud.is_finite() || !(0.0..=1.0).contains(&p_fraud) {
            return Err(PipelineError::InvalidProbability(p_fraud));
        }

        let level = if p_fraud >= self.thresholds.high {
            RiskLevel::High
        } else if p_fraud >= self.thresholds.low {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };
        Ok(level)
    }
}

impl Default for RiskLevelPolicy {
    fn default() -> Self {
        Self {
            thresholds: RiskThresholds::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_band_boundaries() {
        let policy = RiskLevelPolicy::default();

        assert_eq!(policy.classify(0.0).unwrap(), RiskLevel::Low);
        assert_eq!(policy.classify(0.32).unwrap(), RiskLevel::Low);
        assert_eq!(policy.classify(0.33).unwrap(), RiskLevel::Medium);
        assert_eq!(policy.classify(0.659999).unwrap(), RiskLevel::Medium);
        assert_eq!(policy.classify(0.66).unwrap(), RiskLevel::High);
        assert_eq!(policy.classify(1.0).unwrap(), RiskLevel::High);
    }

    #[test]
    fn test_bands_partition_unit_interval() {
        let policy = RiskLevelPolicy::default();
        let mut previous = RiskLevel::Low;

        for i in 0..=10_000 {
            let p = f64::from(i) / 10_000.0;
            let level = policy.classify(p).unwrap();
            // Levels never go back down as p grows
            let rank = |l: RiskLevel| match l {
                RiskLevel::Low => 0,
                RiskLevel::Medium => 1,
                RiskLevel::High => 2,
            };
            assert!(rank(level) >= rank(previous), "p={p}");
            previous = level;
        }
        assert_eq!(previous, RiskLevel::High);
    }

    #[test]
    fn test_invalid_probabilities() {
        let policy = RiskLevelPolicy::default();
        for p in [-0.01, 1.0001, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                policy.classify(p),
                Err(PipelineError::InvalidProbability(_))
            ));
        }
    }

    #[test]
    fn test_custom_thresholds() {
        let policy = RiskLevelPolicy::new(RiskThresholds {
            low: 0.3,
            high: 0.7,
        })
        .unwrap();
        assert_eq!(policy.classify(0.5).unwrap(), RiskLevel::Medium);
        assert_eq!(policy.classify(0.7).unwrap(), RiskLevel::High);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        assert!(RiskLevelPolicy::new(RiskThresholds { low: 0.7, high: 0.3 }).is_err());
        assert!(RiskLevelPolicy::new(RiskThresholds { low: -0.1, high: 0.3 }).is_err());
        assert!(RiskLevelPolicy::new(RiskThresholds { low: 0.1, high: f64::NAN }).is_err());
    }
}
