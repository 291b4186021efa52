use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DnaError, DnaResult};
use crate::tiers::{QuantileCuts, RankShares};

/// Which grid produces the segment code that is joined against the
/// strategy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum GridProfile {
    /// Value tier x activity tier x lifecycle.
    #[default]
    NineGrid,
    /// Tempo tier x value tier.
    TempoValue,
}

/// Metric behind the activity axis of the nine-grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ActivityMetric {
    #[default]
    Frequency,
    /// Externally supplied composite activity index.
    Cai,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub min_transactions: u32,
    pub platform_id: Option<String>,
    pub profile: GridProfile,
    pub activity_metric: ActivityMetric,
    pub lifecycle: LifecycleConfig,
    pub tiers: TierConfig,
    pub ros: RosConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_transactions: 2,
            platform_id: None,
            profile: GridProfile::NineGrid,
            activity_metric: ActivityMetric::Frequency,
            lifecycle: LifecycleConfig::default(),
            tiers: TierConfig::default(),
            ros: RosConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub newbie_max_age_days: f64,
    pub active_max_recency_days: f64,
    pub sleepy_max_recency_days: f64,
    pub half_sleepy_max_recency_days: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            newbie_max_age_days: 30.0,
            active_max_recency_days: 7.0,
            sleepy_max_recency_days: 14.0,
            half_sleepy_max_recency_days: 21.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub value: QuantileCuts,
    pub activity: QuantileCuts,
    pub tempo: QuantileCuts,
    pub tempo_value: QuantileCuts,
    pub rank: RankShares,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            value: QuantileCuts::TWENTY_EIGHTY,
            activity: QuantileCuts::TWENTY_EIGHTY,
            tempo: QuantileCuts::TWENTY_EIGHTY,
            tempo_value: QuantileCuts::TWENTY_EIGHTY,
            rank: RankShares::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RosConfig {
    pub risk_threshold: f64,
    /// Days; a predicted next purchase at or inside this window is an opportunity.
    pub opportunity_days: f64,
    pub stability_low: f64,
    pub stability_high: f64,
    pub default_churn_probability: f64,
    pub default_next_purchase_days: f64,
    pub default_regularity_index: f64,
}

impl Default for RosConfig {
    fn default() -> Self {
        Self {
            risk_threshold: 0.6,
            opportunity_days: 14.0,
            stability_low: 0.3,
            stability_high: 0.7,
            default_churn_probability: 0.0,
            default_next_purchase_days: 30.0,
            default_regularity_index: 0.5,
        }
    }
}

impl AnalysisConfig {
    pub fn from_toml(toml_str: &str) -> DnaResult<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> DnaResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> DnaResult<()> {
        if self.min_transactions == 0 {
            return Err(DnaError::InvalidConfig(
                "min_transactions must be at least 1".into(),
            ));
        }
        for (axis, cuts) in [
            ("value", &self.tiers.value),
            ("activity", &self.tiers.activity),
            ("tempo", &self.tiers.tempo),
            ("tempo_value", &self.tiers.tempo_value),
        ] {
            cuts.validate()
                .map_err(|e| DnaError::InvalidConfig(format!("tiers.{axis}: {e}")))?;
        }
        self.tiers
            .rank
            .validate()
            .map_err(|e| DnaError::InvalidConfig(format!("tiers.rank: {e}")))?;
        if self.ros.stability_low > self.ros.stability_high {
            return Err(DnaError::InvalidConfig(format!(
                "ros.stability_low ({}) exceeds ros.stability_high ({})",
                self.ros.stability_low, self.ros.stability_high
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = AnalysisConfig::from_toml("").unwrap();
        assert_eq!(config, AnalysisConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = AnalysisConfig::from_toml(
            r#"
            min_transactions = 3
            profile = "tempo_value"

            [tiers.tempo]
            lower = 0.3
            upper = 0.7

            [ros]
            risk_threshold = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.min_transactions, 3);
        assert_eq!(config.profile, GridProfile::TempoValue);
        assert_eq!(config.tiers.tempo, QuantileCuts { lower: 0.3, upper: 0.7 });
        assert_eq!(config.tiers.value, QuantileCuts::TWENTY_EIGHTY);
        assert_eq!(config.ros.risk_threshold, 0.5);
        assert_eq!(config.ros.stability_high, 0.7);
    }

    #[test]
    fn rejects_inverted_stability_band() {
        let err = AnalysisConfig::from_toml(
            r#"
            [ros]
            stability_low = 0.8
            stability_high = 0.2
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, DnaError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_zero_min_transactions() {
        let err = AnalysisConfig::from_toml("min_transactions = 0").unwrap_err();
        assert!(matches!(err, DnaError::InvalidConfig(_)));
    }
}
