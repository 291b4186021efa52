//! Risk / Opportunity / Stability scoring.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::RosConfig;
use crate::models::{CustomerProfile, CustomerSignals};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityLevel {
    Low,
    Medium,
    High,
}

impl StabilityLevel {
    /// `High` needs `score >= high`; `Medium` needs `score > low`.
    pub fn from_score(score: f64, low: f64, high: f64) -> Self {
        if score >= high {
            StabilityLevel::High
        } else if score > low {
            StabilityLevel::Medium
        } else {
            StabilityLevel::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StabilityLevel::Low => "S-Low",
            StabilityLevel::Medium => "S-Medium",
            StabilityLevel::High => "S-High",
        }
    }

    /// Accepts `S-Low` as well as the bare `Low`.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        let bare = token
            .strip_prefix("S-")
            .or_else(|| token.strip_prefix("s-"))
            .unwrap_or(token);
        match bare.to_ascii_lowercase().as_str() {
            "low" => Some(StabilityLevel::Low),
            "medium" | "mid" => Some(StabilityLevel::Medium),
            "high" => Some(StabilityLevel::High),
            _ => None,
        }
    }
}

impl fmt::Display for StabilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved scorer inputs after defaults were applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RosInputs {
    pub churn_probability: f64,
    pub predicted_next_purchase_days: f64,
    pub regularity_index: f64,
}

impl RosInputs {
    pub fn resolve(
        profile: &CustomerProfile,
        signals: Option<&CustomerSignals>,
        config: &RosConfig,
    ) -> Self {
        let finite = |v: Option<f64>| v.filter(|v| v.is_finite());
        let signals = signals.cloned().unwrap_or_default();
        Self {
            churn_probability: finite(signals.churn_probability)
                .unwrap_or(config.default_churn_probability),
            predicted_next_purchase_days: finite(signals.predicted_next_purchase_days)
                .or(profile.mean_gap_days)
                .unwrap_or(config.default_next_purchase_days),
            regularity_index: finite(signals.regularity_index)
                .unwrap_or(config.default_regularity_index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RosFlags {
    pub risk: bool,
    pub opportunity: bool,
    pub stability: StabilityLevel,
}

impl RosFlags {
    pub fn score(inputs: &RosInputs, config: &RosConfig) -> Self {
        Self {
            risk: inputs.churn_probability >= config.risk_threshold,
            opportunity: inputs.predicted_next_purchase_days <= config.opportunity_days,
            stability: StabilityLevel::from_score(
                inputs.regularity_index,
                config.stability_low,
                config.stability_high,
            ),
        }
    }

    /// Compound code. The baseline segments are checked, in order, before
    /// the general `{R|r}{O|o} + S-level` form.
    pub fn code(&self) -> String {
        let low = self.stability == StabilityLevel::Low;
        match (self.risk, self.opportunity) {
            (true, _) if low => "R + S-Low".to_string(),
            (false, true) if !low => "O".to_string(),
            (false, true) => "O + S-Low".to_string(),
            (risk, opportunity) => format!(
                "{}{} + {}",
                if risk { 'R' } else { 'r' },
                if opportunity { 'O' } else { 'o' },
                self.stability
            ),
        }
    }
}

impl fmt::Display for RosFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

pub fn score_profile(
    profile: &CustomerProfile,
    signals: Option<&CustomerSignals>,
    config: &RosConfig,
) -> RosFlags {
    RosFlags::score(&RosInputs::resolve(profile, signals, config), config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(risk: bool, opportunity: bool, stability: StabilityLevel) -> RosFlags {
        RosFlags {
            risk,
            opportunity,
            stability,
        }
    }

    #[test]
    fn stability_boundaries_are_half_open() {
        assert_eq!(StabilityLevel::from_score(0.3, 0.3, 0.7), StabilityLevel::Low);
        assert_eq!(StabilityLevel::from_score(0.31, 0.3, 0.7), StabilityLevel::Medium);
        assert_eq!(StabilityLevel::from_score(0.69, 0.3, 0.7), StabilityLevel::Medium);
        assert_eq!(StabilityLevel::from_score(0.7, 0.3, 0.7), StabilityLevel::High);
        assert_eq!(StabilityLevel::from_score(0.0, 0.3, 0.7), StabilityLevel::Low);
    }

    #[test]
    fn risk_with_low_stability_preempts_opportunity() {
        assert_eq!(flags(true, true, StabilityLevel::Low).code(), "R + S-Low");
        assert_eq!(flags(true, false, StabilityLevel::Low).code(), "R + S-Low");
    }

    #[test]
    fn opportunity_baselines() {
        assert_eq!(flags(false, true, StabilityLevel::Medium).code(), "O");
        assert_eq!(flags(false, true, StabilityLevel::High).code(), "O");
        assert_eq!(flags(false, true, StabilityLevel::Low).code(), "O + S-Low");
    }

    #[test]
    fn general_codes_use_case_for_flags() {
        assert_eq!(flags(true, true, StabilityLevel::High).code(), "RO + S-High");
        assert_eq!(flags(true, false, StabilityLevel::Medium).code(), "Ro + S-Medium");
        assert_eq!(flags(false, false, StabilityLevel::Low).code(), "ro + S-Low");
        assert_eq!(flags(false, false, StabilityLevel::High).code(), "ro + S-High");
    }

    #[test]
    fn thresholds_are_inclusive() {
        let config = RosConfig::default();
        let inputs = RosInputs {
            churn_probability: config.risk_threshold,
            predicted_next_purchase_days: config.opportunity_days,
            regularity_index: config.stability_high,
        };
        assert_eq!(
            RosFlags::score(&inputs, &config),
            flags(true, true, StabilityLevel::High)
        );
    }

    #[test]
    fn missing_signals_fall_back_to_defaults() {
        use chrono::{TimeZone, Utc};
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut profile = CustomerProfile {
            customer_id: "c1".into(),
            total_spent: 10.0,
            times: 1,
            first_purchase: at,
            last_purchase: at,
            ipt: 1.0,
            r_value: 3.0,
            f_value: 1.0,
            m_value: 10.0,
            customer_age_days: 3.0,
            clv: 10.0,
            mean_gap_days: None,
            purchase_rate: 30.0,
        };
        let config = RosConfig::default();

        let inputs = RosInputs::resolve(&profile, None, &config);
        assert_eq!(inputs.churn_probability, 0.0);
        assert_eq!(inputs.predicted_next_purchase_days, 30.0);
        assert_eq!(inputs.regularity_index, 0.5);

        profile.mean_gap_days = Some(9.0);
        let partial = CustomerSignals {
            churn_probability: Some(0.9),
            ..CustomerSignals::default()
        };
        let inputs = RosInputs::resolve(&profile, Some(&partial), &config);
        assert_eq!(inputs.churn_probability, 0.9);
        assert_eq!(inputs.predicted_next_purchase_days, 9.0);
    }

    #[test]
    fn parses_stability_tokens() {
        assert_eq!(StabilityLevel::parse("S-Low"), Some(StabilityLevel::Low));
        assert_eq!(StabilityLevel::parse(" High "), Some(StabilityLevel::High));
        assert_eq!(StabilityLevel::parse("s-medium"), Some(StabilityLevel::Medium));
        assert_eq!(StabilityLevel::parse("R"), None);
    }
}
