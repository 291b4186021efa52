use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::LifecycleConfig;
use crate::models::CustomerProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Newbie,
    Active,
    Sleepy,
    HalfSleepy,
    Dormant,
}

impl Lifecycle {
    pub const ALL: [Lifecycle; 5] = [
        Lifecycle::Newbie,
        Lifecycle::Active,
        Lifecycle::Sleepy,
        Lifecycle::HalfSleepy,
        Lifecycle::Dormant,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Lifecycle::Newbie => "newbie",
            Lifecycle::Active => "active",
            Lifecycle::Sleepy => "sleepy",
            Lifecycle::HalfSleepy => "half_sleepy",
            Lifecycle::Dormant => "dormant",
        }
    }

    /// Trailing letter of a nine-grid segment code.
    pub fn grid_letter(self) -> char {
        match self {
            Lifecycle::Newbie => 'N',
            Lifecycle::Active => 'C',
            Lifecycle::Sleepy => 'S',
            Lifecycle::HalfSleepy => 'H',
            Lifecycle::Dormant => 'D',
        }
    }

    pub fn from_grid_letter(letter: char) -> Option<Self> {
        Lifecycle::ALL
            .into_iter()
            .find(|stage| stage.grid_letter() == letter)
    }

    /// Newbie / Engaged / Sleeping status code.
    pub fn nes_status(self) -> &'static str {
        match self {
            Lifecycle::Newbie => "N",
            Lifecycle::Active => "E0",
            Lifecycle::Sleepy => "S1",
            Lifecycle::HalfSleepy => "S2",
            Lifecycle::Dormant => "S3",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn known(days: Option<f64>) -> Option<f64> {
    days.filter(|d| d.is_finite() && *d >= 0.0)
}

/// First match wins; the age check runs before any recency check.
/// Returns `None` (unknown) when either input is missing, non-finite or
/// negative.
pub fn classify(
    customer_age_days: Option<f64>,
    r_value: Option<f64>,
    config: &LifecycleConfig,
) -> Option<Lifecycle> {
    let age = known(customer_age_days)?;
    let recency = known(r_value)?;

    let stage = if age <= config.newbie_max_age_days {
        Lifecycle::Newbie
    } else if recency <= config.active_max_recency_days {
        Lifecycle::Active
    } else if recency <= config.sleepy_max_recency_days {
        Lifecycle::Sleepy
    } else if recency <= config.half_sleepy_max_recency_days {
        Lifecycle::HalfSleepy
    } else {
        Lifecycle::Dormant
    };
    Some(stage)
}

pub fn classify_profile(profile: &CustomerProfile, config: &LifecycleConfig) -> Option<Lifecycle> {
    classify(
        Some(profile.customer_age_days),
        Some(profile.r_value),
        config,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(age: f64, recency: f64) -> Option<Lifecycle> {
        classify(Some(age), Some(recency), &LifecycleConfig::default())
    }

    #[test]
    fn recency_bands() {
        assert_eq!(stage(100.0, 0.0), Some(Lifecycle::Active));
        assert_eq!(stage(100.0, 7.0), Some(Lifecycle::Active));
        assert_eq!(stage(100.0, 7.5), Some(Lifecycle::Sleepy));
        assert_eq!(stage(100.0, 14.0), Some(Lifecycle::Sleepy));
        assert_eq!(stage(100.0, 21.0), Some(Lifecycle::HalfSleepy));
        assert_eq!(stage(100.0, 21.01), Some(Lifecycle::Dormant));
        assert_eq!(stage(100.0, 365.0), Some(Lifecycle::Dormant));
    }

    #[test]
    fn young_customers_are_newbies_whatever_their_recency() {
        assert_eq!(stage(30.0, 29.0), Some(Lifecycle::Newbie));
        assert_eq!(stage(5.0, 1.0), Some(Lifecycle::Newbie));
        assert_eq!(stage(30.5, 29.0), Some(Lifecycle::Dormant));
    }

    #[test]
    fn unusable_inputs_are_unknown() {
        let config = LifecycleConfig::default();
        assert_eq!(classify(None, Some(3.0), &config), None);
        assert_eq!(classify(Some(40.0), None, &config), None);
        assert_eq!(classify(Some(f64::NAN), Some(3.0), &config), None);
        assert_eq!(classify(Some(40.0), Some(-2.0), &config), None);
    }

    #[test]
    fn grid_letters_round_trip() {
        for stage in Lifecycle::ALL {
            assert_eq!(Lifecycle::from_grid_letter(stage.grid_letter()), Some(stage));
        }
        assert_eq!(Lifecycle::from_grid_letter('X'), None);
        assert_eq!(Lifecycle::HalfSleepy.nes_status(), "S2");
    }
}
