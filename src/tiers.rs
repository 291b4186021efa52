use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DnaError, DnaResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    High,
    Mid,
    Low,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::High, Tier::Mid, Tier::Low];

    /// Dashboard label: 高 / 中 / 低.
    pub fn label(self) -> &'static str {
        match self {
            Tier::High => "高",
            Tier::Mid => "中",
            Tier::Low => "低",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "高" => Some(Tier::High),
            "中" => Some(Tier::Mid),
            "低" => Some(Tier::Low),
            _ => None,
        }
    }

    /// 1, 2, 3 from best to worst.
    pub fn rank(self) -> u8 {
        match self {
            Tier::High => 1,
            Tier::Mid => 2,
            Tier::Low => 3,
        }
    }

    pub fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            1 => Some(Tier::High),
            2 => Some(Tier::Mid),
            3 => Some(Tier::Low),
            _ => None,
        }
    }

    /// `T1`, `V2`, ... for a given axis prefix.
    pub fn ranked_label(self, prefix: char) -> String {
        format!("{prefix}{}", self.rank())
    }

    fn from_cut_points(value: f64, lower: f64, upper: f64) -> Self {
        if value >= upper {
            Tier::High
        } else if value >= lower {
            Tier::Mid
        } else {
            Tier::Low
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Type-7 quantile (linear interpolation between order statistics).
/// `sorted` must be ascending and non-empty.
pub fn quantile(sorted: &[f64], p: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * p.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Quantile-of-value split into three tiers. A value must reach the upper
/// cut to be `High` and the lower cut to be `Mid`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantileCuts {
    pub lower: f64,
    pub upper: f64,
}

impl QuantileCuts {
    pub const TWENTY_EIGHTY: QuantileCuts = QuantileCuts {
        lower: 0.2,
        upper: 0.8,
    };

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.lower) || !(0.0..=1.0).contains(&self.upper) {
            return Err(format!(
                "quantiles must lie in [0, 1], got {} and {}",
                self.lower, self.upper
            ));
        }
        if self.lower > self.upper {
            return Err(format!(
                "lower quantile {} exceeds upper quantile {}",
                self.lower, self.upper
            ));
        }
        Ok(())
    }

    /// Cut values `(q(lower), q(upper))` over the non-missing entries.
    pub fn cut_points(&self, values: &[Option<f64>], column: &str) -> DnaResult<(f64, f64)> {
        self.validate().map_err(DnaError::InvalidConfig)?;
        let mut sorted: Vec<f64> = values.iter().filter_map(|v| usable(*v)).collect();
        if sorted.is_empty() {
            return Err(DnaError::InsufficientData {
                column: column.to_string(),
            });
        }
        sorted.sort_by(f64::total_cmp);
        let cuts = (quantile(&sorted, self.lower), quantile(&sorted, self.upper));
        debug!(column, lower = cuts.0, upper = cuts.1, "quantile cut points");
        Ok(cuts)
    }

    /// One tier per input row; missing values stay `None`.
    pub fn classify(&self, values: &[Option<f64>], column: &str) -> DnaResult<Vec<Option<Tier>>> {
        let (lower, upper) = self.cut_points(values, column)?;
        Ok(values
            .iter()
            .map(|v| usable(*v).map(|v| Tier::from_cut_points(v, lower, upper)))
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOrder {
    /// Largest value ranks first.
    Descending,
    /// Smallest value ranks first.
    Ascending,
}

/// Row-rank split: the first `ceil(top * N)` rows are `High` (T1), rows up
/// to `ceil(cumulative * N)` are `Mid` (T2), the rest `Low` (T3). Ties are
/// ordered by input position so group sizes are exact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankShares {
    pub top: f64,
    pub cumulative: f64,
}

impl Default for RankShares {
    fn default() -> Self {
        Self {
            top: 0.2,
            cumulative: 0.5,
        }
    }
}

/// `ceil(share * n)` computed in basis points so that e.g. 0.2 * 15 is 3,
/// not 4.
fn ceil_share(n: usize, share: f64) -> usize {
    let basis_points = (share * 10_000.0).round() as u64;
    ((n as u64 * basis_points + 9_999) / 10_000) as usize
}

impl RankShares {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.top) || !(0.0..=1.0).contains(&self.cumulative) {
            return Err(format!(
                "shares must lie in [0, 1], got {} and {}",
                self.top, self.cumulative
            ));
        }
        if self.top > self.cumulative {
            return Err(format!(
                "top share {} exceeds cumulative share {}",
                self.top, self.cumulative
            ));
        }
        Ok(())
    }

    pub fn classify(
        &self,
        values: &[Option<f64>],
        order: RankOrder,
        column: &str,
    ) -> DnaResult<Vec<Option<Tier>>> {
        self.validate().map_err(DnaError::InvalidConfig)?;
        let mut ranked: Vec<(usize, f64)> = values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| usable(*v).map(|v| (i, v)))
            .collect();
        if ranked.is_empty() {
            return Err(DnaError::InsufficientData {
                column: column.to_string(),
            });
        }

        // sort_by is stable, so equal values keep their input order
        match order {
            RankOrder::Descending => ranked.sort_by(|a, b| b.1.total_cmp(&a.1)),
            RankOrder::Ascending => ranked.sort_by(|a, b| a.1.total_cmp(&b.1)),
        }

        let n = ranked.len();
        let top = ceil_share(n, self.top);
        let upto_mid = ceil_share(n, self.cumulative);
        debug!(column, n, top, upto_mid, "rank tier sizes");

        let mut tiers = vec![None; values.len()];
        for (position, (index, _)) in ranked.into_iter().enumerate() {
            tiers[index] = Some(if position < top {
                Tier::High
            } else if position < upto_mid {
                Tier::Mid
            } else {
                Tier::Low
            });
        }
        Ok(tiers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(tiers: &[Option<Tier>], tier: Tier) -> usize {
        tiers.iter().filter(|t| **t == Some(tier)).count()
    }

    fn one_to_ten() -> Vec<Option<f64>> {
        (1..=10).map(|v| Some(v as f64)).collect()
    }

    #[test]
    fn quantile_interpolates_between_order_statistics() {
        let sorted: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        assert!((quantile(&sorted, 0.2) - 2.8).abs() < 1e-9);
        assert!((quantile(&sorted, 0.8) - 8.2).abs() < 1e-9);
        assert_eq!(quantile(&sorted, 0.0), 1.0);
        assert_eq!(quantile(&sorted, 1.0), 10.0);
        assert_eq!(quantile(&[4.0], 0.5), 4.0);
    }

    #[test]
    fn twenty_eighty_split_of_one_to_ten() {
        let tiers = QuantileCuts::TWENTY_EIGHTY
            .classify(&one_to_ten(), "m_value")
            .unwrap();
        assert_eq!(count(&tiers, Tier::High), 2);
        assert_eq!(count(&tiers, Tier::Mid), 6);
        assert_eq!(count(&tiers, Tier::Low), 2);
        assert_eq!(tiers[8], Some(Tier::High));
        assert_eq!(tiers[7], Some(Tier::Mid));
        assert_eq!(tiers[2], Some(Tier::Mid));
        assert_eq!(tiers[1], Some(Tier::Low));
    }

    #[test]
    fn value_on_a_cut_enters_the_better_tier() {
        // q(0.5) of [1, 2, 3] is exactly 2
        let values = vec![Some(1.0), Some(2.0), Some(3.0)];
        let cuts = QuantileCuts { lower: 0.5, upper: 1.0 };
        let tiers = cuts.classify(&values, "x").unwrap();
        assert_eq!(tiers, vec![Some(Tier::Low), Some(Tier::Mid), Some(Tier::High)]);
    }

    #[test]
    fn missing_values_are_ignored_and_left_untiered() {
        let values = vec![Some(1.0), None, Some(f64::NAN), Some(10.0)];
        let tiers = QuantileCuts::TWENTY_EIGHTY.classify(&values, "x").unwrap();
        assert_eq!(tiers[1], None);
        assert_eq!(tiers[2], None);
        assert_eq!(tiers[0], Some(Tier::Low));
        assert_eq!(tiers[3], Some(Tier::High));
    }

    #[test]
    fn all_missing_column_is_insufficient_data() {
        let values = vec![None, Some(f64::NAN)];
        let err = QuantileCuts::TWENTY_EIGHTY.classify(&values, "cai").unwrap_err();
        assert!(matches!(err, DnaError::InsufficientData { ref column } if column == "cai"));

        let err = RankShares::default()
            .classify(&values, RankOrder::Descending, "clv")
            .unwrap_err();
        assert!(matches!(err, DnaError::InsufficientData { .. }));
    }

    #[test]
    fn every_usable_row_gets_exactly_one_tier() {
        let values: Vec<Option<f64>> = [5.0, 5.0, 5.0, 1.0, 9.0, 3.0, 3.0]
            .iter()
            .map(|v| Some(*v))
            .collect();
        let tiers = QuantileCuts { lower: 0.3, upper: 0.6 }
            .classify(&values, "x")
            .unwrap();
        let total: usize = Tier::ALL.iter().map(|t| count(&tiers, *t)).sum();
        assert_eq!(total, values.len());
    }

    #[test]
    fn rank_tiers_are_exact_even_with_ties() {
        for n in [1usize, 3, 7, 10, 15, 21] {
            let values = vec![Some(42.0); n];
            let tiers = RankShares::default()
                .classify(&values, RankOrder::Descending, "clv")
                .unwrap();
            let t1 = count(&tiers, Tier::High);
            let t2 = count(&tiers, Tier::Mid);
            assert_eq!(t1, (0.2 * n as f64 - 1e-9).ceil() as usize, "n={n}");
            assert_eq!(t1 + t2, (0.5 * n as f64 - 1e-9).ceil() as usize, "n={n}");
            assert_eq!(t1 + t2 + count(&tiers, Tier::Low), n);
        }
    }

    #[test]
    fn rank_order_controls_which_end_is_top() {
        let values = one_to_ten();
        let desc = RankShares::default()
            .classify(&values, RankOrder::Descending, "clv")
            .unwrap();
        assert_eq!(desc[9], Some(Tier::High));
        assert_eq!(desc[8], Some(Tier::High));
        assert_eq!(desc[0], Some(Tier::Low));

        let asc = RankShares::default()
            .classify(&values, RankOrder::Ascending, "ipt")
            .unwrap();
        assert_eq!(asc[0], Some(Tier::High));
        assert_eq!(asc[4], Some(Tier::Mid));
        assert_eq!(asc[5], Some(Tier::Low));
    }

    #[test]
    fn ceil_share_avoids_float_drift() {
        assert_eq!(ceil_share(15, 0.2), 3);
        assert_eq!(ceil_share(15, 0.5), 8);
        assert_eq!(ceil_share(10, 0.2), 2);
        assert_eq!(ceil_share(1, 0.2), 1);
        assert_eq!(ceil_share(0, 0.5), 0);
    }

    #[test]
    fn inverted_cuts_are_rejected() {
        let cuts = QuantileCuts { lower: 0.9, upper: 0.1 };
        let err = cuts.classify(&one_to_ten(), "x").unwrap_err();
        assert!(matches!(err, DnaError::InvalidConfig(_)));
    }

    #[test]
    fn labels_round_trip() {
        for tier in Tier::ALL {
            assert_eq!(Tier::from_label(tier.label()), Some(tier));
            assert_eq!(Tier::from_rank(tier.rank()), Some(tier));
        }
        assert_eq!(Tier::Mid.ranked_label('T'), "T2");
    }
}
