use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::grid::SegmentCode;
use crate::lifecycle::Lifecycle;
use crate::ros::RosFlags;
use crate::strategy::StrategyOutcome;
use crate::tiers::Tier;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub customer_id: String,
    pub timestamp: DateTime<Utc>,
    pub amount: f64,
    pub platform_id: Option<String>,
}

/// One row per retained customer, built by [`crate::aggregate::aggregate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerProfile {
    pub customer_id: String,
    pub total_spent: f64,
    pub times: u32,
    pub first_purchase: DateTime<Utc>,
    pub last_purchase: DateTime<Utc>,
    /// Days between first and last purchase, floored at 1.
    pub ipt: f64,
    pub r_value: f64,
    pub f_value: f64,
    pub m_value: f64,
    pub customer_age_days: f64,
    pub clv: f64,
    pub mean_gap_days: Option<f64>,
    /// Purchases per 30 days across the observed span.
    pub purchase_rate: f64,
}

/// Externally scored inputs for a customer. Every field is optional; the
/// ROS scorer substitutes its defaults for whatever is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerSignals {
    pub churn_probability: Option<f64>,
    pub predicted_next_purchase_days: Option<f64>,
    pub regularity_index: Option<f64>,
    pub cai: Option<f64>,
}

pub type SignalBook = HashMap<String, CustomerSignals>;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedCustomer {
    pub profile: CustomerProfile,
    pub lifecycle: Option<Lifecycle>,
    pub cai: Option<f64>,
    pub value_tier: Option<Tier>,
    pub activity_tier: Option<Tier>,
    pub tempo_tier: Option<Tier>,
    pub tempo_value_tier: Option<Tier>,
    pub ipt_rank_tier: Option<Tier>,
    pub clv_rank_tier: Option<Tier>,
    pub ros: RosFlags,
    pub segment_code: Option<SegmentCode>,
    pub strategy: StrategyOutcome,
}

impl ClassifiedCustomer {
    pub fn customer_id(&self) -> &str {
        &self.profile.customer_id
    }

    pub fn ros_code(&self) -> String {
        self.ros.code()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub label: String,
    pub count: usize,
    pub avg_m: f64,
    pub avg_f: f64,
    pub avg_ipt: f64,
    pub avg_clv: f64,
}

/// Customers of one strategy row after the ROS baseline filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentReport {
    pub segment_name: String,
    pub segment_code: String,
    pub ros_baseline: String,
    pub summary: GroupSummary,
}
