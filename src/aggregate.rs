use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{DnaError, DnaResult};
use crate::models::{CustomerProfile, Transaction};

const SECONDS_PER_DAY: f64 = 86_400.0;

pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1_000.0 / SECONDS_PER_DAY
}

struct Accumulator {
    total_spent: f64,
    times: u32,
    first_purchase: DateTime<Utc>,
    last_purchase: DateTime<Utc>,
}

/// Collapses transactions into one profile per customer with at least
/// `min_transactions` purchases, ordered by customer id.
pub fn aggregate(
    transactions: &[Transaction],
    min_transactions: u32,
    platform_id: Option<&str>,
    now: DateTime<Utc>,
) -> DnaResult<Vec<CustomerProfile>> {
    let mut groups: BTreeMap<&str, Accumulator> = BTreeMap::new();
    let mut dropped = 0usize;
    let mut considered = 0usize;

    for tx in transactions {
        if let Some(platform) = platform_id {
            if tx.platform_id.as_deref() != Some(platform) {
                continue;
            }
        }
        considered += 1;

        let customer_id = tx.customer_id.trim();
        if customer_id.is_empty() || !tx.amount.is_finite() || tx.amount <= 0.0 {
            dropped += 1;
            continue;
        }

        let entry = groups.entry(customer_id).or_insert_with(|| Accumulator {
            total_spent: 0.0,
            times: 0,
            first_purchase: tx.timestamp,
            last_purchase: tx.timestamp,
        });
        entry.total_spent += tx.amount;
        entry.times += 1;
        entry.first_purchase = entry.first_purchase.min(tx.timestamp);
        entry.last_purchase = entry.last_purchase.max(tx.timestamp);
    }

    if dropped > 0 {
        warn!(dropped, "skipped transactions without a customer id or a positive amount");
    }

    let customers = groups.len();
    let profiles: Vec<CustomerProfile> = groups
        .into_iter()
        .filter(|(_, acc)| acc.times >= min_transactions)
        .map(|(customer_id, acc)| build_profile(customer_id, acc, now))
        .collect();

    if profiles.is_empty() {
        return Err(DnaError::EmptyCohort {
            transactions: considered,
            customers,
            min_transactions,
        });
    }

    info!(
        transactions = considered,
        customers,
        retained = profiles.len(),
        min_transactions,
        "aggregated customer profiles"
    );
    Ok(profiles)
}

fn build_profile(customer_id: &str, acc: Accumulator, now: DateTime<Utc>) -> CustomerProfile {
    let times = acc.times;
    let ipt = days_between(acc.first_purchase, acc.last_purchase).max(1.0);
    let mean_gap_days = (times >= 2).then(|| ipt / f64::from(times - 1));

    CustomerProfile {
        customer_id: customer_id.to_string(),
        total_spent: acc.total_spent,
        times,
        first_purchase: acc.first_purchase,
        last_purchase: acc.last_purchase,
        ipt,
        r_value: days_between(acc.last_purchase, now),
        f_value: f64::from(times),
        m_value: acc.total_spent / f64::from(times),
        customer_age_days: days_between(acc.first_purchase, now),
        clv: acc.total_spent,
        mean_gap_days,
        purchase_rate: f64::from(times) * 30.0 / ipt,
    }
}
