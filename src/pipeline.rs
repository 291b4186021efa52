use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::aggregate::aggregate;
use crate::config::{ActivityMetric, AnalysisConfig, GridProfile};
use crate::error::{DnaError, DnaResult};
use crate::grid::SegmentCode;
use crate::lifecycle::{self, Lifecycle};
use crate::models::{
    ClassifiedCustomer, CustomerProfile, SegmentReport, SignalBook, Transaction,
};
use crate::report::summarize;
use crate::ros::{self, RosFlags};
use crate::strategy::{StrategyBook, StrategyOutcome};
use crate::tiers::{RankOrder, Tier};

#[derive(Debug, Clone)]
pub struct SegmentationRun {
    pub now: DateTime<Utc>,
    pub profile: GridProfile,
    pub customers: Vec<ClassifiedCustomer>,
    pub segment_reports: Vec<SegmentReport>,
}

impl SegmentationRun {
    /// Customers that took part in the grid analysis.
    pub fn classified(&self) -> impl Iterator<Item = &ClassifiedCustomer> {
        self.customers.iter().filter(|c| c.lifecycle.is_some())
    }

    pub fn unknown_count(&self) -> usize {
        self.customers.len() - self.classified().count()
    }
}

/// Tier assignments for the known-lifecycle subset, aligned with it.
struct Axes {
    value: Vec<Option<Tier>>,
    activity: Vec<Option<Tier>>,
    tempo: Vec<Option<Tier>>,
    tempo_value: Vec<Option<Tier>>,
    ipt_rank: Vec<Option<Tier>>,
    clv_rank: Vec<Option<Tier>>,
}

fn classify_axes(
    known: &[(&CustomerProfile, Option<f64>)],
    config: &AnalysisConfig,
) -> DnaResult<Axes> {
    fn column(
        known: &[(&CustomerProfile, Option<f64>)],
        f: impl Fn(&CustomerProfile) -> f64,
    ) -> Vec<Option<f64>> {
        known.iter().map(|(p, _)| Some(f(p))).collect()
    }

    let m_values = column(known, |p| p.m_value);
    let activity_values = match config.activity_metric {
        ActivityMetric::Frequency => column(known, |p| p.f_value),
        ActivityMetric::Cai => known.iter().map(|(_, cai)| *cai).collect(),
    };
    let activity_column = match config.activity_metric {
        ActivityMetric::Frequency => "f_value",
        ActivityMetric::Cai => "cai",
    };
    let tiers = &config.tiers;

    Ok(Axes {
        value: tiers.value.classify(&m_values, "m_value")?,
        activity: tiers.activity.classify(&activity_values, activity_column)?,
        tempo: tiers.tempo.classify(&column(known, |p| p.purchase_rate), "purchase_rate")?,
        tempo_value: tiers.tempo_value.classify(&m_values, "m_value")?,
        ipt_rank: tiers
            .rank
            .classify(&column(known, |p| p.ipt), RankOrder::Ascending, "ipt")?,
        clv_rank: tiers
            .rank
            .classify(&column(known, |p| p.clv), RankOrder::Descending, "clv")?,
    })
}

fn unclassified(profile: CustomerProfile, ros: RosFlags, cai: Option<f64>) -> ClassifiedCustomer {
    ClassifiedCustomer {
        profile,
        lifecycle: None,
        cai,
        value_tier: None,
        activity_tier: None,
        tempo_tier: None,
        tempo_value_tier: None,
        ipt_rank_tier: None,
        clv_rank_tier: None,
        ros,
        segment_code: None,
        strategy: StrategyOutcome::Ungraded,
    }
}

/// Runs the whole pipeline over one batch. Any aggregation or
/// classification error aborts the run; no partial table is returned.
/// Passing `strategy = None` skips only the lookup stage.
pub fn run(
    transactions: &[Transaction],
    signals: &SignalBook,
    strategy: Option<&StrategyBook>,
    config: &AnalysisConfig,
    now: DateTime<Utc>,
) -> DnaResult<SegmentationRun> {
    config.validate()?;
    let profiles = aggregate(
        transactions,
        config.min_transactions,
        config.platform_id.as_deref(),
        now,
    )?;

    if config.activity_metric == ActivityMetric::Cai
        && !profiles
            .iter()
            .any(|p| signals.get(&p.customer_id).and_then(|s| s.cai).is_some())
    {
        return Err(DnaError::missing("cai"));
    }

    let staged: Vec<(CustomerProfile, Option<Lifecycle>, RosFlags, Option<f64>)> = profiles
        .into_iter()
        .map(|profile| {
            let signal = signals.get(&profile.customer_id);
            let stage = lifecycle::classify_profile(&profile, &config.lifecycle);
            let flags = ros::score_profile(&profile, signal, &config.ros);
            let cai = signal.and_then(|s| s.cai).filter(|v| v.is_finite());
            (profile, stage, flags, cai)
        })
        .collect();

    let known: Vec<(&CustomerProfile, Option<f64>)> = staged
        .iter()
        .filter(|(_, stage, _, _)| stage.is_some())
        .map(|(p, _, _, cai)| (p, *cai))
        .collect();
    let unknown = staged.len() - known.len();
    if unknown > 0 {
        warn!(unknown, "customers with unknown lifecycle left out of grid analysis");
    }
    if known.is_empty() {
        return Err(DnaError::InsufficientData {
            column: "lifecycle".to_string(),
        });
    }

    if config.activity_metric == ActivityMetric::Cai {
        let without_cai = known.iter().filter(|(_, cai)| cai.is_none()).count();
        if without_cai > 0 {
            warn!(without_cai, "customers without a CAI value left out of the grid");
        }
    }

    let axes = classify_axes(&known, config)?;

    let mut customers = Vec::with_capacity(staged.len());
    let mut position = 0usize;
    for (profile, stage, flags, cai) in staged {
        let Some(stage) = stage else {
            customers.push(unclassified(profile, flags, cai));
            continue;
        };
        let i = position;
        position += 1;

        let segment_code = SegmentCode::compose(
            config.profile,
            Some(stage),
            axes.value[i],
            axes.activity[i],
            axes.tempo[i],
            axes.tempo_value[i],
        );
        let strategy_outcome = match (&segment_code, strategy) {
            (Some(code), _) if code.is_hidden() => StrategyOutcome::Hidden,
            (Some(code), Some(book)) => book.lookup(code, &flags),
            (Some(_), None) => StrategyOutcome::NotAvailable,
            (None, _) => StrategyOutcome::Ungraded,
        };

        customers.push(ClassifiedCustomer {
            profile,
            lifecycle: Some(stage),
            cai,
            value_tier: axes.value[i],
            activity_tier: axes.activity[i],
            tempo_tier: axes.tempo[i],
            tempo_value_tier: axes.tempo_value[i],
            ipt_rank_tier: axes.ipt_rank[i],
            clv_rank_tier: axes.clv_rank[i],
            ros: flags,
            segment_code,
            strategy: strategy_outcome,
        });
    }

    let segment_reports = strategy
        .map(|book| segment_reports(&customers, book))
        .unwrap_or_default();

    let mapped = customers
        .iter()
        .filter(|c| matches!(c.strategy, StrategyOutcome::Mapped { .. }))
        .count();
    info!(
        customers = customers.len(),
        unknown,
        mapped,
        profile = ?config.profile,
        "segmentation run complete"
    );

    Ok(SegmentationRun {
        now,
        profile: config.profile,
        customers,
        segment_reports,
    })
}

/// For each strategy row, the customers of its grid cell whose ROS flags
/// satisfy the row's baseline. Rows without members are kept with a zero
/// count; hidden customers never count.
pub fn segment_reports(customers: &[ClassifiedCustomer], book: &StrategyBook) -> Vec<SegmentReport> {
    book.entries()
        .iter()
        .map(|entry| {
            let members: Vec<&ClassifiedCustomer> = customers
                .iter()
                .filter(|c| {
                    c.segment_code.as_ref().is_some_and(|code| {
                        !code.is_hidden()
                            && entry.matches_code(&code.to_string())
                            && entry.requirement.admits(&c.ros)
                    })
                })
                .collect();
            let segment_code = members
                .first()
                .and_then(|c| c.segment_code)
                .map(|code| code.to_string())
                .unwrap_or_else(|| entry.code_prefix().to_string());
            SegmentReport {
                segment_name: entry.segment_name.clone(),
                segment_code,
                ros_baseline: entry.ros_baseline.clone(),
                summary: summarize(&entry.segment_name, members.iter().copied()),
            }
        })
        .collect()
}
