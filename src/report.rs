use std::collections::HashMap;
use std::fmt::Write;

use serde::Serialize;

use crate::error::DnaResult;
use crate::models::{ClassifiedCustomer, GroupSummary};
use crate::pipeline::SegmentationRun;
use crate::tiers::Tier;

pub fn summarize<'a>(
    label: &str,
    customers: impl IntoIterator<Item = &'a ClassifiedCustomer>,
) -> GroupSummary {
    let mut count = 0usize;
    let (mut m, mut f, mut ipt, mut clv) = (0.0, 0.0, 0.0, 0.0);
    for c in customers {
        count += 1;
        m += c.profile.m_value;
        f += c.profile.f_value;
        ipt += c.profile.ipt;
        clv += c.profile.clv;
    }
    let mean = |total: f64| if count == 0 { 0.0 } else { total / count as f64 };

    GroupSummary {
        label: label.to_string(),
        count,
        avg_m: mean(m),
        avg_f: mean(f),
        avg_ipt: mean(ipt),
        avg_clv: mean(clv),
    }
}

/// Groups customers by `key` (customers without a key are skipped) and
/// orders the groups by size, then label.
pub fn summarize_by<F>(customers: &[ClassifiedCustomer], key: F) -> Vec<GroupSummary>
where
    F: Fn(&ClassifiedCustomer) -> Option<String>,
{
    let mut groups: HashMap<String, Vec<&ClassifiedCustomer>> = HashMap::new();
    for customer in customers {
        if let Some(label) = key(customer) {
            groups.entry(label).or_default().push(customer);
        }
    }

    let mut summaries: Vec<GroupSummary> = groups
        .into_iter()
        .map(|(label, members)| summarize(&label, members))
        .collect();
    summaries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    summaries
}

pub fn by_segment(customers: &[ClassifiedCustomer]) -> Vec<GroupSummary> {
    summarize_by(customers, |c| c.segment_code.map(|code| code.to_string()))
}

pub fn by_lifecycle(customers: &[ClassifiedCustomer]) -> Vec<GroupSummary> {
    summarize_by(customers, |c| {
        Some(c.lifecycle.map_or("unknown", |l| l.as_str()).to_string())
    })
}

pub fn by_ros(customers: &[ClassifiedCustomer]) -> Vec<GroupSummary> {
    summarize_by(customers, |c| c.lifecycle.map(|_| c.ros_code()))
}

pub fn by_tier<F>(customers: &[ClassifiedCustomer], tier: F) -> Vec<GroupSummary>
where
    F: Fn(&ClassifiedCustomer) -> Option<Tier>,
{
    summarize_by(customers, |c| tier(c).map(|t| t.label().to_string()))
}

/// Flattened row of the classified table, one per customer.
#[derive(Debug, Clone, Serialize)]
pub struct ExportRow<'a> {
    pub customer_id: &'a str,
    pub total_spent: f64,
    pub times: u32,
    pub first_purchase: String,
    pub last_purchase: String,
    pub ipt: f64,
    pub r_value: f64,
    pub f_value: f64,
    pub m_value: f64,
    pub customer_age_days: f64,
    pub clv: f64,
    pub cai: Option<f64>,
    pub lifecycle: &'static str,
    pub nes_status: &'static str,
    pub value_level: &'static str,
    pub activity_level: &'static str,
    pub tempo_tier: Option<String>,
    pub value_tier: Option<String>,
    pub ipt_tier: Option<String>,
    pub clv_tier: Option<String>,
    pub ros_code: String,
    pub segment_code: Option<String>,
    pub strategy_status: &'static str,
    pub segment_name: Option<&'a str>,
}

fn level(tier: Option<Tier>) -> &'static str {
    tier.map_or("", Tier::label)
}

impl<'a> From<&'a ClassifiedCustomer> for ExportRow<'a> {
    fn from(c: &'a ClassifiedCustomer) -> Self {
        let p = &c.profile;
        Self {
            customer_id: &p.customer_id,
            total_spent: p.total_spent,
            times: p.times,
            first_purchase: p.first_purchase.to_rfc3339(),
            last_purchase: p.last_purchase.to_rfc3339(),
            ipt: p.ipt,
            r_value: p.r_value,
            f_value: p.f_value,
            m_value: p.m_value,
            customer_age_days: p.customer_age_days,
            clv: p.clv,
            cai: c.cai,
            lifecycle: c.lifecycle.map_or("unknown", |l| l.as_str()),
            nes_status: c.lifecycle.map_or("", |l| l.nes_status()),
            value_level: level(c.value_tier),
            activity_level: level(c.activity_tier),
            tempo_tier: c.tempo_tier.map(|t| t.ranked_label('T')),
            value_tier: c.tempo_value_tier.map(|t| t.ranked_label('V')),
            ipt_tier: c.ipt_rank_tier.map(|t| t.ranked_label('T')),
            clv_tier: c.clv_rank_tier.map(|t| t.ranked_label('T')),
            ros_code: c.ros_code(),
            segment_code: c.segment_code.map(|code| code.to_string()),
            strategy_status: c.strategy.status(),
            segment_name: c.strategy.segment_name(),
        }
    }
}

pub fn write_csv<W: std::io::Write>(run: &SegmentationRun, writer: W) -> DnaResult<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for customer in &run.customers {
        writer.serialize(ExportRow::from(customer))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_summaries(output: &mut String, title: &str, summaries: &[GroupSummary], limit: usize) {
    let _ = writeln!(output);
    let _ = writeln!(output, "## {title}");

    if summaries.is_empty() {
        let _ = writeln!(output, "No customers in this view.");
        return;
    }
    let _ = writeln!(output, "| group | customers | avg M | avg F | avg IPT | avg CLV |");
    let _ = writeln!(output, "|---|---:|---:|---:|---:|---:|");
    for s in summaries.iter().take(limit) {
        let _ = writeln!(
            output,
            "| {} | {} | {:.2} | {:.2} | {:.1} | {:.2} |",
            s.label, s.count, s.avg_m, s.avg_f, s.avg_ipt, s.avg_clv
        );
    }
}

pub fn build_report(source: &str, run: &SegmentationRun) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Customer DNA Report");
    let _ = writeln!(
        output,
        "Generated for {} as of {} ({} customers, {} with unknown lifecycle)",
        source,
        run.now.format("%Y-%m-%d %H:%M UTC"),
        run.customers.len(),
        run.unknown_count()
    );

    write_summaries(&mut output, "Lifecycle", &by_lifecycle(&run.customers), usize::MAX);
    write_summaries(
        &mut output,
        "Value Level",
        &by_tier(&run.customers, |c| c.value_tier),
        usize::MAX,
    );
    write_summaries(&mut output, "Segments", &by_segment(&run.customers), 15);
    write_summaries(&mut output, "ROS", &by_ros(&run.customers), usize::MAX);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Strategy Coverage");
    if run.segment_reports.is_empty() {
        let _ = writeln!(output, "No strategy table was applied to this run.");
    } else {
        for report in &run.segment_reports {
            let baseline = if report.ros_baseline.is_empty() {
                "any ROS"
            } else {
                report.ros_baseline.as_str()
            };
            let _ = writeln!(
                output,
                "- {} ({}, {}): {} customers, avg CLV {:.2}",
                report.segment_name,
                report.segment_code,
                baseline,
                report.summary.count,
                report.summary.avg_clv
            );
        }
    }

    let unmapped = run
        .classified()
        .filter(|c| c.strategy.status() == "unmapped")
        .count();
    if unmapped > 0 {
        let _ = writeln!(output);
        let _ = writeln!(output, "{unmapped} customers fall in segments without a strategy row.");
    }

    output
}
