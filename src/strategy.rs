use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{DnaError, DnaResult};
use crate::grid::SegmentCode;
use crate::ros::{RosFlags, StabilityLevel};

const STRATEGY_COLUMNS: usize = 9;
const DETAIL_COLUMNS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyEntry {
    pub segment_name: String,
    pub ros_baseline: String,
    pub script_code: String,
    pub strategy_example: String,
    pub tempo: String,
    pub value: String,
    pub email_frequency: String,
    pub discount_percentage: String,
    pub kpi_tracking: String,
    #[serde(skip)]
    pub requirement: RosRequirement,
}

impl StrategyEntry {
    /// `A1／B2` becomes `("A1", Some("B2"))`.
    pub fn script_codes(&self) -> (Option<&str>, Option<&str>) {
        let mut parts = self
            .script_code
            .split(['／', '/'])
            .map(str::trim)
            .filter(|p| !p.is_empty());
        (parts.next(), parts.next())
    }

    /// Segment name without its `-N` / `-C` style suffix.
    pub fn code_prefix(&self) -> &str {
        self.segment_name
            .split('-')
            .next()
            .unwrap_or_default()
            .trim()
    }

    pub fn matches_code(&self, code: &str) -> bool {
        !code.is_empty() && self.segment_name.trim().starts_with(code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyDetail {
    pub code: String,
    pub baseline: String,
    pub core_action: String,
    pub channel: String,
    pub main_kpi: String,
}

/// Structured form of a strategy row's ROS baseline, e.g. `R + S-Low`,
/// `S-High + O` or `Medium + R`. Unset fields match anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RosRequirement {
    pub risk: Option<bool>,
    pub opportunity: Option<bool>,
    pub stability: Option<StabilityLevel>,
}

impl RosRequirement {
    pub fn parse(baseline: &str) -> Self {
        let mut requirement = RosRequirement::default();
        let baseline = baseline.trim();
        if matches!(baseline, "" | "-" | "無" | "N/A" | "n/a") {
            return requirement;
        }

        for token in baseline.split('+').map(str::trim).filter(|t| !t.is_empty()) {
            if let Some(level) = StabilityLevel::parse(token) {
                requirement.stability = Some(level);
                continue;
            }
            let (risk, opportunity) = match token {
                "R" => (Some(true), None),
                "r" => (Some(false), None),
                "O" => (None, Some(true)),
                "o" => (None, Some(false)),
                "RO" => (Some(true), Some(true)),
                "Ro" => (Some(true), Some(false)),
                "rO" => (Some(false), Some(true)),
                "ro" => (Some(false), Some(false)),
                _ => {
                    warn!(token, baseline, "ignoring unrecognised ROS baseline token");
                    continue;
                }
            };
            requirement.risk = risk.or(requirement.risk);
            requirement.opportunity = opportunity.or(requirement.opportunity);
        }
        requirement
    }

    pub fn is_unconstrained(&self) -> bool {
        *self == RosRequirement::default()
    }

    pub fn admits(&self, flags: &RosFlags) -> bool {
        self.risk.map_or(true, |r| r == flags.risk)
            && self.opportunity.map_or(true, |o| o == flags.opportunity)
            && self.stability.map_or(true, |s| s == flags.stability)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StrategyOutcome {
    Mapped {
        segment_name: String,
        script_code: String,
        strategy_example: String,
        email_frequency: String,
        discount_percentage: String,
        kpi_tracking: String,
        primary: Option<StrategyDetail>,
        secondary: Option<StrategyDetail>,
    },
    /// Deliberately suppressed grid cell; no strategy applies.
    Hidden,
    Unmapped,
    /// No usable strategy table.
    NotAvailable,
    /// The customer has no segment code: unknown lifecycle, or an axis
    /// value (e.g. CAI) missing.
    Ungraded,
}

impl StrategyOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            StrategyOutcome::Mapped { .. } => "mapped",
            StrategyOutcome::Hidden => "hidden",
            StrategyOutcome::Unmapped => "unmapped",
            StrategyOutcome::NotAvailable => "not_available",
            StrategyOutcome::Ungraded => "ungraded",
        }
    }

    pub fn segment_name(&self) -> Option<&str> {
        match self {
            StrategyOutcome::Mapped { segment_name, .. } => Some(segment_name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StrategyBook {
    entries: Vec<StrategyEntry>,
    details: HashMap<String, StrategyDetail>,
}

fn cell(record: &csv::StringRecord, index: usize) -> String {
    record.get(index).unwrap_or_default().trim().to_string()
}

// Header text varies between exports, so the first record is skipped unread.
fn positional_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader)
}

fn malformed(table: &str, reason: impl Into<String>) -> DnaError {
    DnaError::MalformedExternalTable {
        table: table.to_string(),
        reason: reason.into(),
    }
}

fn read_records<R: Read>(reader: R, table: &str, columns: usize) -> DnaResult<Vec<csv::StringRecord>> {
    let mut records = Vec::new();
    for (index, result) in positional_reader(reader).records().enumerate() {
        let record = result.map_err(|e| malformed(table, e.to_string()))?;
        if record.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        if record.len() < columns {
            return Err(malformed(
                table,
                format!(
                    "record {} has {} columns, expected at least {columns}",
                    index + 1,
                    record.len()
                ),
            ));
        }
        records.push(record);
    }
    Ok(records)
}

impl StrategyBook {
    pub fn new(entries: Vec<StrategyEntry>) -> Self {
        Self {
            entries,
            details: HashMap::new(),
        }
    }

    pub fn from_reader<R: Read>(reader: R) -> DnaResult<Self> {
        let entries = read_records(reader, "strategy", STRATEGY_COLUMNS)?
            .into_iter()
            .map(|r| {
                let ros_baseline = cell(&r, 1);
                StrategyEntry {
                    segment_name: cell(&r, 0),
                    requirement: RosRequirement::parse(&ros_baseline),
                    ros_baseline,
                    script_code: cell(&r, 2),
                    strategy_example: cell(&r, 3),
                    tempo: cell(&r, 4),
                    value: cell(&r, 5),
                    email_frequency: cell(&r, 6),
                    discount_percentage: cell(&r, 7),
                    kpi_tracking: cell(&r, 8),
                }
            })
            .collect::<Vec<_>>();
        if entries.is_empty() {
            return Err(malformed("strategy", "no strategy rows"));
        }
        info!(rows = entries.len(), "loaded strategy table");
        Ok(Self::new(entries))
    }

    pub fn from_path(path: impl AsRef<Path>) -> DnaResult<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_reader(file)
    }

    pub fn with_details_from_reader<R: Read>(mut self, reader: R) -> DnaResult<Self> {
        for r in read_records(reader, "strategy details", DETAIL_COLUMNS)? {
            let detail = StrategyDetail {
                code: cell(&r, 0),
                baseline: cell(&r, 1),
                core_action: cell(&r, 2),
                channel: cell(&r, 3),
                main_kpi: cell(&r, 4),
            };
            self.details.insert(detail.code.clone(), detail);
        }
        info!(rows = self.details.len(), "loaded strategy details");
        Ok(self)
    }

    pub fn with_details_from_path(self, path: impl AsRef<Path>) -> DnaResult<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        self.with_details_from_reader(file)
    }

    pub fn entries(&self) -> &[StrategyEntry] {
        &self.entries
    }

    pub fn detail(&self, code: &str) -> Option<&StrategyDetail> {
        self.details.get(code)
    }

    /// Rows whose segment name starts with `code`, in table order.
    pub fn candidates<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a StrategyEntry> + 'a {
        self.entries.iter().filter(move |e| e.matches_code(code))
    }

    /// Hidden codes never map. The first prefix match whose ROS baseline
    /// admits `ros` wins; a row whose baseline rejects the customer never
    /// applies to them.
    pub fn lookup(&self, code: &SegmentCode, ros: &RosFlags) -> StrategyOutcome {
        if code.is_hidden() {
            return StrategyOutcome::Hidden;
        }
        let key = code.to_string();
        let entry = self.candidates(&key).find(|e| e.requirement.admits(ros));

        match entry {
            Some(entry) => {
                let (primary, secondary) = entry.script_codes();
                StrategyOutcome::Mapped {
                    segment_name: entry.segment_name.clone(),
                    script_code: entry.script_code.clone(),
                    strategy_example: entry.strategy_example.clone(),
                    email_frequency: entry.email_frequency.clone(),
                    discount_percentage: entry.discount_percentage.clone(),
                    kpi_tracking: entry.kpi_tracking.clone(),
                    primary: primary.and_then(|c| self.detail(c)).cloned(),
                    secondary: secondary.and_then(|c| self.detail(c)).cloned(),
                }
            }
            None => StrategyOutcome::Unmapped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Lifecycle;
    use crate::tiers::Tier;

    const TABLE: &str = "\
區隔,ROS基準,腳本,策略範例,節奏,價值,郵件頻率,折扣,KPI
A1C-N,R + S-Low,A1／B2,挽回高價值客戶,T1,V1,weekly,15,retention
A1C-C,,A3,維持互動,T1,V1,monthly,5,aov
B2S,S-High + O,B1/B9,喚醒,T2,V2,biweekly,10,reactivation
";

    const DETAILS: &str = "\
code,baseline,core_action,channel,main_kpi
A1,R + S-Low,專屬客服回訪,phone,retention
B2,,優惠券,email,redemption
";

    fn ros(risk: bool, opportunity: bool, stability: StabilityLevel) -> RosFlags {
        RosFlags {
            risk,
            opportunity,
            stability,
        }
    }

    fn book() -> StrategyBook {
        StrategyBook::from_reader(TABLE.as_bytes())
            .unwrap()
            .with_details_from_reader(DETAILS.as_bytes())
            .unwrap()
    }

    #[test]
    fn reads_columns_by_position() {
        let book = book();
        assert_eq!(book.entries().len(), 3);
        let first = &book.entries()[0];
        assert_eq!(first.segment_name, "A1C-N");
        assert_eq!(first.ros_baseline, "R + S-Low");
        assert_eq!(first.kpi_tracking, "retention");
        assert_eq!(first.script_codes(), (Some("A1"), Some("B2")));
        assert_eq!(book.entries()[2].script_codes(), (Some("B1"), Some("B9")));
    }

    #[test]
    fn short_rows_are_malformed() {
        let err = StrategyBook::from_reader("a,b,c\nA1C,x,y\n".as_bytes()).unwrap_err();
        assert!(matches!(err, DnaError::MalformedExternalTable { .. }));

        let err = StrategyBook::from_reader("h1,h2,h3,h4,h5,h6,h7,h8,h9\n".as_bytes()).unwrap_err();
        assert!(matches!(err, DnaError::MalformedExternalTable { .. }));
    }

    #[test]
    fn parses_baseline_requirements() {
        assert_eq!(
            RosRequirement::parse("R + S-Low"),
            RosRequirement {
                risk: Some(true),
                opportunity: None,
                stability: Some(StabilityLevel::Low),
            }
        );
        assert_eq!(
            RosRequirement::parse("High + O"),
            RosRequirement {
                risk: None,
                opportunity: Some(true),
                stability: Some(StabilityLevel::High),
            }
        );
        assert_eq!(
            RosRequirement::parse("Medium + R"),
            RosRequirement {
                risk: Some(true),
                opportunity: None,
                stability: Some(StabilityLevel::Medium),
            }
        );
        assert_eq!(
            RosRequirement::parse("rO + S-High"),
            RosRequirement {
                risk: Some(false),
                opportunity: Some(true),
                stability: Some(StabilityLevel::High),
            }
        );
        assert!(RosRequirement::parse("").is_unconstrained());
        assert!(RosRequirement::parse("無").is_unconstrained());
    }

    #[test]
    fn free_text_baselines_set_no_flags() {
        assert!(RosRequirement::parse("Recovery").is_unconstrained());
        assert!(RosRequirement::parse("高風險").is_unconstrained());
        assert_eq!(
            RosRequirement::parse("R + priority"),
            RosRequirement {
                risk: Some(true),
                opportunity: None,
                stability: None,
            }
        );
    }

    #[test]
    fn lookup_prefers_rows_whose_baseline_admits_the_customer() {
        let book = book();
        let code = SegmentCode::nine_grid(Tier::High, Tier::High, Lifecycle::Active);

        let at_risk = book.lookup(&code, &ros(true, false, StabilityLevel::Low));
        assert_eq!(at_risk.segment_name(), Some("A1C-N"));
        match at_risk {
            StrategyOutcome::Mapped {
                primary, secondary, ..
            } => {
                assert_eq!(primary.map(|d| d.channel), Some("phone".to_string()));
                assert_eq!(secondary.map(|d| d.channel), Some("email".to_string()));
            }
            other => panic!("expected mapped outcome, got {other:?}"),
        }

        let healthy = book.lookup(&code, &ros(false, false, StabilityLevel::High));
        assert_eq!(healthy.segment_name(), Some("A1C-C"));
    }

    #[test]
    fn rows_whose_baseline_rejects_the_customer_do_not_apply() {
        let book = book();
        let code = SegmentCode::nine_grid(Tier::Mid, Tier::Mid, Lifecycle::Sleepy);
        assert_eq!(
            book.lookup(&code, &ros(true, false, StabilityLevel::Low)),
            StrategyOutcome::Unmapped
        );
        let outcome = book.lookup(&code, &ros(false, true, StabilityLevel::High));
        assert_eq!(outcome.segment_name(), Some("B2S"));

        let only_win_back = StrategyBook::from_reader(
            "h1,h2,h3,h4,h5,h6,h7,h8,h9\nA1C-N,R + S-Low,A1,挽回,T1,V1,weekly,15,retention\n"
                .as_bytes(),
        )
        .unwrap();
        let a1c = SegmentCode::nine_grid(Tier::High, Tier::High, Lifecycle::Active);
        assert_eq!(
            only_win_back.lookup(&a1c, &ros(false, false, StabilityLevel::High)),
            StrategyOutcome::Unmapped
        );
        assert_eq!(
            only_win_back
                .lookup(&a1c, &ros(true, false, StabilityLevel::Low))
                .segment_name(),
            Some("A1C-N")
        );
    }

    #[test]
    fn unknown_and_hidden_codes() {
        let book = book();
        let unmapped = SegmentCode::nine_grid(Tier::Low, Tier::Low, Lifecycle::Dormant);
        assert_eq!(
            book.lookup(&unmapped, &ros(false, false, StabilityLevel::Low)),
            StrategyOutcome::Unmapped
        );

        let hidden = SegmentCode::nine_grid(Tier::High, Tier::Low, Lifecycle::Newbie);
        assert_eq!(
            book.lookup(&hidden, &ros(false, false, StabilityLevel::Low)),
            StrategyOutcome::Hidden
        );
    }
}
