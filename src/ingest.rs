//! CSV readers for the transaction and signal inputs.

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::error::{DnaError, DnaResult};
use crate::models::{CustomerSignals, SignalBook, Transaction};

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// RFC 3339, a handful of naive date-time layouts (read as UTC), or a bare
/// `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

fn require_headers(headers: &csv::StringRecord, required: &[&str]) -> DnaResult<()> {
    let missing: Vec<String> = required
        .iter()
        .filter(|name| !headers.iter().any(|h| h.trim() == **name))
        .map(|name| name.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DnaError::MissingRequiredField { fields: missing })
    }
}

fn invalid_record(error: &csv::Error) -> DnaError {
    DnaError::InvalidRecord {
        line: error.position().map(|p| p.line()).unwrap_or_default(),
        reason: error.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct TransactionRow {
    customer_id: String,
    timestamp: String,
    amount: f64,
    #[serde(default)]
    platform_id: Option<String>,
}

pub fn read_transactions<R: Read>(reader: R) -> DnaResult<Vec<Transaction>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    require_headers(reader.headers()?, &["customer_id", "timestamp", "amount"])?;

    let mut transactions = Vec::new();
    for result in reader.deserialize::<TransactionRow>() {
        let row = result.map_err(|e| invalid_record(&e))?;
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| DnaError::InvalidRecord {
            line: transactions.len() as u64 + 2,
            reason: format!("unparseable timestamp '{}'", row.timestamp),
        })?;
        transactions.push(Transaction {
            customer_id: row.customer_id,
            timestamp,
            amount: row.amount,
            platform_id: row.platform_id.filter(|p| !p.is_empty()),
        });
    }

    info!(rows = transactions.len(), "read transactions");
    Ok(transactions)
}

pub fn read_transactions_path(path: impl AsRef<Path>) -> DnaResult<Vec<Transaction>> {
    read_transactions(std::fs::File::open(path.as_ref())?)
}

#[derive(Debug, Deserialize)]
struct SignalRow {
    customer_id: String,
    #[serde(default)]
    churn_probability: Option<f64>,
    #[serde(default)]
    predicted_next_purchase_days: Option<f64>,
    #[serde(default)]
    regularity_index: Option<f64>,
    #[serde(default)]
    cai: Option<f64>,
}

pub fn read_signals<R: Read>(reader: R) -> DnaResult<SignalBook> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    require_headers(reader.headers()?, &["customer_id"])?;

    let mut book = SignalBook::new();
    for result in reader.deserialize::<SignalRow>() {
        let row = result.map_err(|e| invalid_record(&e))?;
        book.insert(
            row.customer_id,
            CustomerSignals {
                churn_probability: row.churn_probability,
                predicted_next_purchase_days: row.predicted_next_purchase_days,
                regularity_index: row.regularity_index,
                cai: row.cai,
            },
        );
    }

    info!(customers = book.len(), "read customer signals");
    Ok(book)
}

pub fn read_signals_path(path: impl AsRef<Path>) -> DnaResult<SignalBook> {
    read_signals(std::fs::File::open(path.as_ref())?)
}
