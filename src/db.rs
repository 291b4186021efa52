use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::ingest;
use crate::models::Transaction;
use crate::pipeline::SegmentationRun;
use crate::report::ExportRow;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn source_key(tx: &Transaction) -> String {
    format!(
        "{}|{}|{}",
        tx.customer_id,
        tx.timestamp.to_rfc3339(),
        tx.amount
    )
}

/// Loads a transactions CSV. Rows already present (same customer, instant
/// and amount) are skipped, so re-importing a file is a no-op.
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let transactions = ingest::read_transactions_path(csv_path)
        .with_context(|| format!("failed to read {}", csv_path.display()))?;
    let mut inserted = 0usize;
    let mut skipped = 0usize;

    for tx in &transactions {
        if tx.customer_id.trim().is_empty() || !tx.amount.is_finite() || tx.amount <= 0.0 {
            skipped += 1;
            continue;
        }

        let result = sqlx::query(
            r#"
            INSERT INTO customer_dna.transactions
            (id, customer_id, occurred_at, amount, platform_id, source_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tx.customer_id.trim())
        .bind(tx.timestamp)
        .bind(tx.amount)
        .bind(tx.platform_id.as_deref())
        .bind(source_key(tx))
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    if skipped > 0 {
        warn!(skipped, "skipped rows without a customer id or a positive amount");
    }
    Ok(inserted)
}

pub async fn fetch_transactions(
    pool: &PgPool,
    since: DateTime<Utc>,
    platform: Option<&str>,
) -> anyhow::Result<Vec<Transaction>> {
    let mut query = String::from(
        "SELECT customer_id, occurred_at, amount, platform_id \
         FROM customer_dna.transactions \
         WHERE occurred_at >= $1",
    );
    if platform.is_some() {
        query.push_str(" AND platform_id = $2");
    }
    query.push_str(" ORDER BY customer_id, occurred_at");

    let mut rows = sqlx::query(&query).bind(since);
    if let Some(value) = platform {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut transactions = Vec::with_capacity(records.len());

    for row in records {
        transactions.push(Transaction {
            customer_id: row.get("customer_id"),
            timestamp: row.get("occurred_at"),
            amount: row.get("amount"),
            platform_id: row.get("platform_id"),
        });
    }

    info!(rows = transactions.len(), %since, "fetched transactions");
    Ok(transactions)
}

/// Writes the run header and its classified rows in one transaction.
pub async fn store_run(pool: &PgPool, run: &SegmentationRun) -> anyhow::Result<Uuid> {
    let run_id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO customer_dna.runs (id, as_of, grid_profile, customer_count)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(run_id)
    .bind(run.now)
    .bind(format!("{:?}", run.profile))
    .bind(i32::try_from(run.customers.len()).context("run too large to store")?)
    .execute(&mut *tx)
    .await?;

    for customer in &run.customers {
        let row = ExportRow::from(customer);
        sqlx::query(
            r#"
            INSERT INTO customer_dna.run_customers
            (run_id, customer_id, total_spent, times, ipt, r_value, m_value, clv,
             lifecycle, value_level, activity_level, ros_code, segment_code,
             strategy_status, segment_name)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(run_id)
        .bind(row.customer_id)
        .bind(row.total_spent)
        .bind(i32::try_from(row.times).unwrap_or(i32::MAX))
        .bind(row.ipt)
        .bind(row.r_value)
        .bind(row.m_value)
        .bind(row.clv)
        .bind(row.lifecycle)
        .bind(Some(row.value_level).filter(|l| !l.is_empty()))
        .bind(Some(row.activity_level).filter(|l| !l.is_empty()))
        .bind(&row.ros_code)
        .bind(row.segment_code.as_deref())
        .bind(row.strategy_status)
        .bind(row.segment_name)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(%run_id, customers = run.customers.len(), "stored segmentation run");
    Ok(run_id)
}
