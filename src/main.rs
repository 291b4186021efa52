use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use clap::{ArgGroup, Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

use customer_dna::{
    db, ingest, report, run, ActivityMetric, AnalysisConfig, GridProfile, SegmentationRun,
    SignalBook, StrategyBook,
};

#[derive(Parser)]
#[command(name = "customer-dna")]
#[command(about = "Customer DNA segmentation: RFM, lifecycle, tiers, ROS and strategy grids", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Import transactions from a CSV file into Postgres
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Classify customers and write the flattened table as CSV
    Segment {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, default_value = "customer_dna.csv")]
        out: PathBuf,
        /// Number of segments to print
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Print segment summaries as JSON
        #[arg(long)]
        json: bool,
        /// Persist the run to Postgres
        #[arg(long)]
        store: bool,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("source")
        .args(["transactions", "from_db"])
        .required(true)
        .multiple(false)
))]
struct InputArgs {
    /// Transactions CSV (customer_id, timestamp, amount[, platform_id])
    #[arg(long)]
    transactions: Option<PathBuf>,
    /// Read transactions from Postgres instead of a file
    #[arg(long)]
    from_db: bool,
    /// Window for --from-db
    #[arg(long, default_value_t = 365)]
    since_days: i64,
    /// Per-customer churn / next-purchase / regularity / CAI inputs
    #[arg(long)]
    signals: Option<PathBuf>,
    /// Positional 9-column strategy table
    #[arg(long)]
    strategy: Option<PathBuf>,
    /// Positional 5-column strategy detail table
    #[arg(long)]
    details: Option<PathBuf>,
    /// TOML analysis config
    #[arg(long, env = "CUSTOMER_DNA_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long)]
    min_transactions: Option<u32>,
    #[arg(long, value_enum)]
    profile: Option<GridProfile>,
    #[arg(long, value_enum)]
    activity: Option<ActivityMetric>,
    #[arg(long)]
    platform: Option<String>,
    /// Reference instant for recency and age (defaults to the current time)
    #[arg(long)]
    now: Option<String>,
}

impl InputArgs {
    fn analysis_config(&self) -> anyhow::Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => AnalysisConfig::default(),
        };
        if let Some(min) = self.min_transactions {
            config.min_transactions = min;
        }
        if let Some(profile) = self.profile {
            config.profile = profile;
        }
        if let Some(activity) = self.activity {
            config.activity_metric = activity;
        }
        if self.platform.is_some() {
            config.platform_id = self.platform.clone();
        }
        config.validate()?;
        Ok(config)
    }

    fn now(&self) -> anyhow::Result<DateTime<Utc>> {
        match &self.now {
            Some(raw) => ingest::parse_timestamp(raw)
                .with_context(|| format!("cannot parse --now value '{raw}'")),
            None => Ok(Utc::now()),
        }
    }
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

/// The strategy lookup is optional: a broken table is reported and the run
/// continues without strategy annotations.
fn load_strategy(strategy: Option<&Path>, details: Option<&Path>) -> Option<StrategyBook> {
    let path = strategy?;
    let book = StrategyBook::from_path(path).and_then(|book| match details {
        Some(details) => book.with_details_from_path(details),
        None => Ok(book),
    });
    match book {
        Ok(book) => Some(book),
        Err(error) => {
            warn!(%error, path = %path.display(), "strategy table unusable, skipping lookup");
            None
        }
    }
}

async fn analyse(input: &InputArgs, pool: Option<&PgPool>) -> anyhow::Result<SegmentationRun> {
    let config = input.analysis_config()?;
    let now = input.now()?;

    let transactions = match (&input.transactions, pool) {
        (Some(path), _) => ingest::read_transactions_path(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, Some(pool)) => {
            let since = now - Duration::days(input.since_days.max(1));
            db::fetch_transactions(pool, since, config.platform_id.as_deref()).await?
        }
        (None, None) => anyhow::bail!("no transaction source given"),
    };

    let signals = match &input.signals {
        Some(path) => ingest::read_signals_path(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => SignalBook::new(),
    };
    let strategy = load_strategy(input.strategy.as_deref(), input.details.as_deref());

    Ok(run(&transactions, &signals, strategy.as_ref(), &config, now)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} transactions from {}.", csv.display());
        }
        Commands::Segment {
            input,
            out,
            limit,
            json,
            store,
        } => {
            let pool = if input.from_db || store {
                Some(connect().await?)
            } else {
                None
            };
            let result = analyse(&input, pool.as_ref()).await?;

            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            report::write_csv(&result, file)?;
            info!(path = %out.display(), rows = result.customers.len(), "wrote classified table");

            let segments = report::by_segment(&result.customers);
            if json {
                println!("{}", serde_json::to_string_pretty(&segments)?);
            } else {
                println!("Top segments by customer count:");
                for summary in segments.iter().take(limit) {
                    println!(
                        "- {} : {} customers, avg M {:.2}, avg F {:.2}, avg IPT {:.1}, avg CLV {:.2}",
                        summary.label,
                        summary.count,
                        summary.avg_m,
                        summary.avg_f,
                        summary.avg_ipt,
                        summary.avg_clv
                    );
                }
            }

            if let Some(pool) = pool.as_ref().filter(|_| store) {
                let run_id = db::store_run(pool, &result).await?;
                println!("Stored run {run_id}.");
            }
        }
        Commands::Report { input, out } => {
            let pool = if input.from_db {
                Some(connect().await?)
            } else {
                None
            };
            let result = analyse(&input, pool.as_ref()).await?;
            let source = match &input.transactions {
                Some(path) => path.display().to_string(),
                None => format!("Postgres (last {} days)", input.since_days),
            };
            let markdown = report::build_report(&source, &result);
            std::fs::write(&out, markdown)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
