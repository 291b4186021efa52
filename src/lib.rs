//! Customer DNA segmentation.
//!
//! Turns a batch of purchase transactions into per-customer RFM / IPT
//! profiles, lifecycle stages, batch-relative tiers, ROS codes and grid
//! segment codes, and joins those codes against an external marketing
//! strategy table.

pub mod aggregate;
pub mod config;
pub mod db;
pub mod error;
pub mod grid;
pub mod ingest;
pub mod lifecycle;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod ros;
pub mod strategy;
pub mod tiers;

pub use config::{ActivityMetric, AnalysisConfig, GridProfile};
pub use error::{DnaError, DnaResult};
pub use grid::SegmentCode;
pub use lifecycle::Lifecycle;
pub use models::{ClassifiedCustomer, CustomerProfile, CustomerSignals, SignalBook, Transaction};
pub use pipeline::{run, SegmentationRun};
pub use ros::{RosFlags, StabilityLevel};
pub use strategy::{StrategyBook, StrategyOutcome};
pub use tiers::{QuantileCuts, RankOrder, RankShares, Tier};
