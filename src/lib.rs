//! Liquidity Risk Monitor
//!
//! Agentic assessment of corporate liquidity from ledger exports:
//! - Daily net-cashflow preparation and fixed-order ARIMA forecasting
//! - LLM-backed scenario, rating, report and review agents with local fallbacks
//! - An append-only audit log per run, recalled as prior decisions
//! - A single-call quick analysis and a KYC document extraction pipeline
//!
//! SUPERVISOR PIPELINE:
//! LOAD → PREPARE → FORECAST → FEATURES → SCENARIOS → RATE → REPORT → VALIDATE → PERSIST

pub mod agents;
pub mod api;
pub mod audit;
pub mod config;
pub mod error;
pub mod features;
pub mod forecast;
pub mod kyc;
pub mod ledger;
pub mod llm;
pub mod models;
pub mod parsing;
pub mod pipeline;
pub mod prepare;

pub use error::Result;

// Re-export common types
pub use config::MonitorConfig;
pub use error::MonitorError;
pub use models::*;
pub use pipeline::{QuickAnalyzer, Supervisor};
