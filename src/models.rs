//! Core data models for the liquidity risk monitor

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//
// ================= Ledger Records =================
//

/// A single ledger transaction. Positive amounts are inflows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionRecord {
    /// Raw date text as it appears in the ledger
    pub date: String,
    pub amount: f64,
    pub currency: String,
    #[serde(default)]
    pub counterparties: String,
    #[serde(default)]
    pub description: String,
}

impl TransactionRecord {
    pub fn new(date: impl Into<String>, amount: f64, currency: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            amount,
            currency: currency.into(),
            counterparties: String::new(),
            description: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BankAccount {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub bank_name: String,
    pub available_balance: f64,
    #[serde(default)]
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixedPayment {
    #[serde(default)]
    pub name: String,
    pub amount: f64,
    #[serde(default)]
    pub due_date: String,
    #[serde(default)]
    pub category: String,
}

/// Reference data loaded once per run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub transactions: Vec<TransactionRecord>,
    pub bank_accounts: Vec<BankAccount>,
    pub fixed_payments: Vec<FixedPayment>,
}

impl LedgerSnapshot {
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
            && self.bank_accounts.is_empty()
            && self.fixed_payments.is_empty()
    }
}

//
// ================= Time Series =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CashflowPoint {
    pub date: NaiveDate,
    pub amount: f64,
}

/// Net signed cashflow per calendar day.
///
/// Contiguous: one point per day between the first and last observed date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyCashflowSeries {
    points: Vec<CashflowPoint>,
}

impl DailyCashflowSeries {
    /// Build from a first date and consecutive daily values.
    pub fn from_daily_values(start: NaiveDate, values: Vec<f64>) -> Self {
        let points = start
            .iter_days()
            .zip(values)
            .map(|(date, amount)| CashflowPoint { date, amount })
            .collect();
        Self { points }
    }

    pub fn points(&self) -> &[CashflowPoint] {
        &self.points
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.amount).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    pub fn total(&self) -> f64 {
        self.points.iter().map(|p| p.amount).sum()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Projected net cashflow for the days right after the history ends
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ForecastSeries {
    pub points: Vec<ForecastPoint>,
}

impl ForecastSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Copy with every value rounded to 2 decimal places
    pub fn rounded(&self) -> Self {
        Self {
            points: self
                .points
                .iter()
                .map(|p| ForecastPoint {
                    date: p.date,
                    value: (p.value * 100.0).round() / 100.0,
                })
                .collect(),
        }
    }

    /// One `YYYY-MM-DD: ₹amount` line per day
    pub fn to_prompt_lines(&self) -> String {
        self.rounded()
            .points
            .iter()
            .map(|p| format!("{}: ₹{:.2}", p.date, p.value))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

//
// ================= Features =================
//

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct FeatureSet {
    pub cash_balance: f64,
    pub total_inflows: f64,
    pub total_outflows: f64,
    pub net_cashflow: f64,
    pub expected_outflow: f64,
}

//
// ================= Scenarios & Risk =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub potential_impact: String,
    /// Qualitative label such as "High" or "Medium", not a probability
    #[serde(default)]
    pub likelihood: String,
}

impl Scenario {
    /// Single-line form handed to the risk rater
    pub fn as_reason(&self) -> String {
        if self.name.is_empty() {
            self.description.clone()
        } else {
            format!("{}: {}", self.name, self.description)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    #[default]
    Unknown,
}

impl RiskLevel {
    /// Exact label match after lower-casing
    pub fn from_label(label: &str) -> Option<RiskLevel> {
        match label.trim().to_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" | "moderate" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }

    /// Rating constrained to low/medium/high; anything else is medium
    pub fn from_rating(label: &str) -> RiskLevel {
        RiskLevel::from_label(label).unwrap_or(RiskLevel::Medium)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub primary_reasons: Vec<String>,
    pub risk_factors: Vec<String>,
    pub recommended_solutions: Vec<String>,
    pub confidence_level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub draft: String,
    pub refined: String,
}

//
// ================= Fallback Markers =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FallbackKind {
    /// The reasoning call itself failed
    CallFailure,
    /// The call succeeded but its structured body could not be decoded
    ParseFailure,
}

/// Records that a stage substituted locally computed content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FallbackNote {
    pub stage: String,
    pub kind: FallbackKind,
    pub detail: String,
}

impl FallbackNote {
    pub fn new(stage: &str, kind: FallbackKind, detail: impl Into<String>) -> Self {
        Self {
            stage: stage.to_string(),
            kind,
            detail: detail.into(),
        }
    }
}

//
// ================= Audit Log =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSnapshot {
    pub features: FeatureSet,
    pub forecast: ForecastSeries,
    pub transaction_count: usize,
    pub history_days: usize,
    /// SHA-256 over the ledger snapshot
    pub input_hash: String,
}

/// One persisted record per completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisLog {
    pub run_id: Uuid,
    /// `YYYYMMDD_HHMMSS_mmm`, also the file key
    pub timestamp: String,
    pub created_at: DateTime<Utc>,
    pub pipeline: String,
    pub input: InputSnapshot,
    pub risk_level: RiskLevel,
    pub reasons: Vec<String>,
    pub scenarios: Vec<Scenario>,
    pub historical_analysis: String,
    pub assessment: RiskAssessment,
    pub report: Report,
    pub fallbacks: Vec<FallbackNote>,
    /// Kept under the legacy key so prior-decision prompts can read it
    pub risk_detected: Option<String>,
    pub user_feedback: Option<String>,
}

/// The subset of an earlier log that is fed back into prompts
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PriorLog {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub risk_detected: Option<String>,
    #[serde(default)]
    pub user_feedback: Option<String>,
}

impl PriorLog {
    pub fn to_prompt_line(&self) -> String {
        format!(
            "[{}] Risk: {}, Notes: {}",
            self.timestamp,
            self.risk_detected.as_deref().unwrap_or("None"),
            self.user_feedback.as_deref().unwrap_or("")
        )
    }
}

//
// ================= Final Result =================
//

/// What the presentation layer renders after a supervisor run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub run_id: Uuid,
    pub risk_level: RiskLevel,
    pub report: String,
    pub forecast_series: ForecastSeries,
    pub daily_cashflow: DailyCashflowSeries,
    pub features: FeatureSet,
    pub scenario_reasons: Vec<String>,
    pub assessment: RiskAssessment,
    pub fallbacks: Vec<FallbackNote>,
    pub log_path: String,
    pub reasoning_trace: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_constrained() {
        assert_eq!(RiskLevel::from_rating("HIGH"), RiskLevel::High);
        assert_eq!(RiskLevel::from_rating(" Low "), RiskLevel::Low);
        assert_eq!(RiskLevel::from_rating("catastrophic"), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_label("catastrophic"), None);
    }

    #[test]
    fn test_forecast_rounding() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let series = ForecastSeries {
            points: vec![ForecastPoint { date, value: 12.3456 }],
        };
        assert_eq!(series.rounded().points[0].value, 12.35);
        assert_eq!(series.to_prompt_lines(), "2024-01-01: ₹12.35");
    }

    #[test]
    fn test_prior_log_tolerates_missing_fields() {
        let log: PriorLog = serde_json::from_str(r#"{"timestamp": "20240101_120000"}"#).unwrap();
        assert_eq!(log.to_prompt_line(), "[20240101_120000] Risk: None, Notes: ");
    }
}
