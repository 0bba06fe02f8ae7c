//! Single-call quick analysis
//!
//! Three-day ARIMA(1,1,1) outlook interpreted by one reasoning call.

use crate::agents::{money, prior_decisions_block, AnalysisContext};
use crate::audit::{compute_input_hash, log_timestamp, AuditStore};
use crate::config::MonitorConfig;
use crate::features::extract_features;
use crate::forecast::{forecast_cashflow, ForecastConfig};
use crate::ledger::LedgerSource;
use crate::llm::ReasoningClient;
use crate::models::{
    AnalysisLog, DailyCashflowSeries, FallbackKind, FallbackNote, FeatureSet, ForecastSeries,
    InputSnapshot, Report, RiskAssessment, RiskLevel,
};
use crate::pipeline::{load_and_prepare, recall_prior_logs};
use crate::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const QUICK_STAGE: &str = "quick_analysis";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickAnalysis {
    pub run_id: Uuid,
    /// `unknown` unless the reply names a level on a risk line
    pub risk_level: RiskLevel,
    pub analysis: String,
    pub forecast_series: ForecastSeries,
    pub daily_cashflow: DailyCashflowSeries,
    pub features: FeatureSet,
    pub fallback: Option<FallbackNote>,
    pub log_id: String,
}

pub struct QuickAnalyzer {
    ledger: Arc<dyn LedgerSource>,
    client: Arc<dyn ReasoningClient>,
    audit: Arc<dyn AuditStore>,
    currency: String,
    prior_log_count: usize,
}

impl QuickAnalyzer {
    pub fn new(
        ledger: Arc<dyn LedgerSource>,
        client: Arc<dyn ReasoningClient>,
        audit: Arc<dyn AuditStore>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            ledger,
            client,
            audit,
            currency: config.target_currency.clone(),
            prior_log_count: config.prior_log_count,
        }
    }

    pub async fn run(&self) -> Result<QuickAnalysis> {
        let run_id = Uuid::new_v4();
        info!(%run_id, "Quick analysis: starting");

        let prepared = load_and_prepare(self.ledger.as_ref(), &self.currency).await?;
        let forecast = forecast_cashflow(&prepared.daily, ForecastConfig::quick())?;
        let features = extract_features(
            &prepared.ledger.transactions,
            &prepared.ledger.bank_accounts,
            &prepared.ledger.fixed_payments,
            &self.currency,
        );

        let prior_logs = recall_prior_logs(self.audit.as_ref(), self.prior_log_count).await;
        let context = AnalysisContext::new(&prepared.ledger, &self.currency, &forecast, prior_logs);
        let prompt = build_prompt(&context);

        let (analysis, fallback) = match self.client.generate(&prompt).await {
            Ok(text) => (text.trim().to_string(), None),
            Err(e) => {
                warn!(%run_id, error = %e, "Quick analysis call failed");
                (
                    format!(
                        "Automated analysis unavailable (fallback): {}. \
                         Review the forecast and balances manually.",
                        e
                    ),
                    Some(FallbackNote::new(
                        QUICK_STAGE,
                        FallbackKind::CallFailure,
                        e.to_string(),
                    )),
                )
            }
        };

        let risk_level = if fallback.is_some() {
            RiskLevel::Unknown
        } else {
            detect_risk_level(&analysis)
        };

        let now = Utc::now();
        let log = AnalysisLog {
            run_id,
            timestamp: log_timestamp(now),
            created_at: now,
            pipeline: QUICK_STAGE.to_string(),
            input: InputSnapshot {
                features,
                forecast: forecast.rounded(),
                transaction_count: prepared.ledger.transactions.len(),
                history_days: prepared.daily.len(),
                input_hash: compute_input_hash(&prepared.ledger),
            },
            risk_level,
            reasons: Vec::new(),
            scenarios: Vec::new(),
            historical_analysis: String::new(),
            assessment: RiskAssessment {
                risk_level,
                ..Default::default()
            },
            report: Report {
                draft: analysis.clone(),
                refined: analysis.clone(),
            },
            fallbacks: fallback.iter().cloned().collect(),
            risk_detected: (risk_level != RiskLevel::Unknown).then(|| risk_level.to_string()),
            user_feedback: None,
        };
        let log_id = self.audit.persist(&log).await?;

        info!(%run_id, %risk_level, "Quick analysis: complete");

        Ok(QuickAnalysis {
            run_id,
            risk_level,
            analysis,
            forecast_series: forecast.rounded(),
            daily_cashflow: prepared.daily,
            features,
            fallback,
            log_id,
        })
    }
}

/// First of high/medium/low named on a line that mentions risk
pub fn detect_risk_level(text: &str) -> RiskLevel {
    for line in text.lines() {
        let lower = line.to_lowercase();
        if !lower.contains("risk") {
            continue;
        }
        let found = ["high", "medium", "low"]
            .iter()
            .filter_map(|label| lower.find(label).map(|at| (at, *label)))
            .min_by_key(|(at, _)| *at);
        if let Some((_, label)) = found {
            return RiskLevel::from_rating(label);
        }
    }
    RiskLevel::Unknown
}

fn build_prompt(context: &AnalysisContext) -> String {
    let balance: f64 = context.bank_accounts.iter().map(|a| a.available_balance).sum();

    format!(
        r#"You are an expert treasury analyst. All amounts are in INR.

BANK ACCOUNTS (total {total}):
{banks}

FIXED PAYMENTS:
{fixed}

3-DAY NET CASHFLOW FORECAST:
{forecast}{prior}

Assess whether the company can meet its obligations over the next three days.
Start with a line of the form "Risk level: High/Medium/Low", then explain the
main drivers and recommend actions.
"#,
        total = money(balance),
        banks = context.bank_summary(),
        fixed = context.fixed_payment_summary(),
        forecast = context.forecast.to_prompt_lines(),
        prior = prior_decisions_block(&context.prior_logs),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::ScriptedReasoner;
    use crate::audit::InMemoryAuditStore;
    use crate::error::MonitorError;
    use crate::ledger::InMemoryLedger;
    use crate::models::{LedgerSnapshot, TransactionRecord};

    fn ledger() -> Arc<InMemoryLedger> {
        Arc::new(InMemoryLedger::new(LedgerSnapshot {
            transactions: (1..=10)
                .map(|d| TransactionRecord::new(format!("2024-03-{:02}", d), d as f64 * 100.0, "INR"))
                .collect(),
            ..Default::default()
        }))
    }

    #[test]
    fn test_detect_risk_level() {
        assert_eq!(detect_risk_level("Risk level: High\nmore text"), RiskLevel::High);
        assert_eq!(
            detect_risk_level("Overall the liquidity risk is low to medium."),
            RiskLevel::Low
        );
        assert_eq!(detect_risk_level("Cash is high. Nothing else."), RiskLevel::Unknown);
    }

    #[tokio::test]
    async fn test_quick_run_logs_detected_level() {
        let audit = Arc::new(InMemoryAuditStore::new());
        let client = Arc::new(ScriptedReasoner::new(vec![Ok("Risk level: Medium\nPayroll is due.")]));
        let analyzer = QuickAnalyzer::new(ledger(), client.clone(), audit.clone(), &MonitorConfig::default());

        let result = analyzer.run().await.unwrap();

        assert_eq!(result.risk_level, RiskLevel::Medium);
        assert_eq!(result.forecast_series.len(), 3);
        assert!(result.fallback.is_none());
        assert!(client.prompts()[0].contains("expert treasury analyst"));

        let logs = audit.logs().await;
        assert_eq!(logs[0].pipeline, "quick_analysis");
        assert_eq!(logs[0].risk_detected.as_deref(), Some("medium"));
    }

    #[tokio::test]
    async fn test_quick_call_failure_degrades() {
        let audit = Arc::new(InMemoryAuditStore::new());
        let client = Arc::new(ScriptedReasoner::new(vec![Err("timeout")]));
        let analyzer = QuickAnalyzer::new(ledger(), client, audit.clone(), &MonitorConfig::default());

        let result = analyzer.run().await.unwrap();

        assert_eq!(result.risk_level, RiskLevel::Unknown);
        assert!(result.analysis.contains("fallback"));
        assert!(result.fallback.is_some());
        assert_eq!(audit.logs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_quick_empty_ledger_is_fatal() {
        let audit = Arc::new(InMemoryAuditStore::new());
        let analyzer = QuickAnalyzer::new(
            Arc::new(InMemoryLedger::new(LedgerSnapshot::default())),
            Arc::new(ScriptedReasoner::new(vec![])),
            audit.clone(),
            &MonitorConfig::default(),
        );

        assert!(matches!(analyzer.run().await, Err(MonitorError::DataError(_))));
        assert!(audit.logs().await.is_empty());
    }
}
