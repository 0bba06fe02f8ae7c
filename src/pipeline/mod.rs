//! Supervisor pipeline
//!
//! start → load_and_prepare → forecast → extract_features →
//! generate_scenarios → rate_risk → compose_report → validate_report →
//! persist_log → done
//!
//! Every stage produces a fresh value consumed by the stages after it.
//! Data and forecast failures abort the run before anything is written;
//! agent stages never abort, they record a fallback note instead.

use crate::agents::report::ReportInput;
use crate::agents::{
    AnalysisContext, RatingOutcome, ReportComposer, ReportValidator, RiskRater, ScenarioAgent,
    ScenarioOutcome,
};
use crate::audit::{compute_input_hash, log_timestamp, AuditStore};
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::features::extract_features;
use crate::forecast::{forecast_cashflow, ForecastConfig};
use crate::ledger::LedgerSource;
use crate::llm::ReasoningClient;
use crate::models::{
    AnalysisLog, AnalysisResult, DailyCashflowSeries, FallbackNote, FeatureSet, ForecastSeries,
    InputSnapshot, LedgerSnapshot, PriorLog, Report,
};
use crate::prepare::prepare_daily_cashflow;
use crate::Result;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub mod quick;

pub use quick::{QuickAnalysis, QuickAnalyzer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    LoadAndPrepare,
    Forecast,
    ExtractFeatures,
    GenerateScenarios,
    RateRisk,
    ComposeReport,
    ValidateReport,
    PersistLog,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::LoadAndPrepare => "load_and_prepare",
            Stage::Forecast => "forecast",
            Stage::ExtractFeatures => "extract_features",
            Stage::GenerateScenarios => "generate_scenarios",
            Stage::RateRisk => "rate_risk",
            Stage::ComposeReport => "compose_report",
            Stage::ValidateReport => "validate_report",
            Stage::PersistLog => "persist_log",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the load_and_prepare stage
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub ledger: LedgerSnapshot,
    pub daily: DailyCashflowSeries,
}

/// Load the ledger and build the daily series. Both failures are fatal.
pub(crate) async fn load_and_prepare(
    ledger: &dyn LedgerSource,
    currency: &str,
) -> Result<PreparedData> {
    let snapshot = ledger.load().await?;
    if snapshot.transactions.is_empty() {
        return Err(MonitorError::DataError(
            "Ledger contains no transactions".to_string(),
        ));
    }
    let daily = prepare_daily_cashflow(&snapshot.transactions, currency)?;
    Ok(PreparedData {
        ledger: snapshot,
        daily,
    })
}

/// Prior decisions for prompts. A store that cannot be read means no history.
pub(crate) async fn recall_prior_logs(audit: &dyn AuditStore, limit: usize) -> Vec<PriorLog> {
    match audit.recent(limit).await {
        Ok(logs) => logs,
        Err(e) => {
            warn!(error = %e, "Prior logs unavailable, continuing without history");
            Vec::new()
        }
    }
}

/// Sequences the analysis agents around one forecast
pub struct Supervisor {
    ledger: Arc<dyn LedgerSource>,
    audit: Arc<dyn AuditStore>,
    scenario_agent: ScenarioAgent,
    rater: RiskRater,
    composer: ReportComposer,
    validator: ReportValidator,
    currency: String,
    prior_log_count: usize,
    forecast_config: ForecastConfig,
}

impl Supervisor {
    pub fn new(
        ledger: Arc<dyn LedgerSource>,
        client: Arc<dyn ReasoningClient>,
        audit: Arc<dyn AuditStore>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            ledger,
            audit,
            scenario_agent: ScenarioAgent::new(client.clone()),
            rater: RiskRater::new(client.clone()),
            composer: ReportComposer::new(client.clone()),
            validator: ReportValidator::new(client),
            currency: config.target_currency.clone(),
            prior_log_count: config.prior_log_count,
            forecast_config: ForecastConfig::supervisor(),
        }
    }

    /// Run the pipeline once
    pub async fn run(&self) -> Result<AnalysisResult> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let mut trace = vec![Stage::Start.to_string()];
        let mut fallbacks: Vec<FallbackNote> = Vec::new();

        info!(%run_id, currency = %self.currency, "Supervisor: starting run");

        // === LOAD AND PREPARE ===
        let prepared = load_and_prepare(self.ledger.as_ref(), &self.currency).await?;
        trace.push(format!(
            "{}: {} transactions, {} days",
            Stage::LoadAndPrepare,
            prepared.ledger.transactions.len(),
            prepared.daily.len()
        ));
        debug!(%run_id, days = prepared.daily.len(), "Daily cashflow prepared");

        // === FORECAST ===
        let forecast = forecast_cashflow(&prepared.daily, self.forecast_config)?;
        trace.push(format!(
            "{}: {} {} days ahead",
            Stage::Forecast,
            self.forecast_config.order,
            forecast.len()
        ));

        // === FEATURES ===
        let features = extract_features(
            &prepared.ledger.transactions,
            &prepared.ledger.bank_accounts,
            &prepared.ledger.fixed_payments,
            &self.currency,
        );
        trace.push(format!(
            "{}: net cashflow {:.2}",
            Stage::ExtractFeatures,
            features.net_cashflow
        ));

        let prior_logs = recall_prior_logs(self.audit.as_ref(), self.prior_log_count).await;
        let context = AnalysisContext::new(&prepared.ledger, &self.currency, &forecast, prior_logs);

        // === SCENARIOS ===
        let scenarios = self.scenario_agent.generate(&features, &context).await;
        trace.push(stage_line(Stage::GenerateScenarios, &scenarios.fallback, || {
            format!("{} scenarios", scenarios.scenarios.len())
        }));
        fallbacks.extend(scenarios.fallback.clone());

        // === RATING ===
        let rating = self
            .rater
            .rate(&features, &scenarios.reasons(), &context)
            .await;
        trace.push(stage_line(Stage::RateRisk, &rating.fallback, || {
            format!("risk {}", rating.risk_level())
        }));
        fallbacks.extend(rating.fallback.clone());

        // === REPORT ===
        let (draft, note) = self
            .composer
            .compose(&ReportInput {
                risk_level: rating.risk_level(),
                reasons: &rating.reasons,
                features: &features,
                assessment: &rating.assessment,
                context: &context,
            })
            .await;
        trace.push(stage_line(Stage::ComposeReport, &note, || "draft written".to_string()));
        fallbacks.extend(note);

        // === VALIDATE ===
        let (report, note) = self.validator.refine(draft).await;
        trace.push(stage_line(Stage::ValidateReport, &note, || "report refined".to_string()));
        fallbacks.extend(note);

        // === PERSIST ===
        let log = build_log(
            run_id,
            &prepared,
            &features,
            &forecast,
            &scenarios,
            &rating,
            &report,
            &fallbacks,
        );
        let log_path = self.audit.persist(&log).await?;
        trace.push(format!("{}: {}", Stage::PersistLog, log_path));
        trace.push(Stage::Done.to_string());

        info!(
            %run_id,
            risk_level = %rating.risk_level(),
            fallbacks = fallbacks.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Supervisor: run complete"
        );

        Ok(AnalysisResult {
            run_id,
            risk_level: rating.risk_level(),
            report: report.refined,
            forecast_series: forecast.rounded(),
            daily_cashflow: prepared.daily,
            features,
            scenario_reasons: scenarios.reasons(),
            assessment: rating.assessment,
            fallbacks,
            log_path,
            reasoning_trace: trace,
        })
    }
}

fn stage_line(
    stage: Stage,
    fallback: &Option<FallbackNote>,
    summary: impl FnOnce() -> String,
) -> String {
    match fallback {
        Some(note) => format!("{}: fallback ({})", stage, note.detail),
        None => format!("{}: {}", stage, summary()),
    }
}

#[allow(clippy::too_many_arguments)]
fn build_log(
    run_id: Uuid,
    prepared: &PreparedData,
    features: &FeatureSet,
    forecast: &ForecastSeries,
    scenarios: &ScenarioOutcome,
    rating: &RatingOutcome,
    report: &Report,
    fallbacks: &[FallbackNote],
) -> AnalysisLog {
    let now = Utc::now();
    AnalysisLog {
        run_id,
        timestamp: log_timestamp(now),
        created_at: now,
        pipeline: "supervisor".to_string(),
        input: InputSnapshot {
            features: *features,
            forecast: forecast.rounded(),
            transaction_count: prepared.ledger.transactions.len(),
            history_days: prepared.daily.len(),
            input_hash: compute_input_hash(&prepared.ledger),
        },
        risk_level: rating.risk_level(),
        reasons: rating.reasons.clone(),
        scenarios: scenarios.scenarios.clone(),
        historical_analysis: scenarios.historical_analysis.clone(),
        assessment: rating.assessment.clone(),
        report: report.clone(),
        fallbacks: fallbacks.to_vec(),
        risk_detected: Some(rating.risk_level().to_string()),
        user_feedback: None,
    }
}
