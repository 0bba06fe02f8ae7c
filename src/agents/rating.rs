//! Risk rating
//!
//! Turns features and scenario reasons into a low/medium/high rating with
//! supporting reasons.

use crate::agents::{money, AnalysisContext};
use crate::llm::ReasoningClient;
use crate::models::{FallbackKind, FallbackNote, FeatureSet, RiskAssessment, RiskLevel};
use crate::parsing::{parse_structured, truncate_chars, Structured};
use crate::pipeline::Stage;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Raw replies quoted as a reason are cut to this many characters
const RAW_REASON_MAX_CHARS: usize = 300;

pub const CALL_FAILURE_REASON: &str = "Reasoning collaborator error";

#[derive(Debug, Clone, PartialEq)]
pub struct RatingOutcome {
    pub assessment: RiskAssessment,
    /// Primary reasons followed by risk factors. Never empty.
    pub reasons: Vec<String>,
    pub fallback: Option<FallbackNote>,
}

impl RatingOutcome {
    pub fn risk_level(&self) -> RiskLevel {
        self.assessment.risk_level
    }
}

#[derive(Debug, Deserialize)]
struct RatingResponse {
    #[serde(default)]
    risk_rating: String,
    #[serde(default)]
    primary_reasons: Vec<String>,
    #[serde(default)]
    risk_factors: Vec<String>,
    #[serde(default)]
    recommended_solutions: Vec<String>,
    #[serde(default)]
    confidence_level: String,
}

pub struct RiskRater {
    client: Arc<dyn ReasoningClient>,
}

impl RiskRater {
    pub fn new(client: Arc<dyn ReasoningClient>) -> Self {
        Self { client }
    }

    pub async fn rate(
        &self,
        features: &FeatureSet,
        scenario_reasons: &[String],
        context: &AnalysisContext,
    ) -> RatingOutcome {
        let prompt = build_prompt(features, scenario_reasons, context);

        let reply = match self.client.generate(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Risk rating call failed, defaulting to medium");
                return fallback(
                    vec![CALL_FAILURE_REASON.to_string()],
                    FallbackNote::new(
                        Stage::RateRisk.as_str(),
                        FallbackKind::CallFailure,
                        e.to_string(),
                    ),
                );
            }
        };

        match parse_structured::<RatingResponse>(&reply) {
            Structured::Parsed(parsed) => {
                let outcome = from_response(parsed);
                info!(risk_level = %outcome.risk_level(), reasons = outcome.reasons.len(), "Risk rated");
                outcome
            }
            Structured::Raw(raw) => {
                warn!("Risk rating reply was not usable JSON, defaulting to medium");
                fallback(
                    vec![truncate_chars(raw.trim(), RAW_REASON_MAX_CHARS)],
                    FallbackNote::new(
                        Stage::RateRisk.as_str(),
                        FallbackKind::ParseFailure,
                        "Rating reply could not be decoded; raw text kept as the reason",
                    ),
                )
            }
        }
    }
}

fn from_response(parsed: RatingResponse) -> RatingOutcome {
    let risk_level = RiskLevel::from_rating(&parsed.risk_rating);

    let mut reasons: Vec<String> = parsed
        .primary_reasons
        .iter()
        .chain(parsed.risk_factors.iter())
        .filter(|r| !r.trim().is_empty())
        .cloned()
        .collect();
    if reasons.is_empty() {
        reasons.push(format!("Rated {} without stated reasons", risk_level));
    }

    RatingOutcome {
        assessment: RiskAssessment {
            risk_level,
            primary_reasons: parsed.primary_reasons,
            risk_factors: parsed.risk_factors,
            recommended_solutions: parsed.recommended_solutions,
            confidence_level: parsed.confidence_level,
        },
        reasons,
        fallback: None,
    }
}

fn fallback(reasons: Vec<String>, note: FallbackNote) -> RatingOutcome {
    RatingOutcome {
        assessment: RiskAssessment {
            risk_level: RiskLevel::Medium,
            primary_reasons: reasons.clone(),
            risk_factors: Vec::new(),
            recommended_solutions: Vec::new(),
            confidence_level: "low".to_string(),
        },
        reasons,
        fallback: Some(note),
    }
}

fn build_prompt(features: &FeatureSet, scenario_reasons: &[String], context: &AnalysisContext) -> String {
    let scenarios = if scenario_reasons.is_empty() {
        "- None identified".to_string()
    } else {
        scenario_reasons
            .iter()
            .map(|r| format!("- {}", r))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"You are a senior treasury risk officer. Rate the company's short-term liquidity risk.

FINANCIAL FEATURES:
- Cash Balance: {cash}
- Total Inflows: {inflows}
- Total Outflows: {outflows}
- Net Cashflow: {net}
- Expected Fixed Outflow: {expected}

ARIMA DAILY NET CASHFLOW FORECAST:
{forecast}

SCENARIOS UNDER CONSIDERATION:
{scenarios}{prior}

Reply ONLY as valid JSON:
{{
    "risk_rating": "low" | "medium" | "high",
    "primary_reasons": ["..."],
    "risk_factors": ["..."],
    "recommended_solutions": ["..."],
    "confidence_level": "low" | "medium" | "high"
}}
"#,
        cash = money(features.cash_balance),
        inflows = money(features.total_inflows),
        outflows = money(features.total_outflows),
        net = money(features.net_cashflow),
        expected = money(features.expected_outflow),
        forecast = context.forecast.to_prompt_lines(),
        scenarios = scenarios,
        prior = context.prior_decisions(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::ScriptedReasoner;

    async fn rate_with(reply: Result<&str, &str>) -> RatingOutcome {
        let rater = RiskRater::new(Arc::new(ScriptedReasoner::new(vec![reply])));
        rater
            .rate(
                &FeatureSet::default(),
                &["Late payer: Customer X pays late".to_string()],
                &AnalysisContext::default(),
            )
            .await
    }

    #[tokio::test]
    async fn test_structured_rating() {
        let outcome = rate_with(Ok(r#"{
            "risk_rating": "HIGH",
            "primary_reasons": ["Negative net cashflow"],
            "risk_factors": ["Payroll due", " "],
            "recommended_solutions": ["Draw on credit line"],
            "confidence_level": "medium"
        }"#))
        .await;

        assert_eq!(outcome.risk_level(), RiskLevel::High);
        assert_eq!(outcome.reasons, vec!["Negative net cashflow", "Payroll due"]);
        assert_eq!(outcome.assessment.recommended_solutions, vec!["Draw on credit line"]);
        assert!(outcome.fallback.is_none());
    }

    #[tokio::test]
    async fn test_unexpected_rating_is_medium() {
        let outcome = rate_with(Ok(r#"{"risk_rating": "severe", "primary_reasons": ["x"]}"#)).await;
        assert_eq!(outcome.risk_level(), RiskLevel::Medium);
        assert!(outcome.fallback.is_none());
    }

    #[tokio::test]
    async fn test_missing_rating_keeps_reasons() {
        let outcome = rate_with(Ok(
            r#"{"primary_reasons": ["Payroll exceeds balance"], "risk_factors": ["Late receivables"]}"#,
        ))
        .await;

        assert_eq!(outcome.risk_level(), RiskLevel::Medium);
        assert_eq!(outcome.reasons, vec!["Payroll exceeds balance", "Late receivables"]);
        assert_eq!(outcome.assessment.primary_reasons, vec!["Payroll exceeds balance"]);
        assert!(outcome.fallback.is_none());
    }

    #[tokio::test]
    async fn test_undecodable_reply_is_truncated_reason() {
        let long = "risk seems elevated ".repeat(40);
        let outcome = rate_with(Ok(long.as_str())).await;

        assert_eq!(outcome.risk_level(), RiskLevel::Medium);
        assert_eq!(outcome.reasons.len(), 1);
        assert_eq!(outcome.reasons[0].chars().count(), RAW_REASON_MAX_CHARS);
        assert_eq!(outcome.fallback.unwrap().kind, FallbackKind::ParseFailure);
    }

    #[tokio::test]
    async fn test_call_failure_is_deterministic_medium() {
        let first = rate_with(Err("connection refused")).await;
        let second = rate_with(Err("connection refused")).await;

        assert_eq!(first.risk_level(), RiskLevel::Medium);
        assert_eq!(first.reasons, vec![CALL_FAILURE_REASON]);
        assert_eq!(first, second);
        assert_eq!(first.fallback.unwrap().kind, FallbackKind::CallFailure);
    }
}
