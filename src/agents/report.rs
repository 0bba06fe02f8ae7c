//! Report drafting

use crate::agents::{money, AnalysisContext};
use crate::llm::ReasoningClient;
use crate::models::{FallbackKind, FallbackNote, FeatureSet, RiskAssessment, RiskLevel};
use crate::pipeline::Stage;
use std::sync::Arc;
use tracing::{info, warn};

/// Inputs the report is written from
pub struct ReportInput<'a> {
    pub risk_level: RiskLevel,
    pub reasons: &'a [String],
    pub features: &'a FeatureSet,
    pub assessment: &'a RiskAssessment,
    pub context: &'a AnalysisContext,
}

pub struct ReportComposer {
    client: Arc<dyn ReasoningClient>,
}

impl ReportComposer {
    pub fn new(client: Arc<dyn ReasoningClient>) -> Self {
        Self { client }
    }

    /// Draft report, plus a note when the local fallback was used
    pub async fn compose(&self, input: &ReportInput<'_>) -> (String, Option<FallbackNote>) {
        let prompt = build_prompt(input);

        match self.client.generate(&prompt).await {
            Ok(text) if !text.trim().is_empty() => {
                info!(chars = text.len(), "Report drafted");
                (text.trim().to_string(), None)
            }
            Ok(_) => {
                warn!("Report reply was empty, using fallback report");
                (
                    fallback_report(input, "empty reply"),
                    Some(FallbackNote::new(
                        Stage::ComposeReport.as_str(),
                        FallbackKind::ParseFailure,
                        "Report reply was empty",
                    )),
                )
            }
            Err(e) => {
                warn!(error = %e, "Report call failed, using fallback report");
                (
                    fallback_report(input, &e.to_string()),
                    Some(FallbackNote::new(
                        Stage::ComposeReport.as_str(),
                        FallbackKind::CallFailure,
                        e.to_string(),
                    )),
                )
            }
        }
    }
}

/// Plain report built from the rating alone
pub fn fallback_report(input: &ReportInput<'_>, cause: &str) -> String {
    let reasons = bullets(input.reasons, "No reasons recorded");

    format!(
        "LIQUIDITY RISK REPORT (automated fallback)\n\n\
         Risk Level: {level}\n\n\
         Key Reasons:\n{reasons}\n\n\
         Financial Position:\n\
         - Cash Balance: {cash}\n\
         - Net Cashflow: {net}\n\
         - Expected Fixed Outflow: {expected}\n\n\
         The detailed report could not be generated ({cause}). \
         This summary was produced locally; use manual review before acting on it.",
        level = input.risk_level.as_str().to_uppercase(),
        reasons = reasons,
        cash = money(input.features.cash_balance),
        net = money(input.features.net_cashflow),
        expected = money(input.features.expected_outflow),
        cause = cause,
    )
}

fn bullets(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        return format!("- {}", empty);
    }
    items
        .iter()
        .map(|i| format!("- {}", i))
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_prompt(input: &ReportInput<'_>) -> String {
    format!(
        r#"You are a corporate treasury analyst writing a liquidity risk report for the CFO.
All amounts are in INR.

RISK LEVEL: {level}
CONFIDENCE: {confidence}

FINANCIAL POSITION:
- Cash Balance: {cash}
- Total Inflows: {inflows}
- Total Outflows: {outflows}
- Net Cashflow: {net}
- Expected Fixed Outflow: {expected}

ARIMA DAILY NET CASHFLOW FORECAST:
{forecast}

REASONS:
{reasons}

RISK FACTORS:
{factors}

RECOMMENDED SOLUTIONS:
{solutions}

Write the report in plain prose (no JSON, no markdown tables) with these sections:
1. Executive Summary
2. Current Financial Position
3. Risk Analysis
4. Key Risk Factors
5. Impact Assessment
6. Recommendations
7. Monitoring Plan
"#,
        level = input.risk_level.as_str().to_uppercase(),
        confidence = if input.assessment.confidence_level.is_empty() {
            "unspecified"
        } else {
            input.assessment.confidence_level.as_str()
        },
        cash = money(input.features.cash_balance),
        inflows = money(input.features.total_inflows),
        outflows = money(input.features.total_outflows),
        net = money(input.features.net_cashflow),
        expected = money(input.features.expected_outflow),
        forecast = input.context.forecast.to_prompt_lines(),
        reasons = bullets(input.reasons, "None"),
        factors = bullets(&input.assessment.risk_factors, "None"),
        solutions = bullets(&input.assessment.recommended_solutions, "None"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::ScriptedReasoner;

    async fn compose_with(reply: Result<&str, &str>) -> (String, Option<FallbackNote>) {
        let composer = ReportComposer::new(Arc::new(ScriptedReasoner::new(vec![reply])));
        let reasons = vec!["Payroll due next week".to_string()];
        let features = FeatureSet {
            cash_balance: 50000.0,
            ..Default::default()
        };
        let assessment = RiskAssessment::default();
        let context = AnalysisContext::default();
        let input = ReportInput {
            risk_level: RiskLevel::High,
            reasons: &reasons,
            features: &features,
            assessment: &assessment,
            context: &context,
        };
        composer.compose(&input).await
    }

    #[tokio::test]
    async fn test_report_text_is_returned() {
        let (report, note) = compose_with(Ok("  Executive Summary: all good.  ")).await;
        assert_eq!(report, "Executive Summary: all good.");
        assert!(note.is_none());
    }

    #[tokio::test]
    async fn test_call_failure_gives_fallback_report() {
        let (report, note) = compose_with(Err("timeout")).await;

        assert!(report.contains("fallback"));
        assert!(report.contains("use manual review"));
        assert!(report.contains("HIGH"));
        assert!(report.contains("Payroll due next week"));
        assert!(report.contains("₹50000.00"));
        assert_eq!(note.unwrap().kind, FallbackKind::CallFailure);
    }

    #[tokio::test]
    async fn test_empty_reply_gives_fallback_report() {
        let (report, note) = compose_with(Ok("   ")).await;
        assert!(report.contains("fallback"));
        assert_eq!(note.unwrap().stage, "compose_report");
    }
}
