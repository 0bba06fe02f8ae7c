//! Scenario generation
//!
//! Asks the reasoning client for a handful of qualitative liquidity
//! scenarios plus a short reading of the transaction history.

use crate::agents::{money, AnalysisContext};
use crate::llm::ReasoningClient;
use crate::models::{FallbackKind, FallbackNote, FeatureSet, Scenario};
use crate::parsing::{parse_structured, Structured};
use crate::pipeline::Stage;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioOutcome {
    /// Never empty
    pub scenarios: Vec<Scenario>,
    pub historical_analysis: String,
    pub fallback: Option<FallbackNote>,
}

impl ScenarioOutcome {
    /// One line per scenario, as handed to the risk rater
    pub fn reasons(&self) -> Vec<String> {
        self.scenarios.iter().map(Scenario::as_reason).collect()
    }
}

#[derive(Debug, Deserialize)]
struct ScenarioResponse {
    #[serde(default)]
    historical_analysis: String,
    #[serde(default)]
    scenarios: Vec<Scenario>,
}

pub struct ScenarioAgent {
    client: Arc<dyn ReasoningClient>,
}

impl ScenarioAgent {
    pub fn new(client: Arc<dyn ReasoningClient>) -> Self {
        Self { client }
    }

    pub async fn generate(&self, features: &FeatureSet, context: &AnalysisContext) -> ScenarioOutcome {
        let prompt = build_prompt(features, context);

        let reply = match self.client.generate(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Scenario generation call failed, using static scenarios");
                return call_fallback(&e.to_string());
            }
        };

        match parse_structured::<ScenarioResponse>(&reply) {
            Structured::Parsed(parsed) if !parsed.scenarios.is_empty() => {
                info!(count = parsed.scenarios.len(), "Scenarios generated");
                ScenarioOutcome {
                    scenarios: parsed.scenarios,
                    historical_analysis: parsed.historical_analysis,
                    fallback: None,
                }
            }
            _ => {
                warn!("Scenario reply was not usable JSON, wrapping raw text");
                parse_fallback(reply)
            }
        }
    }
}

/// Single scenario carrying the raw reply
fn parse_fallback(raw: String) -> ScenarioOutcome {
    ScenarioOutcome {
        scenarios: vec![Scenario {
            name: "Unstructured analysis".to_string(),
            description: raw.clone(),
            potential_impact: "To be assessed".to_string(),
            likelihood: "Medium".to_string(),
        }],
        historical_analysis: raw,
        fallback: Some(FallbackNote::new(
            Stage::GenerateScenarios.as_str(),
            FallbackKind::ParseFailure,
            "Scenario reply could not be decoded; raw text used as a single scenario",
        )),
    }
}

/// Hard-coded scenarios used when the reasoning call itself fails
fn call_fallback(error: &str) -> ScenarioOutcome {
    let scenarios = vec![
        Scenario {
            name: "Delayed customer receivables".to_string(),
            description: "Major customers pay 15-30 days late, shrinking expected inflows".to_string(),
            potential_impact: "Short-term cash shortfall against scheduled payments".to_string(),
            likelihood: "Medium".to_string(),
        },
        Scenario {
            name: "Unexpected large payment".to_string(),
            description: "An unplanned vendor, tax or legal payment falls due".to_string(),
            potential_impact: "Sudden drop in available balance".to_string(),
            likelihood: "Low".to_string(),
        },
        Scenario {
            name: "Fixed obligations bunching".to_string(),
            description: "Payroll, rent and loan instalments land in the same week".to_string(),
            potential_impact: "Temporary negative cash position".to_string(),
            likelihood: "Medium".to_string(),
        },
    ];

    ScenarioOutcome {
        scenarios,
        historical_analysis: format!(
            "Historical analysis unavailable: the reasoning API returned an error ({}). \
             Static fallback scenarios were used.",
            error
        ),
        fallback: Some(FallbackNote::new(
            Stage::GenerateScenarios.as_str(),
            FallbackKind::CallFailure,
            error,
        )),
    }
}

fn build_prompt(features: &FeatureSet, context: &AnalysisContext) -> String {
    format!(
        r#"You are a treasury liquidity analyst. All amounts are in INR.

FINANCIAL FEATURES:
- Cash Balance: {cash}
- Total Inflows: {inflows}
- Total Outflows: {outflows}
- Net Cashflow: {net}
- Expected Fixed Outflow: {expected}

BANK ACCOUNTS:
{banks}

FIXED PAYMENTS:
{fixed}

RECENT TRANSACTIONS:
{transactions}

ARIMA DAILY NET CASHFLOW FORECAST:
{forecast}{prior}

TASK:
1. Summarise what the transaction history shows about liquidity.
2. Describe 2-3 realistic risk scenarios (e.g. delayed receivables, emergency expense).

Reply ONLY as valid JSON:
{{
    "historical_analysis": "short paragraph",
    "scenarios": [
        {{
            "name": "scenario name",
            "description": "what happens",
            "potential_impact": "effect on cash position",
            "likelihood": "High/Medium/Low"
        }}
    ]
}}
"#,
        cash = money(features.cash_balance),
        inflows = money(features.total_inflows),
        outflows = money(features.total_outflows),
        net = money(features.net_cashflow),
        expected = money(features.expected_outflow),
        banks = context.bank_summary(),
        fixed = context.fixed_payment_summary(),
        transactions = context.transaction_summary(),
        forecast = context.forecast.to_prompt_lines(),
        prior = context.prior_decisions(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::ScriptedReasoner;

    fn agent(replies: Vec<Result<&str, &str>>) -> (ScenarioAgent, Arc<ScriptedReasoner>) {
        let client = Arc::new(ScriptedReasoner::new(replies));
        (ScenarioAgent::new(client.clone()), client)
    }

    #[tokio::test]
    async fn test_parses_prose_wrapped_json() {
        let reply = r#"Sure! ```json
{"historical_analysis": "Stable inflows", "scenarios": [
  {"name": "Late payer", "description": "Customer X pays late", "potential_impact": "₹2L gap", "likelihood": "High"},
  {"name": "Tax bill", "description": "Advance tax due", "potential_impact": "₹50k", "likelihood": "Medium"}
]}
```"#;
        let (agent, client) = agent(vec![Ok(reply)]);

        let outcome = agent
            .generate(&FeatureSet::default(), &AnalysisContext::default())
            .await;

        assert!(outcome.fallback.is_none());
        assert_eq!(outcome.scenarios.len(), 2);
        assert_eq!(outcome.historical_analysis, "Stable inflows");
        assert_eq!(outcome.reasons()[0], "Late payer: Customer X pays late");
        assert!(client.prompts()[0].contains("Reply ONLY as valid JSON"));
    }

    #[tokio::test]
    async fn test_non_json_reply_yields_single_scenario() {
        let reply = "Liquidity looks tight next week because payroll is due.";
        let (agent, _) = agent(vec![Ok(reply)]);

        let outcome = agent
            .generate(&FeatureSet::default(), &AnalysisContext::default())
            .await;

        assert_eq!(outcome.scenarios.len(), 1);
        assert_eq!(outcome.scenarios[0].description, reply);
        assert_eq!(outcome.scenarios[0].potential_impact, "To be assessed");
        assert_eq!(outcome.scenarios[0].likelihood, "Medium");
        assert_eq!(outcome.fallback.unwrap().kind, FallbackKind::ParseFailure);
    }

    #[tokio::test]
    async fn test_empty_scenario_list_is_never_returned() {
        let (agent, _) = agent(vec![Ok(r#"{"historical_analysis": "x", "scenarios": []}"#)]);
        let outcome = agent
            .generate(&FeatureSet::default(), &AnalysisContext::default())
            .await;
        assert_eq!(outcome.scenarios.len(), 1);
    }

    #[tokio::test]
    async fn test_call_failure_uses_static_scenarios() {
        let (agent, _) = agent(vec![Err("quota exceeded")]);

        let outcome = agent
            .generate(&FeatureSet::default(), &AnalysisContext::default())
            .await;

        assert_eq!(outcome.scenarios.len(), 3);
        assert!(outcome.historical_analysis.contains("quota exceeded"));
        let note = outcome.fallback.unwrap();
        assert_eq!(note.kind, FallbackKind::CallFailure);
        assert_eq!(note.stage, "generate_scenarios");
    }
}
