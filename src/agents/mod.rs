//! LLM-backed analysis agents
//!
//! Each agent wraps one reasoning call and owns its fallback policy: a
//! failed call or an undecodable reply yields deterministic local content
//! plus a [`FallbackNote`](crate::models::FallbackNote), never an error.

use crate::models::{
    BankAccount, FixedPayment, ForecastSeries, LedgerSnapshot, PriorLog, TransactionRecord,
};

pub mod rating;
pub mod report;
pub mod scenario;
pub mod validator;

pub use rating::{RatingOutcome, RiskRater};
pub use report::ReportComposer;
pub use scenario::{ScenarioAgent, ScenarioOutcome};
pub use validator::ReportValidator;

/// How many of the latest transactions go into prompts
const RECENT_TRANSACTION_COUNT: usize = 20;

/// Surrounding facts the agents quote in their prompts
#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    pub recent_transactions: Vec<TransactionRecord>,
    pub bank_accounts: Vec<BankAccount>,
    pub fixed_payments: Vec<FixedPayment>,
    pub prior_logs: Vec<PriorLog>,
    pub forecast: ForecastSeries,
}

impl AnalysisContext {
    pub fn new(
        ledger: &LedgerSnapshot,
        currency: &str,
        forecast: &ForecastSeries,
        prior_logs: Vec<PriorLog>,
    ) -> Self {
        let in_currency: Vec<&TransactionRecord> = ledger
            .transactions
            .iter()
            .filter(|t| t.currency.trim() == currency)
            .collect();
        let start = in_currency.len().saturating_sub(RECENT_TRANSACTION_COUNT);

        Self {
            recent_transactions: in_currency[start..].iter().map(|t| (*t).clone()).collect(),
            bank_accounts: ledger.bank_accounts.clone(),
            fixed_payments: ledger.fixed_payments.clone(),
            prior_logs,
            forecast: forecast.clone(),
        }
    }

    pub(crate) fn bank_summary(&self) -> String {
        if self.bank_accounts.is_empty() {
            return "No bank accounts on record".to_string();
        }
        self.bank_accounts
            .iter()
            .map(|a| {
                format!(
                    "- {} {}: {} {}",
                    a.bank_name,
                    a.account_id,
                    money(a.available_balance),
                    a.currency
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub(crate) fn fixed_payment_summary(&self) -> String {
        if self.fixed_payments.is_empty() {
            return "No fixed payments scheduled".to_string();
        }
        self.fixed_payments
            .iter()
            .map(|p| format!("- {} ({}): {} due {}", p.name, p.category, money(p.amount), p.due_date))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub(crate) fn transaction_summary(&self) -> String {
        if self.recent_transactions.is_empty() {
            return "No recent transactions".to_string();
        }
        self.recent_transactions
            .iter()
            .map(|t| {
                format!(
                    "- {}: {} [{}] {}",
                    t.date,
                    money(t.amount),
                    t.counterparties,
                    t.description
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub(crate) fn prior_decisions(&self) -> String {
        prior_decisions_block(&self.prior_logs)
    }
}

/// "Past risk decisions" block, empty when there is no history
pub fn prior_decisions_block(logs: &[PriorLog]) -> String {
    if logs.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = logs.iter().map(PriorLog::to_prompt_line).collect();
    format!("\n\nPast risk decisions:\n{}", lines.join("\n"))
}

pub(crate) fn money(amount: f64) -> String {
    format!("₹{:.2}", amount)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted reasoning clients shared by agent and pipeline tests

    use crate::error::MonitorError;
    use crate::llm::ReasoningClient;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies in order; an `Err` entry simulates a failed call
    pub struct ScriptedReasoner {
        replies: Mutex<VecDeque<Result<String, String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedReasoner {
        pub fn new(replies: Vec<Result<&str, &str>>) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReasoningClient for ScriptedReasoner {
        async fn generate(&self, prompt: &str) -> crate::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err(e)) => Err(MonitorError::CollaboratorError(e)),
                None => Err(MonitorError::CollaboratorError("script exhausted".to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_latest_transactions_in_currency() {
        let mut transactions: Vec<TransactionRecord> = (1..=25)
            .map(|d| TransactionRecord::new(format!("2024-01-{:02}", d), d as f64, "INR"))
            .collect();
        transactions.push(TransactionRecord::new("2024-01-26", 1.0, "USD"));

        let ledger = LedgerSnapshot {
            transactions,
            ..Default::default()
        };
        let context = AnalysisContext::new(&ledger, "INR", &ForecastSeries::default(), vec![]);

        assert_eq!(context.recent_transactions.len(), RECENT_TRANSACTION_COUNT);
        assert_eq!(context.recent_transactions[0].date, "2024-01-06");
        assert!(context.recent_transactions.iter().all(|t| t.currency == "INR"));
    }

    #[test]
    fn test_prior_decisions_block() {
        assert_eq!(prior_decisions_block(&[]), "");

        let logs = vec![PriorLog {
            timestamp: "20240101_000000_000".to_string(),
            risk_detected: Some("yes".to_string()),
            user_feedback: Some("payroll spike".to_string()),
        }];
        let block = prior_decisions_block(&logs);
        assert!(block.contains("Past risk decisions:"));
        assert!(block.contains("[20240101_000000_000] Risk: yes, Notes: payroll spike"));
    }
}
