//! Scalar risk features over the observation window

use crate::models::{BankAccount, FeatureSet, FixedPayment, TransactionRecord};

/// Sum balances, flows and fixed obligations.
///
/// Only transactions in `currency` count. Empty inputs contribute zero.
pub fn extract_features(
    transactions: &[TransactionRecord],
    accounts: &[BankAccount],
    fixed_payments: &[FixedPayment],
    currency: &str,
) -> FeatureSet {
    let cash_balance: f64 = accounts.iter().map(|a| a.available_balance).sum();

    let (total_inflows, total_outflows) = transactions
        .iter()
        .filter(|t| t.currency.trim() == currency)
        .fold((0.0, 0.0), |(inflows, outflows), t| {
            if t.amount > 0.0 {
                (inflows + t.amount, outflows)
            } else {
                (inflows, outflows - t.amount)
            }
        });

    let expected_outflow: f64 = fixed_payments.iter().map(|p| p.amount).sum();

    FeatureSet {
        cash_balance,
        total_inflows,
        total_outflows,
        net_cashflow: total_inflows - total_outflows,
        expected_outflow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(balance: f64) -> BankAccount {
        BankAccount {
            account_id: "A1".to_string(),
            bank_name: "HDFC".to_string(),
            available_balance: balance,
            currency: "INR".to_string(),
        }
    }

    #[test]
    fn test_alternating_month() {
        let transactions: Vec<TransactionRecord> = (1..=30)
            .map(|day| {
                let amount = if day % 2 == 1 { 1000.0 } else { -800.0 };
                TransactionRecord::new(format!("2024-04-{:02}", day), amount, "INR")
            })
            .collect();

        let features = extract_features(&transactions, &[account(50000.0)], &[], "INR");

        assert_eq!(features.cash_balance, 50000.0);
        assert_eq!(features.total_inflows, 15000.0);
        assert_eq!(features.total_outflows, 12000.0);
        assert_eq!(features.net_cashflow, 3000.0);
        assert_eq!(features.expected_outflow, 0.0);
    }

    #[test]
    fn test_fixed_payments_and_currency_filter() {
        let transactions = vec![
            TransactionRecord::new("2024-04-01", 500.0, "INR"),
            TransactionRecord::new("2024-04-01", 9000.0, "USD"),
        ];
        let payments = vec![
            FixedPayment {
                name: "Rent".to_string(),
                amount: 1200.0,
                due_date: "2024-05-01".to_string(),
                category: "facilities".to_string(),
            },
            FixedPayment {
                name: "Loan EMI".to_string(),
                amount: 800.0,
                due_date: "2024-05-05".to_string(),
                category: "debt".to_string(),
            },
        ];

        let features = extract_features(&transactions, &[], &payments, "INR");
        assert_eq!(features.total_inflows, 500.0);
        assert_eq!(features.cash_balance, 0.0);
        assert_eq!(features.expected_outflow, 2000.0);
    }

    #[test]
    fn test_everything_empty_is_all_zero() {
        assert_eq!(extract_features(&[], &[], &[], "INR"), FeatureSet::default());
    }
}
