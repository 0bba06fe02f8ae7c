//! Data preparation
//!
//! Turns raw ledger transactions into a contiguous daily net-cashflow series.
//! A calendar day without transactions counts as zero net flow.

use crate::error::MonitorError;
use crate::models::{DailyCashflowSeries, TransactionRecord};
use crate::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use tracing::debug;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse a ledger date into its calendar day
pub fn parse_calendar_day(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        })
}

/// Build the daily cashflow series for `currency`.
///
/// Fails with `DataError` when there are no records for the currency, when a
/// date cannot be parsed, or when an amount is not a finite number.
pub fn prepare_daily_cashflow(
    records: &[TransactionRecord],
    currency: &str,
) -> Result<DailyCashflowSeries> {
    if records.is_empty() {
        return Err(MonitorError::DataError(
            "No transaction records supplied".to_string(),
        ));
    }

    let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();

    for record in records.iter().filter(|r| r.currency.trim() == currency) {
        let day = parse_calendar_day(&record.date).ok_or_else(|| {
            MonitorError::DataError(format!("Unparseable transaction date '{}'", record.date))
        })?;

        if !record.amount.is_finite() {
            return Err(MonitorError::DataError(format!(
                "Non-finite amount on {}",
                record.date
            )));
        }

        *by_day.entry(day).or_insert(0.0) += record.amount;
    }

    let (first, last) = match (by_day.keys().next(), by_day.keys().next_back()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => {
            return Err(MonitorError::DataError(format!(
                "No {} transactions to prepare",
                currency
            )))
        }
    };

    let values: Vec<f64> = first
        .iter_days()
        .take_while(|day| *day <= last)
        .map(|day| by_day.get(&day).copied().unwrap_or(0.0))
        .collect();

    debug!(
        observed_days = by_day.len(),
        calendar_days = values.len(),
        %first,
        %last,
        "Prepared daily cashflow series"
    );

    Ok(DailyCashflowSeries::from_daily_values(first, values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inr(date: &str, amount: f64) -> TransactionRecord {
        TransactionRecord::new(date, amount, "INR")
    }

    #[test]
    fn test_gaps_are_filled_with_zero() {
        let records = vec![
            inr("2024-03-01", 100.0),
            inr("2024-03-04", -40.0),
            inr("2024-03-01", 25.0),
        ];

        let series = prepare_daily_cashflow(&records, "INR").unwrap();

        assert_eq!(series.len(), 4);
        assert_eq!(series.values(), vec![125.0, 0.0, 0.0, -40.0]);
        for pair in series.points().windows(2) {
            assert_eq!(pair[0].date.succ_opt(), Some(pair[1].date));
        }
    }

    #[test]
    fn test_other_currencies_are_ignored() {
        let records = vec![
            inr("2024-03-01", 100.0),
            TransactionRecord::new("2024-03-02", 999.0, "USD"),
            inr("2024-03-03", -30.0),
        ];

        let series = prepare_daily_cashflow(&records, "INR").unwrap();
        assert_eq!(series.total(), 70.0);
        assert_eq!(series.len(), 3);
    }

    #[test]
    fn test_sum_is_preserved_for_unordered_input() {
        let records: Vec<TransactionRecord> = (0..20)
            .rev()
            .map(|i| inr(&format!("2024-01-{:02}", (i * 3) % 28 + 1), i as f64 * 10.5 - 50.0))
            .collect();
        let expected: f64 = records.iter().map(|r| r.amount).sum();

        let series = prepare_daily_cashflow(&records, "INR").unwrap();
        assert!((series.total() - expected).abs() < 1e-9);

        let span = (series.last_date().unwrap() - series.first_date().unwrap()).num_days() + 1;
        assert_eq!(series.len() as i64, span);
    }

    #[test]
    fn test_mixed_date_formats() {
        let records = vec![
            inr("2024-03-01 09:30:00", 1.0),
            inr("02/03/2024", 2.0),
            inr("2024-03-03T10:00:00+05:30", 3.0),
        ];
        let series = prepare_daily_cashflow(&records, "INR").unwrap();
        assert_eq!(series.values(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_empty_input_is_data_error() {
        let result = prepare_daily_cashflow(&[], "INR");
        assert!(matches!(result, Err(MonitorError::DataError(_))));

        let only_usd = vec![TransactionRecord::new("2024-03-02", 5.0, "USD")];
        let result = prepare_daily_cashflow(&only_usd, "INR");
        assert!(matches!(result, Err(MonitorError::DataError(_))));
    }

    #[test]
    fn test_unparseable_date_is_data_error() {
        let records = vec![inr("2024-03-01", 1.0), inr("next tuesday", 2.0)];
        let result = prepare_daily_cashflow(&records, "INR");
        assert!(matches!(result, Err(MonitorError::DataError(_))));
    }
}
