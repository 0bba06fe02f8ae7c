//! Ledger and reference data sources
//!
//! Transactions, bank accounts and fixed payments are loaded once per run.
//! The CSV source reads the three ledger exports from a data directory; the
//! in-memory source serves embedded callers and tests.

use crate::error::MonitorError;
use crate::models::{BankAccount, FixedPayment, LedgerSnapshot, TransactionRecord};
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const BANK_DATA_FILE: &str = "bank_data.csv";
pub const FIXED_PAYMENTS_FILE: &str = "fixed_payments.csv";
pub const TRANSACTIONS_FILE: &str = "transactions_updated.csv";

/// Read-only provider of reference data
#[async_trait::async_trait]
pub trait LedgerSource: Send + Sync {
    async fn load(&self) -> Result<LedgerSnapshot>;
}

/// Fixed snapshot held in memory
pub struct InMemoryLedger {
    snapshot: LedgerSnapshot,
}

impl InMemoryLedger {
    pub fn new(snapshot: LedgerSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait::async_trait]
impl LedgerSource for InMemoryLedger {
    async fn load(&self) -> Result<LedgerSnapshot> {
        Ok(self.snapshot.clone())
    }
}

/// CSV exports in one directory.
///
/// The transactions file is mandatory. A missing bank or fixed-payment file
/// is read as an empty set.
pub struct CsvLedger {
    data_dir: PathBuf,
}

impl CsvLedger {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn load_sync(&self) -> Result<LedgerSnapshot> {
        let transactions_path = self.data_dir.join(TRANSACTIONS_FILE);
        if !transactions_path.exists() {
            return Err(MonitorError::DataError(format!(
                "Transactions file not found: {}",
                transactions_path.display()
            )));
        }

        let transactions: Vec<TransactionRecord> = read_rows::<TransactionRow>(&transactions_path)?
            .into_iter()
            .map(TransactionRecord::from)
            .collect();

        let bank_accounts = self
            .read_optional::<BankRow>(BANK_DATA_FILE)?
            .into_iter()
            .map(BankAccount::from)
            .collect();

        let fixed_payments = self
            .read_optional::<FixedPaymentRow>(FIXED_PAYMENTS_FILE)?
            .into_iter()
            .map(FixedPayment::from)
            .collect();

        Ok(LedgerSnapshot {
            transactions,
            bank_accounts,
            fixed_payments,
        })
    }

    fn read_optional<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>> {
        let path = self.data_dir.join(file);
        if path.exists() {
            read_rows(&path)
        } else {
            warn!(path = %path.display(), "Ledger file missing, treating as empty");
            Ok(Vec::new())
        }
    }
}

#[async_trait::async_trait]
impl LedgerSource for CsvLedger {
    async fn load(&self) -> Result<LedgerSnapshot> {
        let snapshot = self.load_sync()?;
        debug!(
            transactions = snapshot.transactions.len(),
            bank_accounts = snapshot.bank_accounts.len(),
            fixed_payments = snapshot.fixed_payments.len(),
            "Ledger loaded"
        );
        Ok(snapshot)
    }
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| MonitorError::DataError(format!("Cannot open {}: {}", path.display(), e)))?;

    reader
        .deserialize()
        .enumerate()
        .map(|(i, row)| {
            row.map_err(|e| {
                MonitorError::DataError(format!(
                    "Malformed row {} in {}: {}",
                    i + 1,
                    path.display(),
                    e
                ))
            })
        })
        .collect()
}

//
// ================= CSV Row Shapes =================
//

#[derive(Debug, Deserialize)]
struct TransactionRow {
    date: String,
    amount: f64,
    #[serde(default)]
    currency: String,
    #[serde(default, alias = "counterparty", alias = "from")]
    counterparties: String,
    #[serde(default)]
    description: String,
}

impl From<TransactionRow> for TransactionRecord {
    fn from(row: TransactionRow) -> Self {
        Self {
            date: row.date,
            amount: row.amount,
            currency: row.currency,
            counterparties: row.counterparties,
            description: row.description,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BankRow {
    #[serde(default, alias = "Account_ID", alias = "account_number")]
    account_id: String,
    #[serde(default, alias = "Bank_Name", alias = "bank")]
    bank_name: String,
    #[serde(alias = "Available_Balance", alias = "balance")]
    available_balance: f64,
    #[serde(default, alias = "Currency")]
    currency: String,
}

impl From<BankRow> for BankAccount {
    fn from(row: BankRow) -> Self {
        Self {
            account_id: row.account_id,
            bank_name: row.bank_name,
            available_balance: row.available_balance,
            currency: row.currency,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FixedPaymentRow {
    #[serde(default, alias = "payment_name", alias = "description")]
    name: String,
    amount: f64,
    #[serde(default, alias = "date")]
    due_date: String,
    #[serde(default)]
    category: String,
}

impl From<FixedPaymentRow> for FixedPayment {
    fn from(row: FixedPaymentRow) -> Self {
        Self {
            name: row.name,
            amount: row.amount,
            due_date: row.due_date,
            category: row.category,
        }
    }
}
