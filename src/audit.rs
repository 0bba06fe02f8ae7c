//! Audit log store
//!
//! One JSON file per run, keyed by a millisecond timestamp. Files are
//! created once and never rewritten. Recent logs are read back as prior
//! decisions for later prompts.

use crate::error::MonitorError;
use crate::models::{AnalysisLog, LedgerSnapshot, PriorLog};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const ANALYSIS_LOG_PREFIX: &str = "liquidity_risk_log_";
pub const FEEDBACK_LOG_PREFIX: &str = "user_feedback_";

/// Reviewer verdict on an earlier run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackRecord {
    pub timestamp: String,
    pub run_id: Option<Uuid>,
    /// "yes" or "no": whether a real risk was present
    pub risk_detected: Option<String>,
    pub user_feedback: Option<String>,
}

impl FeedbackRecord {
    pub fn new(run_id: Option<Uuid>, risk_detected: Option<String>, user_feedback: Option<String>) -> Self {
        let risk_detected = risk_detected
            .map(|v| v.trim().to_lowercase())
            .filter(|v| v == "yes" || v == "no");
        let user_feedback = user_feedback
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Self {
            timestamp: log_timestamp(Utc::now()),
            run_id,
            risk_detected,
            user_feedback,
        }
    }
}

/// Append-only store for run logs
#[async_trait::async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist a run log, returning its storage key
    async fn persist(&self, log: &AnalysisLog) -> Result<String>;

    async fn persist_feedback(&self, feedback: &FeedbackRecord) -> Result<String>;

    /// The `limit` most recent entries, oldest first
    async fn recent(&self, limit: usize) -> Result<Vec<PriorLog>>;
}

/// `YYYYMMDD_HHMMSS_mmm`
pub fn log_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S_%3f").to_string()
}

/// JSON files in a directory
pub struct FileAuditStore {
    log_dir: PathBuf,
}

impl FileAuditStore {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    async fn write_new<T: Serialize>(&self, file_name: String, value: &T) -> Result<String> {
        tokio::fs::create_dir_all(&self.log_dir).await.map_err(|e| {
            MonitorError::AuditError(format!(
                "Cannot create log directory {}: {}",
                self.log_dir.display(),
                e
            ))
        })?;

        let path = self.log_dir.join(file_name);
        let body = serde_json::to_vec_pretty(value)?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| {
                MonitorError::AuditError(format!("Cannot create {}: {}", path.display(), e))
            })?;
        let written = match file.write_all(&body).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            drop(file);
            return Err(discard_partial(&path, e).await);
        }

        info!(path = %path.display(), bytes = body.len(), "Audit log written");

        Ok(path.display().to_string())
    }
}

/// Remove a log file whose write did not complete
async fn discard_partial(path: &std::path::Path, cause: std::io::Error) -> MonitorError {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Could not remove partial audit log");
    }
    MonitorError::AuditError(format!("Cannot write {}: {}", path.display(), cause))
}

#[async_trait::async_trait]
impl AuditStore for FileAuditStore {
    async fn persist(&self, log: &AnalysisLog) -> Result<String> {
        self.write_new(format!("{}{}.json", ANALYSIS_LOG_PREFIX, log.timestamp), log)
            .await
    }

    async fn persist_feedback(&self, feedback: &FeedbackRecord) -> Result<String> {
        self.write_new(
            format!("{}{}.json", FEEDBACK_LOG_PREFIX, feedback.timestamp),
            feedback,
        )
        .await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<PriorLog>> {
        let mut entries = match tokio::fs::read_dir(&self.log_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut logs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let parsed = tokio::fs::read(&path)
                .await
                .ok()
                .and_then(|bytes| serde_json::from_slice::<PriorLog>(&bytes).ok());

            match parsed {
                Some(log) => logs.push(log),
                None => warn!(path = %path.display(), "Skipping unreadable log file"),
            }
        }

        logs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let start = logs.len().saturating_sub(limit);
        debug!(found = logs.len(), returned = logs.len() - start, "Loaded prior logs");

        Ok(logs.split_off(start))
    }
}

/// Process-local store, for tests and embedding
pub struct InMemoryAuditStore {
    logs: Arc<RwLock<Vec<AnalysisLog>>>,
    feedback: Arc<RwLock<Vec<FeedbackRecord>>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self {
            logs: Arc::new(RwLock::new(Vec::new())),
            feedback: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn logs(&self) -> Vec<AnalysisLog> {
        self.logs.read().await.clone()
    }
}

impl Default for InMemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn persist(&self, log: &AnalysisLog) -> Result<String> {
        let mut logs = self.logs.write().await;
        logs.push(log.clone());
        Ok(log.timestamp.clone())
    }

    async fn persist_feedback(&self, feedback: &FeedbackRecord) -> Result<String> {
        let mut records = self.feedback.write().await;
        records.push(feedback.clone());
        Ok(feedback.timestamp.clone())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<PriorLog>> {
        let logs = self.logs.read().await;
        let feedback = self.feedback.read().await;

        let mut items: Vec<PriorLog> = logs
            .iter()
            .map(|log| PriorLog {
                timestamp: log.timestamp.clone(),
                risk_detected: log.risk_detected.clone(),
                user_feedback: log.user_feedback.clone(),
            })
            .chain(feedback.iter().map(|f| PriorLog {
                timestamp: f.timestamp.clone(),
                risk_detected: f.risk_detected.clone(),
                user_feedback: f.user_feedback.clone(),
            }))
            .collect();

        items.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let start = items.len().saturating_sub(limit);
        Ok(items.split_off(start))
    }
}

/// SHA-256 of the ledger snapshot, hex encoded
/// Streams the JSON encoding straight into the hasher
pub fn compute_input_hash(snapshot: &LedgerSnapshot) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), snapshot).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        FeatureSet, ForecastSeries, InputSnapshot, Report, RiskAssessment, RiskLevel,
        TransactionRecord,
    };
    use tempfile::tempdir;

    fn sample_log(timestamp: &str, risk: &str) -> AnalysisLog {
        AnalysisLog {
            run_id: Uuid::new_v4(),
            timestamp: timestamp.to_string(),
            created_at: Utc::now(),
            pipeline: "supervisor".to_string(),
            input: InputSnapshot {
                features: FeatureSet::default(),
                forecast: ForecastSeries::default(),
                transaction_count: 0,
                history_days: 0,
                input_hash: String::new(),
            },
            risk_level: RiskLevel::Medium,
            reasons: vec![],
            scenarios: vec![],
            historical_analysis: String::new(),
            assessment: RiskAssessment::default(),
            report: Report::default(),
            fallbacks: vec![],
            risk_detected: Some(risk.to_string()),
            user_feedback: None,
        }
    }

    #[tokio::test]
    async fn test_file_store_round_trip_and_recent_order() {
        let dir = tempdir().unwrap();
        let store = FileAuditStore::new(dir.path().join("logs"));

        for (ts, risk) in [
            ("20240103_000000_000", "high"),
            ("20240101_000000_000", "low"),
            ("20240102_000000_000", "medium"),
            ("20240104_000000_000", "low"),
        ] {
            store.persist(&sample_log(ts, risk)).await.unwrap();
        }
        std::fs::write(dir.path().join("logs").join("garbage.json"), "{not json").unwrap();

        let recent = store.recent(3).await.unwrap();
        let stamps: Vec<&str> = recent.iter().map(|l| l.timestamp.as_str()).collect();
        assert_eq!(
            stamps,
            vec!["20240102_000000_000", "20240103_000000_000", "20240104_000000_000"]
        );
        assert_eq!(recent[1].risk_detected.as_deref(), Some("high"));
    }

    #[tokio::test]
    async fn test_file_store_never_overwrites() {
        let dir = tempdir().unwrap();
        let store = FileAuditStore::new(dir.path());

        let log = sample_log("20240101_000000_000", "low");
        store.persist(&log).await.unwrap();
        let second = store.persist(&log).await;
        assert!(matches!(second, Err(MonitorError::AuditError(_))));
    }

    #[tokio::test]
    async fn test_missing_directory_has_no_history() {
        let dir = tempdir().unwrap();
        let store = FileAuditStore::new(dir.path().join("absent"));
        assert!(store.recent(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_feedback_is_normalised_and_recalled() {
        let store = InMemoryAuditStore::new();
        let feedback = FeedbackRecord::new(None, Some(" YES ".to_string()), Some("  ".to_string()));
        assert_eq!(feedback.risk_detected.as_deref(), Some("yes"));
        assert!(feedback.user_feedback.is_none());

        store.persist_feedback(&feedback).await.unwrap();
        let recent = store.recent(3).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].risk_detected.as_deref(), Some("yes"));
    }

    #[test]
    fn test_input_hash_is_stable() {
        let snapshot = LedgerSnapshot {
            transactions: vec![TransactionRecord::new("2024-01-01", 10.0, "INR")],
            ..Default::default()
        };
        let first = compute_input_hash(&snapshot);
        assert_eq!(first.len(), 64);
        assert_eq!(first, compute_input_hash(&snapshot.clone()));

        let changed = LedgerSnapshot::default();
        assert_ne!(first, compute_input_hash(&changed));
    }

    #[test]
    fn test_timestamp_has_millisecond_key() {
        let at = DateTime::parse_from_rfc3339("2024-05-06T07:08:09.123Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(log_timestamp(at), "20240506_070809_123");
    }

    #[tokio::test]
    async fn test_partial_write_is_removed() {
        let dir = tempdir().unwrap();
        let path = dir
            .path()
            .join(format!("{}20240101_000000_000.json", ANALYSIS_LOG_PREFIX));
        std::fs::write(&path, b"{\"run_id\"").unwrap();

        let err = discard_partial(&path, std::io::Error::new(std::io::ErrorKind::Other, "disk full")).await;

        assert!(matches!(err, MonitorError::AuditError(_)));
        assert!(!path.exists());
        let store = FileAuditStore::new(dir.path());
        assert!(store.recent(5).await.unwrap().is_empty());
    }
}
