//! KYC document extraction
//!
//! perform_ocr → (decide) → extract_details → save_to_db
//!
//! OCR failure, or OCR text too short to be a document, skips extraction and
//! goes straight to persistence so every request leaves a record.

use crate::error::MonitorError;
use crate::llm::ReasoningClient;
use crate::parsing::{parse_structured, Structured};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// OCR text with fewer non-blank characters than this is not worth extracting
const MIN_OCR_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KycStatus {
    Processing,
    Success,
    ErrorOcr,
    ErrorExtraction,
    ErrorDatabase,
}

#[derive(Debug, Clone)]
pub struct KycRequest {
    pub image: Vec<u8>,
    pub source_filename: String,
    pub external_transaction_id: Option<String>,
}

/// Identity fields read off the document; absent fields stay `None`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractedIdentity {
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub dob: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// What gets written to the document store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KycRecord {
    pub external_transaction_id: Option<String>,
    pub status: KycStatus,
    pub source_filename: String,
    pub raw_ocr_text: String,
    pub error_message: Option<String>,
    /// Only present on success
    pub extracted_data: Option<ExtractedIdentity>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KycOutcome {
    pub status: KycStatus,
    pub structured_data: Option<ExtractedIdentity>,
    pub error_message: Option<String>,
    pub db_document_id: Option<String>,
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Result<String>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a record and return its id
    async fn insert(&self, record: &KycRecord) -> Result<String>;
}

/// Shells out to the `tesseract` CLI, image on stdin and text on stdout
pub struct TesseractOcr {
    binary: String,
    language: String,
}

impl TesseractOcr {
    pub fn new(binary: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new("tesseract", "eng")
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(&self, image: &[u8]) -> Result<String> {
        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", self.language.as_str()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MonitorError::KycError(format!("Cannot start {}: {}", self.binary, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(image).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(MonitorError::KycError(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Process-local document store
pub struct InMemoryDocumentStore {
    records: RwLock<Vec<(String, KycRecord)>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    pub async fn records(&self) -> Vec<(String, KycRecord)> {
        self.records.read().await.clone()
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert(&self, record: &KycRecord) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.records.write().await.push((id.clone(), record.clone()));
        Ok(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KycStep {
    PerformOcr,
    ExtractDetails,
    SaveToDb,
    End,
}

/// Working state threaded through the steps
struct KycState {
    request: KycRequest,
    raw_ocr_text: String,
    structured_data: Option<ExtractedIdentity>,
    status: KycStatus,
    error_message: Option<String>,
    db_document_id: Option<String>,
}

pub struct KycPipeline {
    ocr: Arc<dyn OcrEngine>,
    client: Arc<dyn ReasoningClient>,
    store: Arc<dyn DocumentStore>,
}

impl KycPipeline {
    pub fn new(
        ocr: Arc<dyn OcrEngine>,
        client: Arc<dyn ReasoningClient>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self { ocr, client, store }
    }

    pub async fn process(&self, request: KycRequest) -> KycOutcome {
        info!(
            file = %request.source_filename,
            bytes = request.image.len(),
            "KYC extraction started"
        );

        let mut state = KycState {
            request,
            raw_ocr_text: String::new(),
            structured_data: None,
            status: KycStatus::Processing,
            error_message: None,
            db_document_id: None,
        };

        let mut step = KycStep::PerformOcr;
        while step != KycStep::End {
            debug!(?step, "KYC step");
            step = match step {
                KycStep::PerformOcr => {
                    self.perform_ocr(&mut state).await;
                    decide_after_ocr(&mut state)
                }
                KycStep::ExtractDetails => {
                    self.extract_details(&mut state).await;
                    KycStep::SaveToDb
                }
                KycStep::SaveToDb => {
                    self.save_to_db(&mut state).await;
                    KycStep::End
                }
                KycStep::End => KycStep::End,
            };
        }

        info!(status = ?state.status, "KYC extraction finished");

        KycOutcome {
            status: state.status,
            structured_data: state.structured_data,
            error_message: state.error_message,
            db_document_id: state.db_document_id,
        }
    }

    async fn perform_ocr(&self, state: &mut KycState) {
        match self.ocr.recognize(&state.request.image).await {
            Ok(text) => {
                debug!(chars = text.len(), "OCR complete");
                state.raw_ocr_text = text;
            }
            Err(e) => {
                warn!(error = %e, "OCR failed");
                state.status = KycStatus::ErrorOcr;
                state.error_message = Some(format!("Failed during OCR: {}", e));
            }
        }
    }

    async fn extract_details(&self, state: &mut KycState) {
        let prompt = build_prompt(&state.raw_ocr_text);

        let extracted = self.client.generate(&prompt).await.and_then(|reply| {
            match parse_structured::<ExtractedIdentity>(&reply) {
                Structured::Parsed(identity) => Ok(identity),
                Structured::Raw(_) => Err(MonitorError::ParseError(
                    "extraction reply was not valid JSON".to_string(),
                )),
            }
        });

        match extracted {
            Ok(identity) => state.structured_data = Some(identity),
            Err(e) => {
                warn!(error = %e, "KYC extraction failed");
                state.status = KycStatus::ErrorExtraction;
                state.error_message = Some(format!("Failed during extraction: {}", e));
            }
        }
    }

    async fn save_to_db(&self, state: &mut KycState) {
        let final_status = if state.status == KycStatus::Processing {
            KycStatus::Success
        } else {
            state.status
        };

        let record = KycRecord {
            external_transaction_id: state.request.external_transaction_id.clone(),
            status: final_status,
            source_filename: state.request.source_filename.clone(),
            raw_ocr_text: state.raw_ocr_text.clone(),
            error_message: state.error_message.clone(),
            extracted_data: if final_status == KycStatus::Success {
                state.structured_data.clone()
            } else {
                None
            },
            created_at: Utc::now(),
        };

        match self.store.insert(&record).await {
            Ok(id) => {
                state.db_document_id = Some(id);
                state.status = final_status;
            }
            Err(e) => {
                warn!(error = %e, "KYC record could not be saved");
                state.db_document_id = None;
                state.status = KycStatus::ErrorDatabase;
                state.error_message = Some(format!("Failed to save record: {}", e));
            }
        }
    }
}

/// Route past extraction when OCR failed or found almost nothing
fn decide_after_ocr(state: &mut KycState) -> KycStep {
    if state.status == KycStatus::ErrorOcr {
        return KycStep::SaveToDb;
    }

    let usable = state
        .raw_ocr_text
        .chars()
        .filter(|c| !c.is_whitespace())
        .count();
    if usable < MIN_OCR_CHARS {
        state.status = KycStatus::ErrorExtraction;
        state.error_message = Some("Insufficient text from OCR for extraction".to_string());
        return KycStep::SaveToDb;
    }

    KycStep::ExtractDetails
}

fn build_prompt(ocr_text: &str) -> String {
    format!(
        r#"You are an expert assistant for extracting information from Indian KYC documents.
Analyze the OCR text and extract: name, dob (in YYYY-MM-DD format), address, and
document_type ('Aadhaar Card', 'PAN Card', etc.).

OCR TEXT:
---
{ocr_text}
---

Respond ONLY with a valid JSON object with keys "document_type", "name", "dob",
"address". If a field is not found, its value should be null.
"#
    )
}
