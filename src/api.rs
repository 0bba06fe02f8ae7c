//! REST API for the liquidity risk monitor
//!
//! Runs the supervisor and quick pipelines on demand, records reviewer
//! feedback and exposes KYC document extraction.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audit::{AuditStore, FeedbackRecord};
use crate::error::MonitorError;
use crate::kyc::{KycPipeline, KycRequest, KycStatus};
use crate::pipeline::{QuickAnalyzer, Supervisor};

/// Upload cap for KYC images
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FeedbackRequest {
    pub run_id: Option<Uuid>,
    /// "yes" or "no"
    pub risk_detected: Option<String>,
    pub user_feedback: Option<String>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn error_with<T: Serialize>(message: String, data: T) -> Self {
        Self {
            data: serde_json::to_value(data).ok(),
            ..Self::error(message)
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub supervisor: Arc<Supervisor>,
    pub quick: Arc<QuickAnalyzer>,
    pub kyc: Arc<KycPipeline>,
    pub audit: Arc<dyn AuditStore>,
}

fn error_status(e: &MonitorError) -> StatusCode {
    if e.is_fatal() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Analysis Endpoints
/// =============================

async fn run_analysis(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    info!("Received supervisor analysis request");

    match state.supervisor.run().await {
        Ok(result) => (StatusCode::OK, Json(ApiResponse::success(result))),
        Err(e) => {
            warn!(error = %e, "Supervisor run failed");
            (
                error_status(&e),
                Json(ApiResponse::error(format!("Analysis failed: {}", e))),
            )
        }
    }
}

async fn run_quick_analysis(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    info!("Received quick analysis request");

    match state.quick.run().await {
        Ok(result) => (StatusCode::OK, Json(ApiResponse::success(result))),
        Err(e) => {
            warn!(error = %e, "Quick analysis failed");
            (
                error_status(&e),
                Json(ApiResponse::error(format!("Quick analysis failed: {}", e))),
            )
        }
    }
}

async fn record_feedback(
    State(state): State<ApiState>,
    Json(req): Json<FeedbackRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let record = FeedbackRecord::new(req.run_id, req.risk_detected, req.user_feedback);
    if record.risk_detected.is_none() && record.user_feedback.is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(
                "Provide risk_detected (yes/no) or user_feedback".into(),
            )),
        );
    }

    match state.audit.persist_feedback(&record).await {
        Ok(key) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({ "log_id": key }))),
        ),
        Err(e) => {
            error!(error = %e, "Feedback could not be saved");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(format!("Feedback not saved: {}", e))),
            )
        }
    }
}

/// =============================
/// KYC Extraction Endpoint
/// =============================

async fn extract_kyc(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> (StatusCode, Json<ApiResponse>) {
    let mut image: Option<(Vec<u8>, String)> = None;
    let mut external_transaction_id = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::error(format!("Invalid multipart body: {}", e))),
                )
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                match field.bytes().await {
                    Ok(bytes) => image = Some((bytes.to_vec(), filename)),
                    Err(e) => {
                        return (
                            StatusCode::BAD_REQUEST,
                            Json(ApiResponse::error(format!("Cannot read image: {}", e))),
                        )
                    }
                }
            }
            "external_transaction_id" => {
                external_transaction_id = field
                    .text()
                    .await
                    .ok()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
            }
            _ => {}
        }
    }

    let Some((bytes, source_filename)) = image.filter(|(bytes, _)| !bytes.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Image file is empty.".into())),
        );
    };

    info!(file = %source_filename, "Received KYC extraction request");

    let outcome = state
        .kyc
        .process(KycRequest {
            image: bytes,
            source_filename,
            external_transaction_id,
        })
        .await;

    if outcome.status == KycStatus::Success {
        (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "status": outcome.status,
                "data": outcome.structured_data,
                "database_record_id": outcome.db_document_id,
            }))),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error_with(
                outcome
                    .error_message
                    .unwrap_or_else(|| "KYC extraction failed".to_string()),
                serde_json::json!({
                    "status": outcome.status,
                    "database_record_id": outcome.db_document_id,
                }),
            )),
        )
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/analyze", post(run_analysis))
        .route("/api/quick-analysis", post(run_quick_analysis))
        .route("/api/feedback", post(record_feedback))
        .route("/v1/extract", post(extract_kyc))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
