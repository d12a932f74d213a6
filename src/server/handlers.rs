//! HTTP request handlers

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::data::DataValidator;
use crate::explainability::{GlobalImportance, ImportanceMethod, LocalExplanationReport};
use crate::inference::{PredictionRequest, PredictionResponse};
use crate::session::{ModelResult, Session, SessionSnapshot, SessionStatus, SessionSummary};
use crate::training::{Algorithm, AlgorithmSpec, MetricMap, ProblemType, TrainingConfig};

use super::error::{Result, ServerError};
use super::state::AppState;

type JsonBody<T> = std::result::Result<Json<T>, JsonRejection>;

// ============================================================================
// Training
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TrainRequest {
    pub file_id: String,
    #[serde(default)]
    pub target_column: Option<String>,
    #[serde(default)]
    pub selected_features: Option<Vec<String>>,
    pub problem_type: String,
    #[serde(default)]
    pub selected_algorithms: Vec<String>,
    #[serde(default)]
    pub test_size: Option<f64>,
    #[serde(default)]
    pub random_state: Option<u64>,
    #[serde(default)]
    pub cv_folds: Option<usize>,
}

impl TrainRequest {
    fn into_config(self, state: &AppState) -> crate::error::Result<TrainingConfig> {
        let problem_type: ProblemType = self.problem_type.parse()?;
        let algorithms = self
            .selected_algorithms
            .iter()
            .map(|name| name.parse::<Algorithm>())
            .collect::<crate::error::Result<Vec<_>>>()?;

        let settings = &state.settings;
        let mut config = TrainingConfig::new(self.file_id, problem_type)
            .with_algorithms(algorithms)
            .with_features(self.selected_features.unwrap_or_default())
            .with_test_size(self.test_size.unwrap_or(settings.default_test_size))
            .with_cv_folds(self.cv_folds.unwrap_or(settings.default_cv_folds))
            .with_random_state(self.random_state.unwrap_or(settings.default_random_state));
        if let Some(target) = self.target_column.filter(|t| !t.trim().is_empty()) {
            config = config.with_target(target);
        }
        Ok(config)
    }
}

/// Submit a training session; returns immediately with the session id
pub async fn start_training(
    State(state): State<Arc<AppState>>,
    payload: JsonBody<TrainRequest>,
) -> Result<Json<serde_json::Value>> {
    let Json(request) = payload?;
    let config = request.into_config(&state)?;
    let data = state.datasets.get(&config.file_id)?;

    let worker = Arc::clone(&state);
    let session_id = tokio::task::spawn_blocking(move || worker.scheduler.submit(config, data)).await??;
    info!(session_id = %session_id, "Training started");

    Ok(Json(json!({
        "session_id": session_id,
        "message": "Training started",
    })))
}

pub async fn get_training_status(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSnapshot>> {
    Ok(Json(state.sessions.get_snapshot(&session_id)?))
}

#[derive(Debug, Serialize)]
pub struct ModelSummary {
    pub model_name: String,
    pub metrics: MetricMap,
    pub training_time: f64,
    pub cv_mean: f64,
    pub cv_std: f64,
    pub cv_scores: Vec<f64>,
}

impl From<&ModelResult> for ModelSummary {
    fn from(r: &ModelResult) -> Self {
        Self {
            model_name: r.model_name.clone(),
            metrics: r.metrics.clone(),
            training_time: r.training_time,
            cv_mean: r.cv_mean,
            cv_std: r.cv_std,
            cv_scores: r.cv_scores.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub status: SessionStatus,
    pub problem_type: ProblemType,
    pub target_column: Option<String>,
    pub best_model: Option<String>,
    /// Leaderboard order, best first
    pub models: Vec<ModelSummary>,
    pub failures: BTreeMap<String, String>,
    pub completed_models: Vec<String>,
    pub total_models: usize,
    pub feature_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        let models = session.leaderboard().into_iter().map(ModelSummary::from).collect();
        Self {
            problem_type: session.problem_type(),
            target_column: session.config.target_column.clone(),
            models,
            session_id: session.session_id,
            status: session.status,
            best_model: session.best_model,
            failures: session.failures,
            completed_models: session.completed_models,
            total_models: session.total_models,
            feature_names: session.feature_names,
            error: session.error,
            created_at: session.created_at,
            finished_at: session.finished_at,
        }
    }
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>> {
    Ok(Json(state.sessions.get_full(&session_id)?.into()))
}

pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionSummary>> {
    Json(state.sessions.list())
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let existed = state.sessions.delete(&session_id)?;
    let message = if existed {
        format!("Session {} deleted", session_id)
    } else {
        format!("Session {} does not exist", session_id)
    };
    Ok(Json(json!({ "message": message })))
}

// ============================================================================
// Prediction and explanations
// ============================================================================

pub async fn predict(
    State(state): State<Arc<AppState>>,
    payload: JsonBody<PredictionRequest>,
) -> Result<Json<PredictionResponse>> {
    let Json(request) = payload?;
    let response = tokio::task::spawn_blocking(move || state.predictions.handle(&request)).await??;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct ImportanceRequest {
    pub session_id: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
}

pub async fn get_feature_importance(
    State(state): State<Arc<AppState>>,
    payload: JsonBody<ImportanceRequest>,
) -> Result<Json<GlobalImportance>> {
    let Json(request) = payload?;
    let method: ImportanceMethod = request.method.as_deref().unwrap_or_default().parse()?;
    let importance = tokio::task::spawn_blocking(move || {
        state
            .explanations
            .global_importance(&request.session_id, method, request.model_name.as_deref())
    })
    .await??;
    Ok(Json(importance))
}

#[derive(Debug, Deserialize)]
pub struct LocalExplanationRequest {
    pub session_id: String,
    /// Out-of-range values clamp to the evaluation set on either side
    #[serde(default)]
    pub sample_index: i64,
    #[serde(default)]
    pub model_name: Option<String>,
}

pub async fn get_local_explanation(
    State(state): State<Arc<AppState>>,
    payload: JsonBody<LocalExplanationRequest>,
) -> Result<Json<LocalExplanationReport>> {
    let Json(request) = payload?;
    let report = tokio::task::spawn_blocking(move || {
        state
            .explanations
            .local_explanation(
                &request.session_id,
                usize::try_from(request.sample_index.max(0)).unwrap_or(usize::MAX),
                request.model_name.as_deref(),
            )
    })
    .await??;
    Ok(Json(report))
}

// ============================================================================
// Artifacts
// ============================================================================

fn model_package(state: &AppState, session_id: &str, model_name: &str) -> Result<impl IntoResponse> {
    let session = state.sessions.get_full(session_id)?;
    if !session.results.contains_key(model_name) {
        return Err(ServerError::NotFound(format!("model not found: {}/{}", session_id, model_name)));
    }
    let artifact = state.artifacts.get(session_id, model_name)?;
    let body = artifact.to_package()?;
    let disposition = format!("attachment; filename=\"{}_{}.json\"", model_name, session_id);
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

pub async fn download_model(
    State(state): State<Arc<AppState>>,
    Path((session_id, model_name)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    model_package(&state, &session_id, &model_name)
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub session_id: String,
    pub model_name: String,
}

pub async fn download_model_post(
    State(state): State<Arc<AppState>>,
    payload: JsonBody<DownloadRequest>,
) -> Result<impl IntoResponse> {
    let Json(request) = payload?;
    model_package(&state, &request.session_id, &request.model_name)
}

// ============================================================================
// Datasets
// ============================================================================

/// Upload a CSV file (multipart field `file`)
pub async fn upload_data(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(e.to_string()))?
    {
        let file_name = field.file_name().unwrap_or("data.csv").to_string();
        if !file_name.to_ascii_lowercase().ends_with(".csv") {
            return Err(ServerError::BadRequest("Only CSV files are supported".to_string()));
        }
        let bytes = field.bytes().await.map_err(|e| ServerError::BadRequest(e.to_string()))?;
        if bytes.len() > state.settings.max_upload_size {
            return Err(ServerError::PayloadTooLarge(format!(
                "File exceeds {} bytes",
                state.settings.max_upload_size
            )));
        }

        let worker = Arc::clone(&state);
        let name = file_name.clone();
        let stored = tokio::task::spawn_blocking(move || {
            worker
                .datasets
                .save_upload(&worker.settings.upload_dir, &name, &bytes)
        })
        .await??;

        return Ok(Json(json!({
            "file_id": stored.file_id,
            "filename": stored.filename,
            "rows": stored.rows,
            "columns": stored.columns,
            "message": format!("Uploaded {} ({} rows)", file_name, stored.rows),
        })));
    }

    Err(ServerError::BadRequest("No file uploaded".to_string()))
}

pub async fn get_columns(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let data = state.datasets.get(&file_id)?;
    Ok(Json(json!({
        "file_id": file_id,
        "rows": data.n_rows(),
        "columns": data.column_info(),
        "preview": data.head(5),
    })))
}

/// Rows returned when the request does not say
const DEFAULT_PREVIEW_ROWS: usize = 100;
const MAX_PREVIEW_ROWS: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    pub rows: Option<usize>,
}

pub async fn get_dataset_preview(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<serde_json::Value>> {
    let data = state.datasets.get(&file_id)?;
    let rows = query.rows.unwrap_or(DEFAULT_PREVIEW_ROWS).min(MAX_PREVIEW_ROWS);
    let preview = data.head(rows);
    Ok(Json(json!({
        "file_id": file_id,
        "columns": data.column_names(),
        "preview_rows": preview.len(),
        "data": preview,
        "total_rows": data.n_rows(),
    })))
}

pub async fn list_datasets(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({ "datasets": state.datasets.list() }))
}

#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    pub target_column: Option<String>,
}

pub async fn validate_data(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
    Query(query): Query<ValidateQuery>,
) -> Result<Json<serde_json::Value>> {
    let data = state.datasets.get(&file_id)?;
    let report = DataValidator::new(&data)
        .with_max_categorical_unique(state.settings.max_categorical_unique)
        .validate(query.target_column.as_deref().filter(|t| !t.is_empty()))?;
    Ok(Json(json!({
        "file_id": file_id,
        "validation_report": report,
    })))
}

// ============================================================================
// Catalogue and system
// ============================================================================

pub async fn list_algorithms(Path(problem_type): Path<String>) -> Result<Json<serde_json::Value>> {
    let problem_type: ProblemType = problem_type.parse()?;
    let algorithms: Vec<AlgorithmSpec> = Algorithm::catalogue(problem_type);
    Ok(Json(json!({
        "problem_type": problem_type,
        "algorithms": algorithms,
    })))
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let uptime = chrono::Utc::now().signed_duration_since(state.started_at);
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.sessions.len(),
        "datasets": state.datasets.list().len(),
        "max_workers": state.scheduler.max_workers(),
        "uptime_secs": uptime.num_seconds(),
    }))
}
