use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::agent::PendingOnDemandRequest;
use crate::cache::{CacheData, Namespace};
use crate::dispatcher::{DispatchOutcome, OnDemandDispatcher};
use crate::error::CacheError;
use crate::resource::OnDemandType;
use crate::store::{CacheStore, StoreError};

/// Shared application state
pub struct AppState {
    pub store: Arc<dyn CacheStore>,
    pub dispatcher: Arc<OnDemandDispatcher>,
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: u32,
}

impl ApiError {
    fn bad_request(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: 400,
        }
    }

    fn not_found(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: 404,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.code {
            400 => StatusCode::BAD_REQUEST,
            404 => StatusCode::NOT_FOUND,
            503 => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidPattern { .. } => ApiError::bad_request(e.to_string()),
            other => ApiError {
                error: other.to_string(),
                code: 500,
            },
        }
    }
}

impl From<CacheError> for ApiError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::Provider(e) => ApiError {
                error: e.to_string(),
                code: 503,
            },
            CacheError::Store(e) => e.into(),
            CacheError::Serialization(e) => ApiError {
                error: e.to_string(),
                code: 500,
            },
        }
    }
}

fn parse_namespace(namespace: &str) -> Result<Namespace, ApiError> {
    namespace
        .parse()
        .map_err(|e: crate::cache::UnknownNamespace| ApiError::not_found(e.to_string()))
}

fn parse_type(kind: &str) -> Result<OnDemandType, ApiError> {
    kind.parse().map_err(ApiError::bad_request)
}

// === Version ===

#[derive(Serialize)]
pub struct VersionInfo {
    pub version: String,
}

pub async fn get_version() -> Json<VersionInfo> {
    Json(VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// === On-demand ===

/// Trigger body: the resource type plus the parameters an atomic operation
/// passes along (`account`, `region` and the resource name).
#[derive(Debug, Deserialize, Serialize)]
pub struct OnDemandRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

pub async fn trigger_on_demand(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OnDemandRequest>,
) -> Result<Json<DispatchOutcome>, ApiError> {
    let kind = parse_type(&req.kind)?;
    let outcome = state.dispatcher.dispatch(kind, &req.data).await?;
    debug!(kind = %kind, handled = outcome.handled, evicted = outcome.evicted, "On-demand trigger");
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

pub async fn list_pending(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PendingQuery>,
) -> Result<Json<Vec<PendingOnDemandRequest>>, ApiError> {
    let kind = query.kind.as_deref().map(parse_type).transpose()?;
    Ok(Json(state.dispatcher.pending(kind).await?))
}

// === Cache reads ===

#[derive(Debug, Deserialize)]
pub struct CacheQuery {
    pub pattern: Option<String>,
}

pub async fn list_cache(
    State(state): State<Arc<AppState>>,
    Path(namespace): Path<String>,
    Query(query): Query<CacheQuery>,
) -> Result<Json<Vec<CacheData>>, ApiError> {
    let namespace = parse_namespace(&namespace)?;
    let pattern = query.pattern.as_deref().unwrap_or("*");
    let ids = state.store.filter_identifiers(namespace, pattern).await?;
    Ok(Json(state.store.get_all(namespace, &ids).await?))
}

pub async fn get_cache(
    State(state): State<Arc<AppState>>,
    Path((namespace, id)): Path<(String, String)>,
) -> Result<Json<CacheData>, ApiError> {
    let namespace = parse_namespace(&namespace)?;
    match state.store.get(namespace, &id).await? {
        Some(record) => Ok(Json(record)),
        None => Err(ApiError::not_found(format!("{} not found in {}", id, namespace))),
    }
}
