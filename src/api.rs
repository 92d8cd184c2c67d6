//! The HTTP API: ingestion, status queries, proxy checks and downloads.
//!
//! Handlers are stateless; everything mutable lives behind the service traits
//! in [`crate::core`]. Write endpoints are gated by a shared-secret bearer
//! token compared before any processing.

use crate::config::Config;
use crate::core::{ArtifactStore, ProxyDirectory, ServerRecord, StatusStore};
use crate::formatting::{format_duration, parse_timestamp};
use crate::ingest::{IngestPayload, Ingestor};
use crate::proxy::ProxyClassifier;
use crate::status::{DisplayStatus, StatusRules};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, instrument};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn StatusStore>,
    pub ingestor: Arc<Ingestor>,
    pub proxies: Arc<dyn ProxyDirectory>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub rules: Arc<StatusRules>,
    pub metrics_handle: Option<PrometheusHandle>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/ingest", post(ingest))
        .route(
            "/api/ingest/operator-email",
            get(list_operator_emails).put(update_operator_emails),
        )
        .route("/api/reseed-status", get(reseed_status))
        .route("/api/reseed-status/{hostname}", get(reseed_status_for_host))
        .route("/api/check-proxy", get(check_proxy))
        .route("/api/download/{key}", get(download))
        .route("/metrics", get(metrics_text))
        .with_state(state)
}

// =============================================================================
// Authorization
// =============================================================================

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, rest) = value.split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then_some(token)
}

/// Checks the shared-secret gate. With no token configured, every write is
/// rejected.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let expected = state
        .config
        .auth
        .api_token
        .as_deref()
        .filter(|t| !t.is_empty());
    match (expected, bearer_token(headers)) {
        (Some(expected), Some(token)) if token == expected => Ok(()),
        _ => Err(error_response(StatusCode::UNAUTHORIZED, "Unauthorized")),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

// =============================================================================
// Ingestion
// =============================================================================

#[instrument(skip_all)]
async fn ingest(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }

    let Ok(payload) = serde_json::from_slice::<IngestPayload>(&body) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid JSON payload");
    };
    let reports = payload.into_reports();
    if reports.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No servers provided");
    }

    let summary = state.ingestor.ingest(reports).await;
    let status = if summary.success {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };
    (status, Json(summary)).into_response()
}

// =============================================================================
// Operator e-mail management
// =============================================================================

#[derive(Debug, Deserialize)]
struct OperatorEmailUpdate {
    #[serde(default)]
    server_name: Option<String>,
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    operator_email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OperatorEmailPayload {
    Wrapped { servers: Vec<OperatorEmailUpdate> },
    Bare(Vec<OperatorEmailUpdate>),
}

impl OperatorEmailPayload {
    fn into_updates(self) -> Vec<OperatorEmailUpdate> {
        match self {
            OperatorEmailPayload::Wrapped { servers } => servers,
            OperatorEmailPayload::Bare(updates) => updates,
        }
    }
}

async fn list_operator_emails(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }

    match state.store.list(None).await {
        Ok(records) => {
            let servers: Vec<_> = records
                .into_iter()
                .filter(|r| r.operator_email.is_some())
                .map(|r| {
                    json!({
                        "server_name": r.server_name,
                        "operator_email": r.operator_email,
                    })
                })
                .collect();
            Json(json!({ "servers": servers })).into_response()
        }
        Err(e) => {
            error!("operator-email list failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list servers")
        }
    }
}

async fn update_operator_emails(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }

    let Ok(payload) = serde_json::from_slice::<OperatorEmailPayload>(&body) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid JSON");
    };
    let updates = payload.into_updates();
    if updates.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No updates provided");
    }

    let mut updated = 0;
    let mut errors = Vec::new();

    for update in updates {
        let Some(name) = update
            .server_name
            .or(update.hostname)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
        else {
            errors.push("Missing hostname in entry".to_string());
            continue;
        };

        let email = update
            .operator_email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());

        match state.store.get(&name).await {
            Ok(Some(mut record)) => {
                record.operator_email = email;
                match state.store.upsert(record).await {
                    Ok(()) => updated += 1,
                    Err(e) => errors.push(format!("Failed to update {}: {}", name, e)),
                }
            }
            Ok(None) => errors.push(format!("Unknown server {}", name)),
            Err(e) => errors.push(format!("Failed to update {}: {}", name, e)),
        }
    }

    let status = if errors.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };
    (status, Json(json!({ "updated": updated, "errors": errors }))).into_response()
}

// =============================================================================
// Status query
// =============================================================================

/// One row of the status response.
#[derive(Debug, Serialize)]
pub struct ServerStatusView {
    pub server_name: String,
    pub status: DisplayStatus,
    pub status_message: String,
    pub last_checked: String,
    pub router_infos: u32,
    pub offline_duration: Option<String>,
    pub download_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub servers: Vec<ServerStatusView>,
    /// The most recent check timestamp across all servers.
    pub last_checked: Option<String>,
    pub count: usize,
}

fn build_status_response(
    records: Vec<ServerRecord>,
    rules: &StatusRules,
    artifacts: &dyn ArtifactStore,
) -> StatusResponse {
    let now = Utc::now();
    let mut latest = None;
    let mut servers = Vec::with_capacity(records.len());

    for record in records {
        if let Some(ts) = parse_timestamp(&record.last_checked) {
            latest = Some(latest.map_or(ts, |prev: chrono::DateTime<Utc>| prev.max(ts)));
        }

        let (status, status_message) =
            rules.display(&record.server_name, &record.status, &record.status_message);

        let offline_duration = if status == DisplayStatus::Offline {
            record
                .first_offline
                .as_deref()
                .and_then(parse_timestamp)
                .and_then(|since| format_duration((now - since).num_seconds()))
        } else {
            None
        };

        let download_url = if status == DisplayStatus::Online {
            artifacts.download_url(&record.server_name)
        } else {
            None
        };

        servers.push(ServerStatusView {
            server_name: record.server_name,
            status,
            status_message,
            last_checked: record.last_checked,
            router_infos: record.router_infos,
            offline_duration,
            download_url,
        });
    }

    StatusResponse {
        count: servers.len(),
        last_checked: latest.map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
        servers,
    }
}

async fn status_response_for(state: &AppState, filter: Option<&str>) -> Response {
    match state.store.list(filter).await {
        Ok(records) => Json(build_status_response(
            records,
            &state.rules,
            state.artifacts.as_ref(),
        ))
        .into_response(),
        Err(e) => {
            error!("reseed-status query failed: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch reseed status",
            )
        }
    }
}

async fn reseed_status(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let filter = params
        .get("server")
        .or_else(|| params.get("hostname"))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty());
    status_response_for(&state, filter).await
}

async fn reseed_status_for_host(
    State(state): State<AppState>,
    Path(hostname): Path<String>,
) -> Response {
    let hostname = hostname.trim();
    let filter = (!hostname.is_empty()).then_some(hostname);
    status_response_for(&state, filter).await
}

// =============================================================================
// Proxy check
// =============================================================================

/// Extracts the visitor address from forwarding headers, first hop wins.
fn visitor_ip(headers: &HeaderMap) -> String {
    for name in ["cf-connecting-ip", "x-forwarded-for", "x-real-ip"] {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            let first = value.split(',').next().unwrap_or("").trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    String::new()
}

#[instrument(skip_all)]
async fn check_proxy(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let visitor = visitor_ip(&headers);

    let entries = match state.proxies.entries().await {
        Ok(entries) => entries,
        Err(e) => {
            error!("check-proxy failed: {:#}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Proxy check failed");
        }
    };

    let classifier = ProxyClassifier::new(
        state.config.proxy.default_flag.clone(),
        state.config.proxy.debug,
    );
    let mut verdict = classifier.classify(&visitor, &entries);
    if let Some(debug) = verdict.debug.as_mut() {
        debug.headers = headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
    }

    metrics::counter!("proxy.checks").increment(1);
    if verdict.is_using_proxy {
        metrics::counter!("proxy.hits").increment(1);
    }

    (
        [(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")],
        Json(verdict),
    )
        .into_response()
}

// =============================================================================
// Downloads
// =============================================================================

async fn download(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    let key = key.trim();
    if key.is_empty() {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    }

    match state.artifacts.read(key).await {
        Ok(Some(bytes)) => (
            [
                (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", key),
                ),
                (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
            ],
            bytes,
        )
            .into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "Not found").into_response(),
        Err(e) => {
            error!("download of {} failed: {}", key, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Download failed").into_response()
        }
    }
}

// =============================================================================
// Metrics
// =============================================================================

async fn metrics_text(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(name: &'static str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(
            bearer_token(&headers_with("authorization", "Bearer secret")),
            Some("secret")
        );
        assert_eq!(
            bearer_token(&headers_with("authorization", "bearer  secret  ")),
            Some("secret")
        );
        assert_eq!(
            bearer_token(&headers_with("authorization", "Basic secret")),
            None
        );
        assert_eq!(bearer_token(&headers_with("authorization", "Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_visitor_ip_precedence() {
        assert_eq!(
            visitor_ip(&headers_with("cf-connecting-ip", "203.0.113.5")),
            "203.0.113.5"
        );
        assert_eq!(
            visitor_ip(&headers_with("x-forwarded-for", "203.0.113.5, 10.0.0.1")),
            "203.0.113.5"
        );
        assert_eq!(
            visitor_ip(&headers_with("x-real-ip", " 203.0.113.9 ")),
            "203.0.113.9"
        );
        assert_eq!(visitor_ip(&HeaderMap::new()), "");
    }
}
