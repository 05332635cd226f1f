//! HTTP handlers for the conditional-request surface (spec §6.2).
//!
//! Parameter validation happens at the top of every handler with
//! `icvsb-core`'s validators; everything below that is a typed `Result`
//! that only becomes a status code through [`crate::error::AppError`].

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use icvsb_client::{BenchmarkedRequestClient, BrcConfig, ClientError};
use icvsb_core::error::ValidationError;
use icvsb_core::types::{BenchmarkKey, Service, Severity};
use icvsb_core::validators::{
    format_http_date, validate_cron_line, validate_http_date, validate_integer, validate_positive_float, validate_uri,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

const LANDING_PAGE: &str = include_str!("../static/index.html");

/// `GET /` — the static landing page (spec §6.2; the real front-end is a
/// separate external collaborator, this is a standalone placeholder).
pub async fn index() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

/// `GET /health` — basic liveness check (spec §11).
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "healthy"})))
}

/// `GET /ready` — readiness check (spec §11). The registry and client are
/// constructed before the listener binds, so reachability here implies
/// both are usable.
pub async fn ready_check(State(_state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ready"})))
}

#[derive(Debug, Deserialize)]
pub struct CreateBenchmarkRequest {
    service: String,
    dataset: Vec<String>,
    #[serde(default = "default_max_labels")]
    max_labels: u32,
    #[serde(default = "default_min_confidence")]
    min_confidence: f64,
    #[serde(default = "default_delta_labels")]
    delta_labels: u32,
    #[serde(default = "default_delta_confidence")]
    delta_confidence: f64,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    expected_labels: Vec<String>,
    #[serde(default = "default_trigger_on_schedule")]
    trigger_on_schedule: Option<String>,
    #[serde(default)]
    trigger_on_failcount: u32,
    #[serde(default)]
    benchmark_callback_uri: Option<String>,
    #[serde(default)]
    warning_callback_uri: Option<String>,
    #[serde(default = "default_true")]
    autobenchmark: bool,
}

fn default_max_labels() -> u32 {
    100
}
fn default_min_confidence() -> f64 {
    0.50
}
fn default_delta_labels() -> u32 {
    5
}
fn default_delta_confidence() -> f64 {
    0.01
}
fn default_trigger_on_schedule() -> Option<String> {
    Some("0 0 * * 0".to_string())
}
fn default_true() -> bool {
    true
}

/// `POST /benchmark` — creates a new BRC (spec §6.2, §4.4 config table).
///
/// The handler inserts the BRC into the registry synchronously before
/// returning `201`, then kicks off the first `benchmark()` on a detached
/// task if `autobenchmark` (spec §9: "background persistence ... becomes
/// explicit").
pub async fn create_benchmark(
    State(state): State<AppState>,
    Json(req): Json<CreateBenchmarkRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let service = Service::from_str(&req.service)?;

    if req.dataset.is_empty() {
        return Err(AppError::bad_request("dataset must contain at least one URI"));
    }
    for uri in &req.dataset {
        validate_uri(uri)?;
    }

    if !(0.0..=1.0).contains(&req.min_confidence) {
        return Err(ValidationError::NotPositiveFloat(req.min_confidence.to_string()).into());
    }
    if !(0.0..=1.0).contains(&req.delta_confidence) {
        return Err(ValidationError::NotPositiveFloat(req.delta_confidence.to_string()).into());
    }
    // max_labels must be a positive float by the same rule the config docs
    // apply to every other numeric knob (spec §4.4).
    validate_positive_float(&req.max_labels.to_string())?;
    validate_integer(&req.delta_labels.to_string())?;
    validate_integer(&req.trigger_on_failcount.to_string())?;

    let severity = match &req.severity {
        Some(s) => Severity::from_str(s)?,
        None => Severity::default(),
    };
    if severity == Severity::Warning && req.warning_callback_uri.is_none() {
        return Err(ValidationError::MissingWarningCallback.into());
    }

    if let Some(cron_expr) = &req.trigger_on_schedule {
        validate_cron_line(cron_expr)?;
    }

    let config = BrcConfig {
        service,
        max_labels: req.max_labels,
        min_confidence: req.min_confidence,
        delta_labels: req.delta_labels,
        delta_confidence: req.delta_confidence,
        severity,
        trigger_on_schedule: req.trigger_on_schedule,
        dataset: req.dataset.clone(),
        expected_labels: req.expected_labels.into_iter().map(|s| s.to_lowercase()).collect(),
        warning_callback_uri: req.warning_callback_uri,
        benchmark_callback_uri: req.benchmark_callback_uri,
        fail_count_threshold: req.trigger_on_failcount,
    };

    let id = state.registry.next_id();
    let brc = Arc::new(BenchmarkedRequestClient::new(id, Utc::now(), config, state.client.clone()));
    state.registry.insert(brc.clone());

    if req.autobenchmark {
        let dataset = req.dataset;
        tokio::spawn(async move {
            if let Err(err) = brc.benchmark(&dataset).await {
                tracing::error!(brc_id = brc.id, %err, "initial benchmark failed");
            }
        });
    }

    info!(brc_id = id, service = %service, "created benchmarked request client");
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

#[derive(Debug, Serialize)]
struct BrcConfigView {
    service: String,
    max_labels: u32,
    min_confidence: f64,
    delta_labels: u32,
    delta_confidence: f64,
    severity: String,
    expected_labels: Vec<String>,
    trigger_on_schedule: Option<String>,
    trigger_on_failcount: u32,
    benchmark_callback_uri: Option<String>,
    warning_callback_uri: Option<String>,
}

impl From<&BrcConfig> for BrcConfigView {
    fn from(c: &BrcConfig) -> Self {
        Self {
            service: c.service.to_string(),
            max_labels: c.max_labels,
            min_confidence: c.min_confidence,
            delta_labels: c.delta_labels,
            delta_confidence: c.delta_confidence,
            severity: c.severity.to_string(),
            expected_labels: c.expected_labels.clone(),
            trigger_on_schedule: c.trigger_on_schedule.clone(),
            trigger_on_failcount: c.fail_count_threshold,
            benchmark_callback_uri: c.benchmark_callback_uri.clone(),
            warning_callback_uri: c.warning_callback_uri.clone(),
        }
    }
}

fn resolve_brc(state: &AppState, id: i64) -> Result<Arc<BenchmarkedRequestClient>, AppError> {
    state
        .registry
        .get(id)
        .ok_or(ClientError::UnknownBrc(id))
        .map_err(AppError::from)
}

/// `GET /benchmark/:id` — BRC introspection (spec §6.2).
pub async fn get_benchmark(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let brc = resolve_brc(&state, id)?;

    Ok(Json(json!({
        "id": brc.id,
        "service": brc.config().service.to_string(),
        "created_at": format_http_date(brc.created_at),
        "current_key_id": brc.current_key().map(|k| k.id),
        "is_benchmarking": brc.benchmarking(),
        "invalid_state_count": brc.invalid_state_count(),
        "last_benchmark_time": brc.last_benchmark_time().map(format_http_date),
        "benchmark_count": brc.benchmark_count(),
        "config": BrcConfigView::from(brc.config()),
        "benchmark_dataset": brc.config().dataset,
    })))
}

/// `GET /benchmark/:id/key` — redirects to the BRC's current key (spec §6.2).
pub async fn get_benchmark_key_redirect(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Redirect, AppError> {
    let brc = resolve_brc(&state, id)?;
    let key = brc.current_key().ok_or(ClientError::NotReady(id)).map_err(AppError::from)?;
    Ok(Redirect::to(&format!("/key/{}", key.id)))
}

/// `GET /benchmark/:id/log` — this BRC's mirrored log lines (spec §6.2).
pub async fn get_benchmark_log(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<String, AppError> {
    resolve_brc(&state, id)?;
    let lines = state.log_mirror.lines_for(id);
    Ok(lines
        .into_iter()
        .map(|line| format!("[{}] {}", line.level, line.message))
        .collect::<Vec<_>>()
        .join("\n"))
}

#[derive(Debug, Serialize)]
struct EncodedResponse {
    uri: String,
    success: bool,
    labels: icvsb_core::labels::LabelMap,
}

/// `GET /key/:id` — key introspection: config plus every encoded response
/// from the batch that minted it (spec §6.2).
pub async fn get_key(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let key = state.client.store().get_benchmark_key(id).await?;
    let requests = state.client.store().requests_for_batch(key.batch_request_id).await?;
    let responses = state.client.store().responses_for_batch(key.batch_request_id).await?;

    let uri_by_request: std::collections::HashMap<i64, String> =
        requests.into_iter().map(|r| (r.id, r.uri)).collect();

    let encoded: Vec<EncodedResponse> = responses
        .into_iter()
        .filter_map(|resp| {
            let uri = uri_by_request.get(&resp.request_id)?.clone();
            Some(EncodedResponse {
                uri,
                success: resp.success,
                labels: resp.labels(),
            })
        })
        .collect();

    Ok(Json(json!({
        "id": key.id,
        "service": key.service.to_string(),
        "created_at": format_http_date(key.created_at),
        "expired": key.expired,
        "delta_labels": key.delta_labels,
        "delta_confidence": key.delta_confidence,
        "max_labels": key.max_labels,
        "min_confidence": key.min_confidence,
        "expected_labels": key.expected_labels,
        "responses": encoded,
    })))
}

#[derive(Debug, Deserialize)]
pub struct LabelsQuery {
    uri: String,
}

/// One parsed `If-Match` ETag: `W/"<brc-id>[;<key-id>]"` (spec §6.2).
struct ParsedEtag {
    brc_id: i64,
    key_id: Option<i64>,
}

fn parse_if_match(raw: &str) -> Result<Vec<ParsedEtag>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(parse_one_etag)
        .collect()
}

fn parse_one_etag(tag: &str) -> Result<ParsedEtag, AppError> {
    let inner = tag
        .strip_prefix("W/\"")
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| AppError::bad_request(format!("malformed weak ETag: {tag}")))?;

    let mut parts = inner.splitn(2, ';');
    let brc_id: i64 = parts
        .next()
        .unwrap_or_default()
        .parse()
        .map_err(|_| AppError::bad_request(format!("malformed ETag brc id: {tag}")))?;
    let key_id = match parts.next() {
        Some(raw) => Some(
            raw.parse::<i64>()
                .map_err(|_| AppError::bad_request(format!("malformed ETag key id: {tag}")))?,
        ),
        None => None,
    };

    Ok(ParsedEtag { brc_id, key_id })
}

async fn resolve_supplied_key(
    state: &AppState,
    brc: &BenchmarkedRequestClient,
    tag: &ParsedEtag,
    if_unmodified_since: Option<&str>,
) -> Result<BenchmarkKey, AppError> {
    if let Some(key_id) = tag.key_id {
        return Ok(state.client.store().get_benchmark_key(key_id).await?);
    }

    let raw = if_unmodified_since.ok_or_else(|| {
        AppError::bad_request("If-Unmodified-Since is required when an ETag omits a key id")
    })?;
    let cutoff: DateTime<Utc> = validate_http_date(raw)?;
    brc.key_as_of(cutoff)
        .ok_or_else(|| AppError::bad_request("no key exists at or before If-Unmodified-Since"))
}

/// `GET /labels?uri=...` — the conditional labeling endpoint (spec §6.2).
///
/// Walks the `If-Match` ETags in order, calling [`BenchmarkedRequestClient::send_uri_with_key`]
/// for each, and stops at the first call that is error-free or is the last
/// ETag, shaping the final status code from that call's outcome.
pub async fn get_labels(
    State(state): State<AppState>,
    Query(query): Query<LabelsQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    validate_uri(&query.uri)?;

    let if_match = headers
        .get("if-match")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::bad_request("If-Match is required"))?;
    let if_unmodified_since = headers.get("if-unmodified-since").and_then(|v| v.to_str().ok());

    let tags = parse_if_match(if_match)?;
    if tags.is_empty() {
        return Err(AppError::bad_request("If-Match must contain at least one ETag"));
    }

    let mut outcome = None;
    for (idx, tag) in tags.iter().enumerate() {
        let brc = resolve_brc(&state, tag.brc_id)?;
        let key = resolve_supplied_key(&state, &brc, tag, if_unmodified_since).await?;
        let result = brc.send_uri_with_key(&query.uri, &key).await?;

        let is_last = idx + 1 == tags.len();
        let error_free = !result.has_error();
        if error_free || is_last {
            outcome = Some((brc, key, result));
            break;
        }
    }

    let (brc, key, result) = outcome.expect("tags is non-empty, loop always assigns on last iteration");

    let etag_value = format!("W/\"{};{}\"", brc.id, key.id);
    let last_modified = brc
        .current_key()
        .map(|k| format_http_date(k.created_at))
        .unwrap_or_else(|| format_http_date(key.created_at));

    if let Some(key_error) = &result.key_error {
        return Ok(precondition_failed(
            &etag_value,
            &last_modified,
            key_error.code(),
            key_error.to_string(),
        ));
    }
    if let Some(response_error) = &result.response_error {
        return Ok(precondition_failed(
            &etag_value,
            &last_modified,
            response_error.code(),
            response_error.to_string(),
        ));
    }

    let response = result.response.expect("error-free outcome always carries a response");
    if !response.success {
        let body = response
            .body
            .as_deref()
            .and_then(|b| serde_json::from_slice::<serde_json::Value>(b).ok())
            .unwrap_or_else(|| json!({ "service_error": "unknown" }));
        return Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            [("etag", etag_value), ("last-modified", last_modified)],
            Json(body),
        )
            .into_response());
    }

    let labels = result.labels.unwrap_or_default();
    let cache_key = (brc.id, key.id, query.uri.clone());
    let body_value = json!({ "labels": labels });

    let mut cache = state.response_cache.lock();
    let is_repeat = cache.get(&cache_key) == Some(&body_value);
    cache.put(cache_key, body_value.clone());
    drop(cache);

    if is_repeat {
        Ok((
            StatusCode::NOT_MODIFIED,
            [("etag", etag_value), ("last-modified", last_modified)],
        )
            .into_response())
    } else {
        Ok((
            StatusCode::OK,
            [("etag", etag_value), ("last-modified", last_modified)],
            Json(body_value),
        )
            .into_response())
    }
}

/// `error` is the stable reason code (spec §4.3, §8 scenario 5: the body
/// must *contain* e.g. `EXPECTED_LABELS_MISMATCH`); `detail` is the prose
/// description of the same failure.
fn precondition_failed(etag: &str, last_modified: &str, error: &'static str, detail: String) -> Response {
    (
        StatusCode::PRECONDITION_FAILED,
        [("etag", etag.to_string()), ("last-modified", last_modified.to_string())],
        Json(json!({ "error": error, "detail": detail })),
    )
        .into_response()
}
