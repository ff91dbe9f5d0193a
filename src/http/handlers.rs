use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::error::{Result, ServiceError};
use crate::types::{Changes, Comment, Record, RecordInput, Timestamp};

use super::AppState;

// --- GET /health ---

pub(crate) async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// --- GET /talks/{key} ---

pub(crate) async fn get_item(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Record>> {
    state
        .service
        .get(&key)
        .map(Json)
        .ok_or_else(|| ServiceError::item_not_found(&key))
}

// --- PUT /talks/{key} ---

pub(crate) async fn put_item(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<StatusCode> {
    let input = RecordInput::from_json(&read_body(body)?)?;
    state.service.put(&key, input);
    Ok(StatusCode::NO_CONTENT)
}

// --- DELETE /talks/{key} ---

pub(crate) async fn delete_item(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> StatusCode {
    state.service.delete(&key);
    StatusCode::NO_CONTENT
}

// --- POST /talks/{key}/comments ---

pub(crate) async fn post_comment(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<StatusCode> {
    let comment = Comment::from_json(&read_body(body)?)?;
    state.service.add_comment(&key, comment)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- GET /talks?changesSince=N ---

#[derive(Deserialize)]
pub(crate) struct ListParams {
    #[serde(rename = "changesSince")]
    changes_since: Option<String>,
}

pub(crate) async fn list_items(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Changes>> {
    let Some(raw) = params.changes_since else {
        return Ok(Json(state.service.list()));
    };

    let watermark = Timestamp::parse_watermark(&raw)?;
    Ok(Json(state.service.changes_since(watermark).await))
}

/// Failing to read the body is reported like unparseable JSON.
fn read_body(body: std::result::Result<Bytes, BytesRejection>) -> Result<Bytes> {
    body.map_err(|e| ServiceError::MalformedBody(e.body_text()))
}
