use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use relay::{MessageId, RecordReader};
use serde_json::json;
use tracing::error;

/// Builds the admin router: `GET /healthz` and `GET /records/:id`.
pub fn admin_router(records: Arc<dyn RecordReader>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/records/:id", get(get_record))
        .with_state(records)
}

fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_record(
    State(records): State<Arc<dyn RecordReader>>,
    Path(id): Path<String>,
) -> Response {
    let Some(id) = MessageId::new(id) else {
        return json_error(StatusCode::BAD_REQUEST, "invalid_id", "empty message id");
    };
    match records.get(&id).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => json_error(StatusCode::NOT_FOUND, "not_found", format!("no record for {id}")),
        Err(e) => {
            error!(%id, error = %e, "Record lookup failed");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", e.to_string())
        }
    }
}
