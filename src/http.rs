//! HTTP adapter for the route table.
//!
//! Every path is forwarded to [`LightController::handle_request`]; GET and
//! POST behave the same. Parameters come from the query string and, when
//! present, a JSON object body.

use crate::controller::{LightController, Response};
use crate::error::{ControllerError, Result};
use crate::request::RequestParams;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Error wrapper mapping the controller taxonomy onto HTTP statuses.
struct HttpError(ControllerError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn router(controller: Arc<LightController>) -> Router {
    Router::new()
        .route("/*path", get(handle).post(handle))
        .with_state(controller)
}

async fn handle(
    State(controller): State<Arc<LightController>>,
    Path(path): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> std::result::Result<Json<Response>, HttpError> {
    let path = format!("/{}", path);
    let mut params = RequestParams::from_query(query);
    if !body.is_empty() {
        let json = serde_json::from_slice(&body)
            .map_err(|e| HttpError(ControllerError::validation("body", e.to_string())))?;
        params.merge_json(json).map_err(HttpError)?;
    }

    debug!("[HTTP] {}", path);
    match controller.handle_request(&path, &params).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            warn!("[HTTP] {} failed: {}", path, e);
            Err(HttpError(e))
        }
    }
}

/// Serve the router on `bind` until `shutdown` is cancelled.
pub async fn serve(
    controller: Arc<LightController>,
    bind: &str,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("[HTTP] Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(controller))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("[HTTP] Stopped");
    Ok(())
}
