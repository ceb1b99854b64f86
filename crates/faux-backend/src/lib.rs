//! A downstream service whose answers are steered by the request body.
//!
//! Every method and path is accepted. The response status is taken from the
//! body field `faux_backend_force_status_code` (a number or a numeric string)
//! and defaults to `200`; the response body is always
//! `{"msg": "Event received"}`.
//!
//! Every request is kept so tests can inspect exactly what was forwarded.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    Json, Router,
};
use relay::forced_status;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// One request as the faux backend saw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceivedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

/// Shared log of received requests.
#[derive(Debug, Clone, Default)]
pub struct FauxState {
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
}

impl FauxState {
    /// Returns every request received so far, oldest first.
    pub fn received(&self) -> Vec<ReceivedRequest> {
        self.received
            .lock()
            .map(|received| received.clone())
            .unwrap_or_default()
    }
}

/// Builds the faux backend router over `state`.
pub fn router(state: FauxState) -> Router {
    Router::new().fallback(answer).with_state(state)
}

async fn answer(
    State(state): State<FauxState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let body = String::from_utf8_lossy(&body).into_owned();
    let requested = forced_status(Some(&body)).unwrap_or(200);
    let status = StatusCode::from_u16(requested).unwrap_or_else(|_| {
        warn!(requested, "Forced status is not a valid HTTP status, answering 200");
        StatusCode::OK
    });

    info!(%method, path = uri.path(), status = status.as_u16(), "Faux backend received request");

    if let Ok(mut received) = state.received.lock() {
        received.push(ReceivedRequest {
            method: method.to_string(),
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            content_type: headers
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
            body,
        });
    }

    (status, Json(serde_json::json!({ "msg": "Event received" })))
}

/// A faux backend serving on a local port.
pub struct FauxBackend {
    addr: SocketAddr,
    state: FauxState,
    handle: JoinHandle<()>,
}

impl FauxBackend {
    /// Binds `addr` (use port `0` for an ephemeral port) and starts serving.
    pub async fn spawn(addr: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let state = FauxState::default();
        let app = router(state.clone());

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                warn!(error = %e, "Faux backend stopped");
            }
        });

        info!(%addr, "Faux backend listening");
        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    /// The bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL for the relay's backend invoker.
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Every request received so far.
    pub fn received(&self) -> Vec<ReceivedRequest> {
        self.state.received()
    }
}

impl Drop for FauxBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
