//! HTTP adapter for the relay's [`BackendInvoker`] port.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** URL resolution, the HTTP client, and the mapping of
//! transport failures onto [`BackendError`] live here. The stages see only
//! [`relay::BackendInvoker`].
//!
//! ## Request Shape
//!
//! The relative request path is joined onto the configured base URL, which is
//! normalised to end in `/` so that a base such as `https://host/api` keeps
//! its `/api` segment. Query parameters, when present, replace any query the
//! base URL carries. Only the inbound `Content-Type` header is forwarded.
//!
//! Exactly one attempt is made per call and redirects are not followed, so a
//! `3xx` answer is recorded as the backend's own response.

use std::time::Duration;

use async_trait::async_trait;
use relay::{BackendError, BackendInvoker, BackendRequest, BackendResponse};
use reqwest::{redirect, Client, Method, Url};
use thiserror::Error;
use tracing::{debug, warn};

/// Failure to construct an [`HttpBackendInvoker`].
#[derive(Debug, Error)]
pub enum BackendSetupError {
    /// The base URL is not an absolute URL.
    #[error("Invalid backend base URL '{url}': {message}")]
    InvalidBaseUrl {
        /// The configured value.
        url: String,
        /// Parser message.
        message: String,
    },

    /// The HTTP client could not be initialised.
    #[error("Failed to build the backend HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Forwards [`BackendRequest`]s to a base URL with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpBackendInvoker {
    client: Client,
    base_url: Url,
}

impl HttpBackendInvoker {
    /// Creates an invoker for `base_url` whose requests give up after
    /// `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendSetupError> {
        let base_url = normalise_base_url(base_url)?;
        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self { client, base_url })
    }

    /// The normalised base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

fn normalise_base_url(raw: &str) -> Result<Url, BackendSetupError> {
    let mut url = Url::parse(raw).map_err(|e| BackendSetupError::InvalidBaseUrl {
        url: raw.to_string(),
        message: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(BackendSetupError::InvalidBaseUrl {
            url: raw.to_string(),
            message: "URL cannot be used as a base".to_string(),
        });
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Resolves `request` against `base`.
pub fn resolve_url(base: &Url, request: &BackendRequest) -> Result<Url, BackendError> {
    let mut url = base.join(&request.path).map_err(|e| BackendError::InvalidUrl {
        path: request.path.clone(),
        message: e.to_string(),
    })?;
    if let Some(query) = request.query.as_ref().filter(|query| !query.is_empty()) {
        url.set_query(None);
        url.query_pairs_mut().extend_pairs(query.iter());
    }
    Ok(url)
}

fn classify(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Transport {
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl BackendInvoker for HttpBackendInvoker {
    async fn forward(&self, request: &BackendRequest) -> Result<BackendResponse, BackendError> {
        let url = resolve_url(&self.base_url, request)?;
        let method =
            Method::from_bytes(request.method.as_bytes()).map_err(|_| BackendError::InvalidMethod {
                method: request.method.clone(),
            })?;

        debug!(%method, url = %url, "Forwarding request to backend");

        let mut outbound = self.client.request(method, url);
        if let Some(content_type) = &request.content_type {
            outbound = outbound.header(reqwest::header::CONTENT_TYPE, content_type);
        }
        if let Some(body) = &request.body {
            outbound = outbound.body(body.clone());
        }

        let response = outbound.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        // The status is the backend's answer; a body cut off after it
        // arrived does not turn the call into "no response".
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(status, error = %e, "Backend response body could not be read");
                String::new()
            }
        };
        Ok(BackendResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay::QueryParameters;

    fn request(path: &str, query: Option<&[(&str, &str)]>) -> BackendRequest {
        BackendRequest {
            method: "POST".to_string(),
            path: path.to_string(),
            query: query.map(|pairs| {
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<QueryParameters>()
            }),
            body: None,
            content_type: None,
        }
    }

    #[test]
    fn base_path_is_kept_when_joining() {
        let base = normalise_base_url("https://backend.example/api").unwrap();
        assert_eq!(base.as_str(), "https://backend.example/api/");

        let url = resolve_url(&base, &request("health", None)).unwrap();
        assert_eq!(url.as_str(), "https://backend.example/api/health");
    }

    #[test]
    fn empty_path_resolves_to_the_base() {
        let base = normalise_base_url("http://127.0.0.1:9000/").unwrap();
        let url = resolve_url(&base, &request("", None)).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/");
    }

    #[test]
    fn query_parameters_replace_the_base_query() {
        let base = normalise_base_url("http://host/hooks/?token=abc").unwrap();

        let kept = resolve_url(&base, &request("a", None)).unwrap();
        assert_eq!(kept.query(), None);

        let replaced = resolve_url(&base, &request("a", Some(&[("hello", "world")]))).unwrap();
        assert_eq!(replaced.as_str(), "http://host/hooks/a?hello=world");
    }

    #[test]
    fn empty_query_map_adds_no_query_string() {
        let base = normalise_base_url("http://host/").unwrap();
        let url = resolve_url(&base, &request("a", Some(&[]))).unwrap();
        assert_eq!(url.as_str(), "http://host/a");
    }

    #[test]
    fn relative_base_url_is_rejected() {
        assert!(matches!(
            normalise_base_url("backend/api"),
            Err(BackendSetupError::InvalidBaseUrl { .. })
        ));
    }

    #[tokio::test]
    async fn invalid_method_is_not_sent() {
        let invoker =
            HttpBackendInvoker::new("http://127.0.0.1:9/", Duration::from_millis(100)).unwrap();
        let mut bad = request("x", None);
        bad.method = "NOT A METHOD".to_string();

        let err = invoker.forward(&bad).await.unwrap_err();
        assert!(matches!(err, BackendError::InvalidMethod { .. }));
    }
}
