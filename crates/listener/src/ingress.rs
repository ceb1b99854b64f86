use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use relay::{EventRequest, Headers, QueryParameters};
use stages::{IngestResponse, IngestionHandler};
use tracing::{debug, warn};

/// Builds the ingress router. Every method and path reaches the handler.
pub fn ingress_router(handler: Arc<IngestionHandler>) -> Router {
    Router::new().fallback(ingest).with_state(handler)
}

async fn ingest(
    State(handler): State<Arc<IngestionHandler>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = event_request(&method, &uri, &headers, &body);
    debug!(%method, path = %request.path, "Webhook received");
    into_response(handler.handle(request).await)
}

/// Converts an HTTP request into the relay's [`EventRequest`].
///
/// Repeated headers are joined with `,`. The query string becomes a map, or
/// `None` when empty; an empty body becomes `None`.
pub fn event_request(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
) -> EventRequest {
    let mut collapsed = Headers::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        match collapsed.get_mut(name.as_str()) {
            Some(existing) => {
                existing.push(',');
                existing.push_str(&value);
            }
            None => {
                collapsed.insert(name.as_str().to_string(), value.into_owned());
            }
        }
    }

    EventRequest {
        path: uri.path().to_string(),
        headers: collapsed,
        body: (!body.is_empty()).then(|| String::from_utf8_lossy(body).into_owned()),
        http_method: method.as_str().to_string(),
        query_string_parameters: query_parameters(uri),
    }
}

fn query_parameters(uri: &Uri) -> Option<QueryParameters> {
    uri.query()?;
    match Query::<BTreeMap<String, String>>::try_from_uri(uri) {
        Ok(Query(params)) if params.is_empty() => None,
        Ok(Query(params)) => Some(params),
        Err(e) => {
            warn!(query = uri.query(), error = %e, "Unparseable query string dropped");
            None
        }
    }
}

fn into_response(answer: IngestResponse) -> Response {
    let status =
        StatusCode::from_u16(answer.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, Json(answer.body)).into_response();
    for (name, value) in &answer.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(raw: &str) -> Uri {
        raw.parse().unwrap()
    }

    #[test]
    fn repeated_headers_are_joined() {
        let mut headers = HeaderMap::new();
        headers.append("x-tag", HeaderValue::from_static("a"));
        headers.append("x-tag", HeaderValue::from_static("b"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let request = event_request(&Method::POST, &uri("/health"), &headers, b"{}");

        assert_eq!(request.headers["x-tag"], "a,b");
        assert_eq!(request.header("Content-Type"), Some("application/json"));
    }

    #[test]
    fn query_string_becomes_a_decoded_map() {
        let request = event_request(
            &Method::GET,
            &uri("/hook?hello=world&greeting=hi%20there"),
            &HeaderMap::new(),
            b"",
        );

        let query = request.query_string_parameters.unwrap();
        assert_eq!(query["hello"], "world");
        assert_eq!(query["greeting"], "hi there");
        assert!(request.body.is_none());
        assert_eq!(request.http_method, "GET");
    }

    #[test]
    fn missing_or_empty_query_is_none() {
        let plain = event_request(&Method::POST, &uri("/a"), &HeaderMap::new(), b"x");
        let empty = event_request(&Method::POST, &uri("/a?"), &HeaderMap::new(), b"x");

        assert!(plain.query_string_parameters.is_none());
        assert!(empty.query_string_parameters.is_none());
        assert_eq!(plain.body.as_deref(), Some("x"));
    }
}
