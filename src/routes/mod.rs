//! HTTP routes for the relay

pub mod api;
pub mod health;

pub use api::{handle_api_request, ApiReply, RetCode};
pub use health::{health_check, version_info};

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::HeaderValue;
use hyper::{Response, StatusCode};
use serde::Serialize;

/// Serialize `body` as the JSON response body
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let (status, json) = match serde_json::to_vec(body) {
        Ok(json) => (status, json),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            br#"{"error":"Failed to serialize response"}"#.to_vec(),
        ),
    };

    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        "Content-Type",
        HeaderValue::from_static("application/json;charset=utf-8"),
    );
    headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    response
}

/// Bare status response with the canonical reason as body
pub fn status_response(status: StatusCode) -> Response<Full<Bytes>> {
    let reason = status.canonical_reason().unwrap_or("");
    let mut response = Response::new(Full::new(Bytes::from(reason)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert("Content-Type", HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}
