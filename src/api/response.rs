// API response utility functions module

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde_json::{json, Value};

use crate::dispatch::DispatchError;
use crate::http::json_response;
use crate::logger;

/// Encoded function result, status 200
pub fn success(value: &Value) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, value)
}

/// `{"ok": false, "error": ..}` envelope used by every dispatcher failure
pub fn error(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &json!({"ok": false, "error": message}))
}

/// Map a dispatch failure to 404 or 500, logging its class
pub fn dispatch_error(err: &DispatchError) -> Response<Full<Bytes>> {
    let message = err.to_string();
    logger::log_api_error(err.kind(), &message);
    error(err.status(), &message)
}
