//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: preflight and body size checks,
//! route matching, CORS and server headers, and the access log line.

use crate::api;
use crate::auth::{self, AuthenticatedUser};
use crate::config::AppState;
use crate::http;
use crate::logger::{self, AccessLogEntry};
use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::header::{self, HeaderValue};
use hyper::{Method, Request, Response, StatusCode, Version};
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

pub const HEALTH_PATH: &str = "/healthz";
pub const TOKEN_PATH: &str = "/auth/token";
pub const LOGOUT_PATH: &str = "/auth/logout";
/// Guarded probe clients use to check their access token
pub const PRIVATE_TEST_PATH: &str = "/test";

/// Main entry point for HTTP request handling
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let started = Instant::now();
    let entry = state
        .config
        .logging
        .access_log
        .then(|| access_entry(&req, peer_addr));
    let origin = req.headers().get(header::ORIGIN).cloned();

    let mut resp = route_request(req, &state).await;

    if state.config.http.enable_cors {
        http::add_cors_headers(&mut resp, origin.as_ref());
    }
    if let Ok(server) = HeaderValue::from_str(&state.config.http.server_name) {
        resp.headers_mut().insert(header::SERVER, server);
    }

    if let Some(mut entry) = entry {
        entry.status = resp.status().as_u16();
        entry.body_bytes = resp
            .body()
            .size_hint()
            .exact()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0);
        entry.remote_user = resp
            .extensions()
            .get::<AuthenticatedUser>()
            .map(|user| user.0.clone());
        entry.elapsed = started.elapsed();
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(resp)
}

fn access_entry<B>(req: &Request<B>, peer_addr: SocketAddr) -> AccessLogEntry {
    let header_string = |name: header::HeaderName| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };
    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.query = req.uri().query().map(ToString::to_string);
    entry.http_version = match req.version() {
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2",
        _ => "1.1",
    }
    .to_string();
    entry.referer = header_string(header::REFERER);
    entry.user_agent = header_string(header::USER_AGENT);
    entry
}

/// Validate Content-Length header and return 413 if exceeded
fn check_body_size<B>(req: &Request<B>, max_body_size: u64) -> Option<Response<Full<Bytes>>> {
    let content_length = req.headers().get(header::CONTENT_LENGTH)?;
    let Ok(size_str) = content_length.to_str() else {
        logger::log_warning("Content-Length header contains non-ASCII characters");
        return None;
    };
    match size_str.parse::<u64>() {
        Ok(size) if size > max_body_size => {
            logger::log_warning(&format!(
                "Request body too large: {size} bytes (max: {max_body_size})"
            ));
            Some(http::build_413_response())
        }
        Err(_) => {
            logger::log_warning(&format!(
                "Invalid Content-Length value: '{size_str}', skipping size check"
            ));
            None
        }
        _ => None,
    }
}

/// Route request based on method and path
async fn route_request<B>(req: Request<B>, state: &Arc<AppState>) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    if req.method() == Method::OPTIONS {
        return http::build_options_response(
            state.config.http.enable_cors,
            req.headers().get(header::ORIGIN),
        );
    }
    if let Some(resp) = check_body_size(&req, state.config.http.max_body_size) {
        return resp;
    }

    let path = req.uri().path().to_string();
    let method = req.method().clone();

    match path.as_str() {
        HEALTH_PATH => match method {
            Method::GET | Method::HEAD => http::build_health_response(),
            _ => http::build_405_response("GET, HEAD"),
        },
        TOKEN_PATH => match method {
            Method::POST => auth::handle_token(req, state).await,
            _ => http::build_405_response("POST"),
        },
        LOGOUT_PATH => match method {
            Method::POST => auth::handle_logout(),
            _ => http::build_405_response("POST"),
        },
        PRIVATE_TEST_PATH | "/test/" => auth::login_required(req, state, |req| async move {
            private_test(&req)
        })
        .await,
        p if api::function_path(&state.config.api.prefix, p).is_some() => {
            if state.config.api.require_auth {
                auth::login_required(req, state, |req| {
                    api::handle_api_call(req, Arc::clone(state))
                })
                .await
            } else {
                api::handle_api_call(req, Arc::clone(state)).await
            }
        }
        _ => http::build_404_response(),
    }
}

fn private_test<B>(req: &Request<B>) -> Response<Full<Bytes>> {
    let user = req
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|user| user.0.as_str());
    http::json_response(StatusCode::OK, &json!({"message": "all ok", "user": user}))
}
