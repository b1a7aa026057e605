// API module entry
// Dispatcher routes: `<prefix>/<module/path>/<function>?<query>`

mod response;

use http_body_util::Full;
use percent_encoding::percent_decode_str;
use hyper::body::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;

use crate::config::AppState;
use crate::dispatch::Kwargs;
use crate::http;
use crate::logger;

pub use response::{dispatch_error, error, success};

/// Path below the API prefix, without surrounding slashes.
/// `None` when the request is not under the prefix.
pub fn function_path<'a>(prefix: &str, path: &'a str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    let rest = path.strip_prefix(prefix)?;
    if !prefix.is_empty() && !(rest.is_empty() || rest.starts_with('/')) {
        return None;
    }
    Some(rest.trim_matches('/'))
}

/// Resolve and call one allow-listed function
///
/// Functions are synchronous and may be slow, so the call runs on the
/// blocking pool.
pub async fn handle_api_call<B>(req: Request<B>, state: Arc<AppState>) -> Response<Full<Bytes>> {
    if !matches!(*req.method(), Method::GET | Method::HEAD) {
        return http::build_405_response("GET, HEAD, OPTIONS");
    }

    let Some(path) = function_path(&state.config.api.prefix, req.uri().path()) else {
        return http::build_404_response();
    };
    let Ok(path) = percent_decode_str(path).decode_utf8() else {
        return error(
            StatusCode::NOT_FOUND,
            &format!("URL path {path} is not valid UTF-8"),
        );
    };
    let path = path.into_owned();
    let kwargs = Kwargs::from_query(req.uri().query());

    let result =
        tokio::task::spawn_blocking(move || state.dispatcher.call(&path, kwargs)).await;

    match result {
        Ok(Ok(value)) => success(&value),
        Ok(Err(err)) => dispatch_error(&err),
        Err(e) => {
            logger::log_error(&format!("API call task failed: {e}"));
            error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}
