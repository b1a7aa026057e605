//! Bearer token route guard
//!
//! Wraps a handler: the handler only runs when the `Authorization` header
//! carries a valid access token, and it finds the user in the request
//! extensions as [`AuthenticatedUser`].

use std::future::Future;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::AUTHORIZATION;
use hyper::{HeaderMap, Request, Response, StatusCode};
use serde_json::json;
use thiserror::Error;

use super::token::TokenService;
use crate::config::AppState;
use crate::http::response::json_response;
use crate::logger;

/// User name resolved from a verified access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("a valid token is missing")]
    MissingToken,

    /// `null`/`undefined` sent by a client whose token store is empty
    #[error("Token is \"{0}\"")]
    UninitializedToken(String),

    #[error("Token is not valid")]
    InvalidToken,
}

/// Resolve the user from the last whitespace-separated word of `Authorization`
pub fn authenticate(headers: &HeaderMap, tokens: &TokenService) -> Result<String, AuthFailure> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or(AuthFailure::MissingToken)?
        .to_str()
        .map_err(|_| AuthFailure::InvalidToken)?;
    let token = header
        .split_whitespace()
        .last()
        .ok_or(AuthFailure::InvalidToken)?;

    if token == "null" || token == "undefined" {
        return Err(AuthFailure::UninitializedToken(token.to_string()));
    }

    tokens
        .decode(token)
        .map(|claims| claims.user)
        .ok_or(AuthFailure::InvalidToken)
}

/// Run `handler` only for authenticated requests, otherwise answer 401
pub async fn login_required<B, F, Fut>(
    mut req: Request<B>,
    state: &AppState,
    handler: F,
) -> Response<Full<Bytes>>
where
    F: FnOnce(Request<B>) -> Fut,
    Fut: Future<Output = Response<Full<Bytes>>>,
{
    match authenticate(req.headers(), &state.tokens) {
        Ok(user) => {
            let user = AuthenticatedUser(user);
            req.extensions_mut().insert(user.clone());
            let mut resp = handler(req).await;
            // Lets the access log name the user
            resp.extensions_mut().insert(user);
            resp
        }
        Err(failure) => {
            // Empty client token stores are routine, keep them out of the warnings
            if matches!(failure, AuthFailure::UninitializedToken(_)) {
                logger::log_debug(&format!("[AUTH] {failure}"));
            } else {
                logger::log_auth_failure(&failure.to_string());
            }
            json_response(
                StatusCode::UNAUTHORIZED,
                &json!({
                    "ok": false,
                    "message": format!("Failed authentication: {failure}"),
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::tests::auth_config;
    use hyper::header::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_valid_bearer_token() {
        let tokens = TokenService::new(&auth_config("1.0")).unwrap();
        let token = tokens
            .issue_access("aca", chrono::Utc::now().timestamp())
            .unwrap();
        assert_eq!(
            authenticate(&headers(&format!("Bearer {token}")), &tokens),
            Ok("aca".to_string())
        );
        // Scheme word is optional, only the last word counts
        assert_eq!(authenticate(&headers(&token), &tokens), Ok("aca".to_string()));
    }

    #[test]
    fn test_missing_header() {
        let tokens = TokenService::new(&auth_config("1.0")).unwrap();
        assert_eq!(
            authenticate(&HeaderMap::new(), &tokens),
            Err(AuthFailure::MissingToken)
        );
    }

    #[test]
    fn test_uninitialized_sentinels() {
        let tokens = TokenService::new(&auth_config("1.0")).unwrap();
        for sentinel in ["null", "undefined"] {
            let err = authenticate(&headers(&format!("Bearer {sentinel}")), &tokens).unwrap_err();
            assert_eq!(err, AuthFailure::UninitializedToken(sentinel.to_string()));
            assert_eq!(err.to_string(), format!("Token is \"{sentinel}\""));
        }
    }

    #[test]
    fn test_garbage_token() {
        let tokens = TokenService::new(&auth_config("1.0")).unwrap();
        assert_eq!(
            authenticate(&headers("Bearer some_garbage_here"), &tokens),
            Err(AuthFailure::InvalidToken)
        );
        assert_eq!(
            authenticate(&headers("Bearer "), &tokens),
            Err(AuthFailure::InvalidToken)
        );
    }
}
