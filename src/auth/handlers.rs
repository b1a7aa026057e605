//! `/auth/token` and `/auth/logout`

use cookie::Cookie;
use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::header::{self, HeaderValue};
use hyper::{HeaderMap, Request, Response, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};

use super::password::check_password;
use super::token::TokenService;
use crate::config::AppState;
use crate::http::{self, BodyError};
use crate::logger;

pub const REFRESH_COOKIE: &str = "refresh_token";
/// Value written over the refresh cookie on logout
const LOGGED_OUT: &str = "none";

#[derive(Debug, Serialize)]
struct TokenResponse<'a> {
    ok: bool,
    access_token: &'a str,
    token_type: &'static str,
    expires_in: u64,
}

/// Credentials from the JSON body; anything that is not an object of
/// strings counts as no credentials.
fn credentials(body: &[u8]) -> (Option<String>, Option<String>) {
    let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) else {
        return (None, None);
    };
    let field = |name: &str| map.get(name).and_then(Value::as_str).map(ToString::to_string);
    (field("user"), field("password"))
}

/// First `refresh_token` cookie across all `Cookie` headers
fn refresh_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == REFRESH_COOKIE)
        .map(|c| c.value().to_string())
}

fn set_refresh_cookie(resp: &mut Response<Full<Bytes>>, value: String) {
    let cookie = Cookie::build((REFRESH_COOKIE, value))
        .http_only(true)
        .secure(true)
        .path("/")
        .build();
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(v) => {
            resp.headers_mut().append(header::SET_COOKIE, v);
        }
        Err(e) => logger::log_error(&format!("Invalid Set-Cookie value: {e}")),
    }
}

/// Exchange a password or a refresh cookie for an access token
pub async fn handle_token<B>(req: Request<B>, state: &AppState) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    logger::log_debug("[AUTH] Getting token");
    let now = chrono::Utc::now().timestamp();
    let tokens = &state.tokens;

    let refresh = refresh_cookie(req.headers()).and_then(|token| tokens.decode(&token));

    let limit = usize::try_from(state.config.http.max_body_size).unwrap_or(usize::MAX);
    let body = match http::read_body(req.into_body(), limit).await {
        Ok(body) => body,
        Err(BodyError::TooLarge(_)) => return http::build_413_response(),
        Err(e) => {
            logger::log_warning(&e.to_string());
            Bytes::new()
        }
    };
    let (user, password) = credentials(&body);

    let mut ok = refresh.is_some();
    if let (Some(user), Some(password)) = (&user, &password) {
        match check_password(&state.config.auth.passwords, user, password).await {
            Ok(valid) => ok |= valid,
            // A valid cookie is enough on its own
            Err(e) if refresh.is_some() => logger::log_warning(&e.to_string()),
            Err(e) => {
                logger::log_error(&e.to_string());
                return http::json_message(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
            }
        }
    }

    // The cookie identity wins over a freshly supplied user name
    let subject = refresh.as_ref().map(|c| c.user.clone()).or(user);
    let Some(subject) = subject.filter(|_| ok) else {
        logger::log_auth_failure("403 (forbidden)");
        return http::json_message(StatusCode::FORBIDDEN, "403 (forbidden)");
    };

    let access_token = match tokens.issue_access(&subject, now) {
        Ok(token) => token,
        Err(e) => return token_error(&e),
    };

    let rotate = match &refresh {
        Some(claims) => {
            if let Some(left) = TokenService::time_left(claims, now) {
                logger::log_refresh_time_left(left);
            }
            tokens.needs_rotation(claims, now)
        }
        None => true,
    };

    let mut resp = http::json_response(
        StatusCode::OK,
        &TokenResponse {
            ok: true,
            access_token: &access_token,
            token_type: "bearer",
            expires_in: tokens.access_validity(),
        },
    );

    if rotate {
        match tokens.issue_refresh(&subject, now) {
            Ok(token) => set_refresh_cookie(&mut resp, token),
            Err(e) => return token_error(&e),
        }
    }
    logger::log_token_issued(&subject, rotate);
    resp
}

fn token_error(error: &jsonwebtoken::errors::Error) -> Response<Full<Bytes>> {
    logger::log_error(&format!("Failed to sign token: {error}"));
    http::json_message(StatusCode::INTERNAL_SERVER_ERROR, "failed to sign token")
}

/// Overwrite the refresh cookie so the browser stops presenting it
pub fn handle_logout() -> Response<Full<Bytes>> {
    logger::log_debug("[AUTH] Logging out");
    let mut resp = http::json_response(StatusCode::OK, &json!({"ok": true}));
    set_refresh_cookie(&mut resp, LOGGED_OUT.to_string());
    resp
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::password::generate_password_hash;
    use crate::config::Config;
    use crate::dispatch::Registry;
    use http_body_util::BodyExt;
    use std::path::Path;

    pub(crate) const USER: &str = "aca";
    pub(crate) const PASSWORD: &str = "chandra";

    /// State with a password file holding `USER`/`PASSWORD`
    pub(crate) fn test_state(dir: &Path) -> AppState {
        let passwords = dir.join("passwords.json");
        std::fs::write(
            &passwords,
            json!({ USER: generate_password_hash(PASSWORD, 1000) }).to_string(),
        )
        .unwrap();
        let main = dir.join("kadi-apps.toml");
        std::fs::write(
            &main,
            format!(
                "[auth]\njwt_secret = \"test-secret\"\npasswords = \"{}\"\n",
                passwords.display()
            ),
        )
        .unwrap();
        let config = Config::load_from(main.to_str().unwrap()).unwrap();
        AppState::new(config, crate::dispatch::tests::sample_registry()).unwrap()
    }

    fn token_request(body: &str, cookie: Option<&str>) -> Request<Full<Bytes>> {
        let mut builder = Request::post("/auth/token").header("content-type", "application/json");
        if let Some(c) = cookie {
            builder = builder.header(header::COOKIE, format!("theme=dark; {REFRESH_COOKIE}={c}"));
        }
        builder.body(Full::new(Bytes::from(body.to_string()))).unwrap()
    }

    async fn body_json(resp: Response<Full<Bytes>>) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn set_cookie_value(resp: &Response<Full<Bytes>>) -> Option<String> {
        let header = resp.headers().get(header::SET_COOKIE)?.to_str().ok()?;
        let cookie = Cookie::parse(header.to_string()).ok()?;
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        Some(cookie.value().to_string())
    }

    #[tokio::test]
    async fn test_password_login_sets_cookie() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let body = json!({"user": USER, "password": PASSWORD}).to_string();

        let resp = handle_token(token_request(&body, None), &state).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let refresh = set_cookie_value(&resp).expect("refresh cookie");
        assert_eq!(state.tokens.decode(&refresh).unwrap().user, USER);

        let data = body_json(resp).await;
        assert_eq!(data["ok"], true);
        assert_eq!(data["token_type"], "bearer");
        assert_eq!(data["expires_in"], 600);
        let access = data["access_token"].as_str().unwrap();
        assert_eq!(state.tokens.decode(access).unwrap().user, USER);
    }

    #[tokio::test]
    async fn test_fresh_cookie_not_rotated() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let now = chrono::Utc::now().timestamp();
        let refresh = state.tokens.issue_refresh(USER, now).unwrap();

        let resp = handle_token(token_request("", Some(&refresh)), &state).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(body_json(resp).await["ok"], true);
    }

    #[tokio::test]
    async fn test_expiring_cookie_rotated() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let now = chrono::Utc::now().timestamp();
        let refresh = state.tokens.issue(USER, Some(3600), now).unwrap();

        let resp = handle_token(token_request("", Some(&refresh)), &state).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let rotated = set_cookie_value(&resp).expect("rotated cookie");
        assert_ne!(rotated, refresh);
    }

    #[tokio::test]
    async fn test_cookie_user_wins() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let now = chrono::Utc::now().timestamp();
        let refresh = state.tokens.issue_refresh("cookie-user", now).unwrap();
        let body = json!({"user": USER, "password": PASSWORD}).to_string();

        let resp = handle_token(token_request(&body, Some(&refresh)), &state).await;
        let data = body_json(resp).await;
        let access = data["access_token"].as_str().unwrap();
        assert_eq!(state.tokens.decode(access).unwrap().user, "cookie-user");
    }

    #[tokio::test]
    async fn test_forbidden() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let cases = [
            (json!({"user": "bad", "password": "bad"}).to_string(), None),
            (json!({"user": USER, "password": "garbage"}).to_string(), None),
            (json!({"user": "garbage", "password": PASSWORD}).to_string(), None),
            (json!({"user": USER}).to_string(), None),
            (String::new(), None),
            ("not json".to_string(), None),
            (String::new(), Some("garbage")),
        ];
        for (body, cookie) in cases {
            let resp = handle_token(token_request(&body, cookie), &state).await;
            assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{body} {cookie:?}");
            assert_eq!(
                body_json(resp).await,
                json!({"ok": false, "message": "403 (forbidden)"})
            );
        }
    }

    #[tokio::test]
    async fn test_missing_password_file() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        std::fs::remove_file(dir.path().join("passwords.json")).unwrap();
        let body = json!({"user": USER, "password": PASSWORD}).to_string();

        let resp = handle_token(token_request(&body, None), &state).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["ok"], false);

        // A valid cookie still gets through
        let now = chrono::Utc::now().timestamp();
        let refresh = state.tokens.issue_refresh(USER, now).unwrap();
        let resp = handle_token(token_request(&body, Some(&refresh)), &state).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_logout_clears_cookie() {
        let resp = handle_logout();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(set_cookie_value(&resp).as_deref(), Some(LOGGED_OUT));
        assert_eq!(body_json(resp).await, json!({"ok": true}));
    }
}
