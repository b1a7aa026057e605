//! Signed access and refresh tokens
//!
//! Both kinds share one claim set `{user, version, exp?}` and differ only in
//! validity. A token is accepted when its HS256 signature verifies and its
//! version is not below the configured minimum.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::{AuthConfig, ConfigError};

/// Token version tuple, compared lexicographically
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenVersion(Vec<u32>);

impl FromStr for TokenVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .split('.')
            .map(|part| part.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
            .map_err(|_| ConfigError::TokenVersion(s.to_string()))
    }
}

impl fmt::Display for TokenVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u32::to_string).collect();
        f.write_str(&parts.join("."))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user: String,
    pub version: TokenVersion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    min_version: TokenVersion,
    access_validity: u64,
    refresh_validity: u64,
    refresh_margin: u64,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("min_version", &self.min_version)
            .field("access_validity", &self.access_validity)
            .field("refresh_validity", &self.refresh_validity)
            .field("refresh_margin", &self.refresh_margin)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Result<Self, ConfigError> {
        if config.jwt_secret.trim().is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        let secret = config.jwt_secret.as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        // `exp` is optional in the claim set
        validation.required_spec_claims = HashSet::new();

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            min_version: config.token_version.parse()?,
            access_validity: config.token_validity,
            refresh_validity: config.refresh_token_validity,
            refresh_margin: config.refresh_token_margin,
        })
    }

    pub const fn min_version(&self) -> &TokenVersion {
        &self.min_version
    }

    /// Access token validity in seconds
    pub const fn access_validity(&self) -> u64 {
        self.access_validity
    }

    pub fn issue_access(&self, user: &str, now: i64) -> jsonwebtoken::errors::Result<String> {
        self.issue(user, Some(self.access_validity), now)
    }

    pub fn issue_refresh(&self, user: &str, now: i64) -> jsonwebtoken::errors::Result<String> {
        self.issue(user, Some(self.refresh_validity), now)
    }

    /// Sign a token for `user` at the current minimum version.
    /// Without a validity the token never expires.
    pub fn issue(
        &self,
        user: &str,
        validity: Option<u64>,
        now: i64,
    ) -> jsonwebtoken::errors::Result<String> {
        let exp = validity.map(|secs| now.saturating_add(i64::try_from(secs).unwrap_or(i64::MAX)));
        self.sign(&Claims {
            user: user.to_string(),
            version: self.min_version.clone(),
            exp,
        })
    }

    pub fn sign(&self, claims: &Claims) -> jsonwebtoken::errors::Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
    }

    /// Verified claims, or `None` for any signature, structure, expiry or
    /// version failure
    pub fn decode(&self, token: &str) -> Option<Claims> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .ok()
            .map(|data| data.claims)
            .filter(|claims| claims.version >= self.min_version)
    }

    /// Seconds until `exp`, if the token expires at all
    pub fn time_left(claims: &Claims, now: i64) -> Option<i64> {
        claims.exp.map(|exp| exp - now)
    }

    /// A refresh token is rotated once it is inside the margin but not yet expired
    pub fn needs_rotation(&self, claims: &Claims, now: i64) -> bool {
        let margin = i64::try_from(self.refresh_margin).unwrap_or(i64::MAX);
        Self::time_left(claims, now).is_some_and(|left| left > 0 && left < margin)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;

    pub(crate) fn auth_config(version: &str) -> AuthConfig {
        AuthConfig {
            jwt_secret: "not-a-real-secret".to_string(),
            token_version: version.to_string(),
            token_validity: 600,
            refresh_token_validity: 31_536_000,
            refresh_token_margin: 864_000,
            passwords: PathBuf::from("passwords.json"),
        }
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    #[test]
    fn test_parse_version() {
        let v: TokenVersion = "1.2".parse().unwrap();
        assert_eq!(v, TokenVersion(vec![1, 2]));
        assert_eq!(v.to_string(), "1.2");
        assert!("1.x".parse::<TokenVersion>().is_err());
        assert!("".parse::<TokenVersion>().is_err());
    }

    #[test]
    fn test_version_ordering() {
        let v = |s: &str| s.parse::<TokenVersion>().unwrap();
        assert!(v("1.0") < v("1.1"));
        assert!(v("1.10") > v("1.9"));
        assert!(v("2.0") > v("1.99"));
    }

    #[test]
    fn test_issue_and_decode() {
        let tokens = TokenService::new(&auth_config("1.0")).unwrap();
        let token = tokens.issue_access("aca", now()).unwrap();
        let claims = tokens.decode(&token).unwrap();
        assert_eq!(claims.user, "aca");
        assert_eq!(claims.version, "1.0".parse().unwrap());
        assert!(claims.exp.is_some());
    }

    #[test]
    fn test_outdated_version_rejected() {
        let old = TokenService::new(&auth_config("1.0")).unwrap();
        let new = TokenService::new(&auth_config("1.1")).unwrap();

        let token = old.issue_access("aca", now()).unwrap();
        assert!(old.decode(&token).is_some());
        assert!(new.decode(&token).is_none());

        // A token without expiry is still rejected on version alone
        let forever = old.issue("aca", None, now()).unwrap();
        assert!(new.decode(&forever).is_none());
        assert!(old.decode(&forever).unwrap().exp.is_none());
    }

    #[test]
    fn test_invalid_tokens_rejected() {
        let tokens = TokenService::new(&auth_config("1.0")).unwrap();
        let token = tokens.issue_access("aca", now()).unwrap();

        assert!(tokens.decode("garbage").is_none());
        let truncated = &token[..token.rfind('.').unwrap()];
        assert!(tokens.decode(truncated).is_none());

        let mut other = auth_config("1.0");
        other.jwt_secret = "another-secret".to_string();
        let foreign = TokenService::new(&other).unwrap();
        assert!(tokens
            .decode(&foreign.issue_access("aca", now()).unwrap())
            .is_none());
    }

    #[test]
    fn test_expired_token_rejected() {
        let tokens = TokenService::new(&auth_config("1.0")).unwrap();
        let token = tokens.issue("aca", Some(10), now() - 3600).unwrap();
        assert!(tokens.decode(&token).is_none());
    }

    #[test]
    fn test_rotation_window() {
        let tokens = TokenService::new(&auth_config("1.0")).unwrap();
        let t = now();
        let claims = |exp| Claims {
            user: "aca".to_string(),
            version: "1.0".parse().unwrap(),
            exp,
        };

        assert!(!tokens.needs_rotation(&claims(Some(t + 31_536_000)), t));
        assert!(tokens.needs_rotation(&claims(Some(t + 3600)), t));
        assert!(!tokens.needs_rotation(&claims(Some(t - 1)), t));
        assert!(!tokens.needs_rotation(&claims(None), t));
    }

    #[test]
    fn test_empty_secret_rejected() {
        let mut config = auth_config("1.0");
        config.jwt_secret = String::new();
        assert!(matches!(
            TokenService::new(&config),
            Err(ConfigError::MissingSecret)
        ));
    }
}
