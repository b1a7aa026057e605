//! Password table checks
//!
//! The password file is a JSON object mapping user name to a werkzeug-style
//! hash, `method$salt$hexdigest`. Supported methods:
//! - `pbkdf2:sha256[:iterations]`, `pbkdf2:sha512[:iterations]`
//! - `scrypt[:n:r:p]`

use std::collections::HashMap;
use std::path::Path;

use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Sha256, Sha512};
use thiserror::Error;

pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;
const SALT_CHARS: usize = 16;
const SCRYPT_KEY_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("cannot read password file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed password file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("password check task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Check `user`/`password` against the password file, re-reading it each time
pub async fn check_password(path: &Path, user: &str, password: &str) -> Result<bool, PasswordError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| PasswordError::Io {
            path: path.display().to_string(),
            source,
        })?;
    let mut users: HashMap<String, String> =
        serde_json::from_str(&contents).map_err(|source| PasswordError::Parse {
            path: path.display().to_string(),
            source,
        })?;

    let Some(hash) = users.remove(user) else {
        return Ok(false);
    };
    let password = password.to_string();
    Ok(tokio::task::spawn_blocking(move || verify_password(&hash, &password)).await?)
}

/// Verify a password against one stored hash. Unknown methods never match.
pub fn verify_password(pwhash: &str, password: &str) -> bool {
    let mut parts = pwhash.splitn(3, '$');
    let (Some(method), Some(salt), Some(expected)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    hash_internal(method, salt, password).is_some_and(|actual| constant_time_eq(&actual, expected))
}

/// Hash a password with pbkdf2-sha256 and a random salt
pub fn generate_password_hash(password: &str, iterations: u32) -> String {
    let method = format!("pbkdf2:sha256:{iterations}");
    let salt = gen_salt(SALT_CHARS);
    let digest = pbkdf2_hex("sha256", password, &salt, iterations).unwrap_or_default();
    format!("{method}${salt}${digest}")
}

fn gen_salt(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

fn hash_internal(method: &str, salt: &str, password: &str) -> Option<String> {
    let mut args = method.split(':');
    match args.next()? {
        "pbkdf2" => {
            let hash_name = args.next().unwrap_or("sha256");
            let iterations = match args.next() {
                Some(n) => n.parse().ok()?,
                None => DEFAULT_PBKDF2_ITERATIONS,
            };
            if iterations == 0 {
                return None;
            }
            pbkdf2_hex(hash_name, password, salt, iterations)
        }
        "scrypt" => {
            let n: u64 = args.next().map_or(Some(1 << 15), |s| s.parse().ok())?;
            let r: u32 = args.next().map_or(Some(8), |s| s.parse().ok())?;
            let p: u32 = args.next().map_or(Some(1), |s| s.parse().ok())?;
            if !n.is_power_of_two() || n < 2 {
                return None;
            }
            let log_n = u8::try_from(n.trailing_zeros()).ok()?;
            let params = scrypt::Params::new(log_n, r, p, SCRYPT_KEY_LEN).ok()?;
            let mut out = vec![0u8; SCRYPT_KEY_LEN];
            scrypt::scrypt(password.as_bytes(), salt.as_bytes(), &params, &mut out).ok()?;
            Some(hex::encode(out))
        }
        _ => None,
    }
}

/// Derived key length matches the digest size
fn pbkdf2_hex(hash_name: &str, password: &str, salt: &str, iterations: u32) -> Option<String> {
    let (password, salt) = (password.as_bytes(), salt.as_bytes());
    let out = match hash_name {
        "sha256" => {
            let mut out = [0u8; 32];
            pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
            out.to_vec()
        }
        "sha512" => {
            let mut out = [0u8; 64];
            pbkdf2::pbkdf2_hmac::<Sha512>(password, salt, iterations, &mut out);
            out.to_vec()
        }
        _ => return None,
    };
    Some(hex::encode(out))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    // Low iteration count keeps the tests fast
    const ITERATIONS: u32 = 1000;

    #[test]
    fn test_generate_and_verify() {
        let hash = generate_password_hash("hunter2", ITERATIONS);
        assert!(hash.starts_with("pbkdf2:sha256:1000$"));
        assert!(verify_password(&hash, "hunter2"));
        assert!(!verify_password(&hash, "hunter3"));
    }

    #[test]
    fn test_salts_differ() {
        let a = generate_password_hash("pw", ITERATIONS);
        let b = generate_password_hash("pw", ITERATIONS);
        assert_ne!(a, b);
    }

    #[test]
    fn test_known_pbkdf2_sha256_vector() {
        // RFC 7914 section 11 test vector (pbkdf2-hmac-sha256, c=1, first 32 bytes)
        let hash = "pbkdf2:sha256:1$salt$\
                    55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc";
        assert!(verify_password(hash, "passwd"));
    }

    #[test]
    fn test_sha512_roundtrip() {
        let digest = pbkdf2_hex("sha512", "pw", "abc", ITERATIONS).unwrap();
        assert_eq!(digest.len(), 128);
        let hash = format!("pbkdf2:sha512:{ITERATIONS}$abc${digest}");
        assert!(verify_password(&hash, "pw"));
        assert!(!verify_password(&hash, "px"));
    }

    #[test]
    fn test_scrypt_roundtrip() {
        let params = scrypt::Params::new(4, 8, 1, SCRYPT_KEY_LEN).unwrap();
        let mut out = vec![0u8; SCRYPT_KEY_LEN];
        scrypt::scrypt(b"pw", b"salt", &params, &mut out).unwrap();
        let hash = format!("scrypt:16:8:1$salt${}", hex::encode(out));
        assert!(verify_password(&hash, "pw"));
        assert!(!verify_password(&hash, "px"));
    }

    #[test]
    fn test_malformed_hashes_never_match() {
        for hash in [
            "",
            "plaintext",
            "pbkdf2:sha256$salt",
            "md5$salt$abcdef",
            "pbkdf2:sha1:1000$salt$abcdef",
            "pbkdf2:sha256:zero$salt$abcdef",
            "scrypt:1000:8:1$salt$abcdef",
        ] {
            assert!(!verify_password(hash, "pw"), "{hash}");
        }
    }

    #[tokio::test]
    async fn test_check_password_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passwords.json");
        let hash = generate_password_hash("secret", ITERATIONS);
        std::fs::write(&path, serde_json::json!({"aca": hash}).to_string()).unwrap();

        assert!(check_password(&path, "aca", "secret").await.unwrap());
        assert!(!check_password(&path, "aca", "wrong").await.unwrap());
        assert!(!check_password(&path, "nobody", "secret").await.unwrap());
    }

    #[tokio::test]
    async fn test_check_password_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            check_password(&missing, "aca", "pw").await,
            Err(PasswordError::Io { .. })
        ));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "not json").unwrap();
        assert!(matches!(
            check_password(&bad, "aca", "pw").await,
            Err(PasswordError::Parse { .. })
        ));
    }
}
