// Configuration module entry point
// Loads the layered configuration and builds the shared application state

mod state;
mod types;

use std::path::{Path, PathBuf};
use thiserror::Error;

// Re-export public types
pub use state::AppState;
pub use types::{AllowRule, AuthConfig, Config};

/// Environment variable naming a directory of `*.toml` overlays
pub const CONFIG_DIR_ENV: &str = "KADI_APPS_CONFIG_DIR";

/// Errors raised while loading configuration or building state from it
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Source(#[from] config::ConfigError),

    #[error("config directory \"{}\" does not exist", .0.display())]
    MissingConfigDir(PathBuf),

    #[error("invalid config directory pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("auth.jwt_secret must be set")]
    MissingSecret,

    #[error("invalid auth.token_version \"{0}\", expected \"major.minor\"")]
    TokenVersion(String),

    #[error("invalid allow-list entry for {module}: {source}")]
    AllowList {
        module: String,
        #[source]
        source: globset::Error,
    },

    #[error("invalid listen address: {0}")]
    Address(String),
}

impl Config {
    /// Load configuration from specified file path (without extension)
    /// Default config file is "config.toml" when no path specified
    pub fn load_from(config_path: &str) -> Result<Self, ConfigError> {
        Self::load_with_env(config_path, None)
    }

    /// Load with an explicit environment instead of the process one
    fn load_with_env(
        config_path: &str,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        // First pass only discovers the overlay directory.
        let base = layered(config_path, &[], env.clone())?.build()?;
        let config_dir = std::env::var_os(CONFIG_DIR_ENV)
            .map(PathBuf::from)
            .or_else(|| base.get_string("config_dir").ok().map(PathBuf::from));

        let overlays = match &config_dir {
            Some(dir) => overlay_files(dir)?,
            None => Vec::new(),
        };

        let mut cfg: Self = layered(config_path, &overlays, env)?
            .build()?
            .try_deserialize()?;
        cfg.config_dir = config_dir;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn get_socket_addr(&self) -> Result<std::net::SocketAddr, ConfigError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| ConfigError::Address(format!("{e}")))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        self.auth
            .token_version
            .parse::<crate::auth::TokenVersion>()?;
        Ok(())
    }
}

/// Defaults, main file, overlays, then environment (highest precedence)
///
/// Environment values stay strings until deserialization so settings such as
/// `auth.token_version = "1.10"` are not read as numbers.
fn layered(
    config_path: &str,
    overlays: &[PathBuf],
    env: Option<config::Map<String, String>>,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
    let mut builder = config::Config::builder()
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 9000)?
        .set_default("logging.level", "info")?
        .set_default("logging.access_log", true)?
        .set_default("performance.keep_alive_timeout", 75)?
        .set_default("performance.read_timeout", 30)?
        .set_default("performance.write_timeout", 30)?
        .set_default("http.server_name", "kadi-apps")?
        .set_default("http.enable_cors", true)?
        .set_default("http.max_body_size", 1_048_576)? // 1MB
        .set_default("auth.jwt_secret", "")?
        .set_default("auth.token_version", "1.0")?
        .set_default("auth.token_validity", 600)? // 10 minutes
        .set_default("auth.refresh_token_validity", 31_536_000)? // 365 days
        .set_default("auth.refresh_token_margin", 864_000)? // 10 days
        .set_default("auth.passwords", "passwords.json")?
        .add_source(config::File::with_name(config_path).required(false));

    for overlay in overlays {
        builder = builder.add_source(config::File::from(overlay.as_path()));
    }

    Ok(builder.add_source(
        config::Environment::with_prefix("KADI_APPS")
            .separator("__")
            .source(env),
    ))
}

/// List `*.toml` files in the overlay directory, sorted by name
fn overlay_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    if !dir.is_dir() {
        return Err(ConfigError::MissingConfigDir(dir.to_path_buf()));
    }
    let pattern = Path::new(&glob::Pattern::escape(&dir.to_string_lossy())).join("*.toml");
    let mut files: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())?
        .filter_map(Result::ok)
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults_and_main_file() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(
            dir.path(),
            "main.toml",
            "[auth]\njwt_secret = \"s3cret\"\n[server]\nport = 9100\n",
        );
        let cfg = Config::load_from(main.to_str().unwrap()).unwrap();
        assert_eq!(cfg.server.port, 9100);
        assert_eq!(cfg.auth.token_validity, 600);
        assert_eq!(cfg.auth.token_version, "1.0");
        assert_eq!(cfg.api.prefix, "/");
        assert!(!cfg.api.require_auth);
    }

    #[test]
    fn test_overlays_applied_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let overlay_dir = dir.path().join("conf.d");
        fs::create_dir(&overlay_dir).unwrap();
        write(&overlay_dir, "10-auth.toml", "[auth]\ntoken_validity = 60\n");
        write(&overlay_dir, "20-auth.toml", "[auth]\ntoken_validity = 120\n");
        let main = write(
            dir.path(),
            "main.toml",
            &format!(
                "config_dir = \"{}\"\n[auth]\njwt_secret = \"x\"\n",
                overlay_dir.display()
            ),
        );
        let cfg = Config::load_from(main.to_str().unwrap()).unwrap();
        assert_eq!(cfg.auth.token_validity, 120);
        assert_eq!(cfg.config_dir.as_deref(), Some(overlay_dir.as_path()));
    }

    #[test]
    fn test_overlay_dir_with_glob_characters() {
        let dir = tempfile::tempdir().unwrap();
        let overlay_dir = dir.path().join("conf[d]");
        fs::create_dir(&overlay_dir).unwrap();
        write(&overlay_dir, "auth.toml", "[auth]\ntoken_validity = 90\n");
        let main = write(
            dir.path(),
            "main.toml",
            &format!(
                "config_dir = \"{}\"\n[auth]\njwt_secret = \"x\"\n",
                overlay_dir.display()
            ),
        );
        let cfg = Config::load_from(main.to_str().unwrap()).unwrap();
        assert_eq!(cfg.auth.token_validity, 90);
    }

    #[test]
    fn test_missing_config_dir_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(
            dir.path(),
            "main.toml",
            "config_dir = \"/nonexistent/kadi-apps-config\"\n[auth]\njwt_secret = \"x\"\n",
        );
        let err = Config::load_from(main.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingConfigDir(_)));
    }

    #[test]
    fn test_empty_secret_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main.toml", "[server]\nport = 9100\n");
        let err = Config::load_from(main.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret));
    }

    #[test]
    fn test_bad_token_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(
            dir.path(),
            "main.toml",
            "[auth]\njwt_secret = \"x\"\ntoken_version = \"one\"\n",
        );
        let err = Config::load_from(main.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::TokenVersion(v) if v == "one"));
    }

    #[test]
    fn test_env_strings_kept_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "main.toml", "[auth]\njwt_secret = \"x\"\n");
        let env = config::Map::from_iter([
            ("KADI_APPS__AUTH__TOKEN_VERSION".to_string(), "1.10".to_string()),
            ("KADI_APPS__AUTH__JWT_SECRET".to_string(), "007".to_string()),
            ("KADI_APPS__SERVER__PORT".to_string(), "9200".to_string()),
            ("KADI_APPS__API__REQUIRE_AUTH".to_string(), "true".to_string()),
        ]);
        let cfg = Config::load_with_env(main.to_str().unwrap(), Some(env)).unwrap();
        assert_eq!(cfg.auth.token_version, "1.10");
        assert_eq!(cfg.auth.jwt_secret, "007");
        assert_eq!(cfg.server.port, 9200);
        assert!(cfg.api.require_auth);

        let tokens = crate::auth::TokenService::new(&cfg.auth).unwrap();
        assert_eq!(tokens.min_version().to_string(), "1.10");
        let older = crate::auth::token::Claims {
            user: "aca".to_string(),
            version: "1.5".parse().unwrap(),
            exp: None,
        };
        assert!(tokens.decode(&tokens.sign(&older).unwrap()).is_none());
    }

    #[test]
    fn test_allow_rules_deserialize() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(
            dir.path(),
            "main.toml",
            "[auth]\njwt_secret = \"x\"\n\
             [[api.allow]]\nmodule = \"agasc\"\nfunctions = [\"get_star\"]\n",
        );
        let cfg = Config::load_from(main.to_str().unwrap()).unwrap();
        assert_eq!(
            cfg.api.allow,
            Some(vec![AllowRule {
                module: "agasc".to_string(),
                functions: vec!["get_star".to_string()],
            }])
        );
    }
}
