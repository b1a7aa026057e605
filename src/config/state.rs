// Application state module
// Everything a request handler needs, built once at startup and shared read-only

use super::types::Config;
use super::ConfigError;
use crate::auth::TokenService;
use crate::dispatch::{AllowList, Dispatcher, Registry};

/// Application state
#[derive(Debug)]
pub struct AppState {
    pub config: Config,
    pub dispatcher: Dispatcher,
    pub tokens: TokenService,
}

impl AppState {
    /// Compile the allow-list (configured or built-in) and the token keys
    pub fn new(config: Config, registry: Registry) -> Result<Self, ConfigError> {
        let dispatcher = Dispatcher::new(AllowList::new(&config.api.allow_rules())?, registry);
        let tokens = TokenService::new(&config.auth)?;

        Ok(Self {
            config,
            dispatcher,
            tokens,
        })
    }
}
