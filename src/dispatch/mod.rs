//! Dynamic function dispatcher
//!
//! Resolves a URL path such as `mica/starcheck/get_starcat` to an
//! allow-listed, registered function, calls it with the query arguments and
//! encodes the result as JSON.

pub mod allowlist;
pub mod args;
pub mod encode;
pub mod registry;
pub mod value;

use hyper::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::logger;
pub use allowlist::AllowList;
pub use args::Kwargs;
pub use encode::{EncodeError, Encoder, TableFormat};
pub use registry::{ApiFunction, CallError, Registry};
pub use value::{ApiValue, Column, MaskedArray, Table};

/// Query keys consumed by the dispatcher and never forwarded
pub const TABLE_FORMAT_KEY: &str = "table_format";
pub const STRICT_ENCODE_KEY: &str = "strict_encode";

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Unknown module path, empty or disallowed function name
    #[error("{0}")]
    NotFound(String),

    #[error("No module named '{module}' (registered modules: {available})")]
    ImportFailure { module: String, available: String },

    #[error("module '{module}' has no attribute '{attribute}'")]
    MissingAttribute { module: String, attribute: String },

    #[error(transparent)]
    Call(#[from] CallError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl DispatchError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short class name for logs
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFound",
            Self::ImportFailure { .. } => "ImportError",
            Self::MissingAttribute { .. } => "AttributeError",
            Self::Call(_) => "CallError",
            Self::Encode(_) => "EncodeError",
        }
    }
}

/// A path resolved to a callable
pub struct Resolved {
    pub module: String,
    pub function: String,
    pub callable: ApiFunction,
}

impl Resolved {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.module, self.function)
    }
}

#[derive(Debug)]
pub struct Dispatcher {
    allow_list: AllowList,
    registry: Registry,
}

impl Dispatcher {
    pub const fn new(allow_list: AllowList, registry: Registry) -> Self {
        Self {
            allow_list,
            registry,
        }
    }

    pub const fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Map a slash-separated path to an allowed, registered function.
    ///
    /// Every prefix of the path is tried from short to long; the longest
    /// allow-listed one is the module and the rest names the function.
    pub fn resolve(&self, path: &str) -> Result<Resolved, DispatchError> {
        let parts: Vec<&str> = path.split('/').collect();
        let mut matched = None;

        for end in 1..=parts.len() {
            if let Some(entry) = self.allow_list.get(&parts[..end]) {
                if !self.registry.has_module(entry.module()) {
                    return Err(DispatchError::ImportFailure {
                        module: entry.module().to_string(),
                        available: self.registry.module_names().collect::<Vec<_>>().join(", "),
                    });
                }
                matched = Some((entry, &parts[end..]));
            }
        }

        let Some((entry, func_parts)) = matched else {
            return Err(DispatchError::NotFound(format!(
                "no app module found for URL path {path}"
            )));
        };
        if func_parts.is_empty() {
            return Err(DispatchError::NotFound(format!(
                "no function parts found for URL path {path}"
            )));
        }

        let function = func_parts.join(".");
        if !entry.allows(&function) {
            return Err(DispatchError::NotFound(format!(
                "function {function} was not found or is not allowed for {}",
                entry.module()
            )));
        }

        let callable = self
            .registry
            .get(entry.module(), &function)
            .ok_or_else(|| DispatchError::MissingAttribute {
                module: entry.module().to_string(),
                attribute: function.clone(),
            })?;

        Ok(Resolved {
            module: entry.module().to_string(),
            function,
            callable,
        })
    }

    /// Resolve, invoke and encode one call
    pub fn call(&self, path: &str, mut kwargs: Kwargs) -> Result<Value, DispatchError> {
        let resolved = self.resolve(path)?;

        let table_format = TableFormat::from_arg(kwargs.take(TABLE_FORMAT_KEY).as_ref());
        let strict = kwargs
            .take(STRICT_ENCODE_KEY)
            .map_or(true, |v| v.is_truthy());

        logger::log_api_call(&resolved.qualified_name(), &kwargs);

        let output = (resolved.callable)(&kwargs)?;
        Ok(Encoder::new(table_format, strict).encode(&output)?)
    }
}
