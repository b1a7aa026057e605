//! HTTP protocol layer module
//!
//! Response builders and body helpers shared by the route handlers.

pub mod response;

// Re-export commonly used types
pub use response::{
    add_cors_headers, build_404_response, build_405_response, build_413_response,
    build_health_response, build_options_response, json_message, json_response, read_body,
    BodyError,
};
