//! Request handler module
//!
//! Routes each request to health, auth, the private probe or the dispatcher.

pub mod router;

// Re-export main entry point
pub use router::handle_request;
