//! Token authentication
//!
//! Short-lived access tokens travel in the `Authorization` header; long-lived
//! refresh tokens travel in an http-only cookie and are rotated shortly
//! before they expire.

pub mod guard;
pub mod handlers;
pub mod password;
pub mod token;

pub use guard::{login_required, AuthenticatedUser};
pub use handlers::{handle_logout, handle_token};
pub use password::generate_password_hash;
pub use token::{TokenService, TokenVersion};
