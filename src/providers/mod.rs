//! Sources of registered functions
//!
//! The dispatcher only knows the [`Registry`](crate::dispatch::Registry);
//! providers fill it at startup.

pub mod fixtures;

pub use fixtures::register_fixtures;
