//! # Roll Call Common
//!
//! Shared types, errors, and constants used across Roll Call components.
//!
//! ## Modules
//! - `types` - Wire data model (Challenge, CapturedChallenge, ClassInfo, etc.)
//! - `error` - The client error taxonomy
//! - `constants` - Defaults, storage keys, and API routes

pub mod constants;
pub mod error;
pub mod types;

pub use error::RollCallError;
pub use types::*;

/// Result alias used throughout Roll Call
pub type Result<T, E = RollCallError> = std::result::Result<T, E>;
