//! # Roll Call
//!
//! Student-side attendance client: sessions, class cache, QR check-in, and
//! the face-liveness capture flow.
//!
//! ## Architecture
//! ```text
//! CLI / UI ─→ AppContext ─→ SessionStore ─┐
//!                  │      └→ ClassStore ───┼─→ AttendanceApi (HTTP)
//!                  └→ CaptureFlow ─────────┘
//!                          │
//!                  Camera / Locator / PermissionGate
//! ```

pub mod api;
pub mod capture;
pub mod classes;
pub mod config;
pub mod context;
pub mod device;
pub mod imaging;
pub mod projection;
pub mod qr;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{AttendanceApi, HttpApi, SessionEvent};
pub use capture::{CaptureFlow, CaptureMachine, FlowOutcome, ScreenState, UserAction};
pub use config::AppConfig;
pub use context::AppContext;
pub use rollcall_common::{Result, RollCallError};
