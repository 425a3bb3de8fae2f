//! Attendance API surface.
//!
//! Stores and the capture flow only see [`AttendanceApi`]; the HTTP
//! implementation lives in [`http`].

mod http;

pub use http::HttpApi;

use async_trait::async_trait;
use rollcall_common::{
    AttendanceSubmission, AuthSession, ChallengeResponse, ClassInfo, QrValidation,
    RegisterRequest, Result, SubmissionResponse,
};

/// Signals published by the API client to whoever owns the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// An authenticated request came back 401
    Unauthorized,
}

/// Remote attendance service
#[async_trait]
pub trait AttendanceApi: Send + Sync {
    /// Install (or clear) the bearer token used for subsequent requests
    async fn set_auth_token(&self, token: Option<String>);

    async fn login(&self, identifier: &str, password: &str) -> Result<AuthSession>;

    async fn register(&self, form: &RegisterRequest) -> Result<AuthSession>;

    /// Returns the server's confirmation message
    async fn forgot_password(&self, identifier: &str) -> Result<String>;

    async fn enrolled_classes(&self) -> Result<Vec<ClassInfo>>;

    async fn available_classes(&self) -> Result<Vec<ClassInfo>>;

    async fn enroll(&self, class_id: &str) -> Result<String>;

    async fn unenroll(&self, class_id: &str) -> Result<String>;

    async fn validate_qr(&self, token: &str) -> Result<QrValidation>;

    /// Raw challenge response; emptiness is judged by the capture flow
    async fn liveness_challenges(&self) -> Result<ChallengeResponse>;

    /// Raw submission verdict; `success == false` is not an `Err`
    async fn submit_attendance(&self, submission: &AttendanceSubmission)
    -> Result<SubmissionResponse>;
}
