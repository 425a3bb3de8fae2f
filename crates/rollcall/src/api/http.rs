//! HTTP implementation of the attendance API.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};

use rollcall_common::constants::routes;
use rollcall_common::{
    ApiMessage, AttendanceSubmission, AuthResponse, AuthSession, ChallengeResponse, ClassInfo,
    ClassListResponse, ForgotPasswordRequest, LoginRequest, QrValidation, QrValidationRequest,
    RegisterRequest, Result, RollCallError, SubmissionResponse,
};

use super::{AttendanceApi, SessionEvent};

/// `reqwest`-backed client with bearer auth and a hard per-request timeout
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    token: RwLock<Option<String>>,
    events: broadcast::Sender<SessionEvent>,
}

impl HttpApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RollCallError::Config(format!("Failed to build HTTP client: {e}")))?;

        let (events, _) = broadcast::channel(16);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            token: RwLock::new(None),
            events,
        })
    }

    /// Subscribe to session events (401 responses)
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and decode a JSON body, bounded by the configured timeout
    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<T> {
        let token = self.token.read().await.clone();
        let authenticated = token.is_some();

        let mut request = build(self.client.request(method.clone(), self.url(path)));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let exchange = async {
            let response = request.send().await.map_err(|e| transport_error(path, e))?;
            let status = response.status();
            let body = response.bytes().await.map_err(|e| transport_error(path, e))?;
            Ok::<_, RollCallError>((status, body))
        };

        let (status, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| {
                RollCallError::Timeout(format!("{path} took longer than {}s", self.timeout.as_secs()))
            })??;

        tracing::debug!(method = %method, path = %path, status = status.as_u16(), "API response");

        if status == StatusCode::UNAUTHORIZED {
            if authenticated {
                tracing::warn!(path = %path, "Authenticated request rejected with 401");
                // Nobody listening just means no session store is attached
                let _ = self.events.send(SessionEvent::Unauthorized);
            }
            return Err(RollCallError::Unauthorized(
                server_message(&body).unwrap_or_else(|| "Please sign in again".to_string()),
            ));
        }

        if !status.is_success() {
            return Err(RollCallError::Api(
                server_message(&body)
                    .unwrap_or_else(|| format!("{path} failed with status {}", status.as_u16())),
            ));
        }

        serde_json::from_slice(&body)
            .map_err(|e| RollCallError::Api(format!("Malformed response from {path}: {e}")))
    }

    fn authenticate(&self, path: &str, response: AuthResponse) -> Result<AuthSession> {
        match response {
            AuthResponse {
                success: true,
                token: Some(token),
                user: Some(user),
                ..
            } => Ok(AuthSession { token, user }),
            AuthResponse { message, .. } => Err(RollCallError::Api(
                message.unwrap_or_else(|| format!("{path} was not accepted")),
            )),
        }
    }
}

fn transport_error(path: &str, err: reqwest::Error) -> RollCallError {
    if err.is_timeout() {
        RollCallError::Timeout(format!("{path}: {err}"))
    } else {
        RollCallError::Network(err.to_string())
    }
}

/// Enrollment route with `class_id` escaped into exactly one path segment
fn enrollment_path(class_id: &str) -> Result<String> {
    // Dot segments are collapsed by URL parsing even when percent-encoded
    if matches!(class_id.trim(), "" | "." | "..") {
        return Err(RollCallError::InvalidInput(format!(
            "invalid class id {class_id:?}"
        )));
    }
    Ok(routes::enrollment(&urlencoding::encode(class_id)))
}

/// Pull a `message` field out of an error body, if there is one
fn server_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ApiMessage>(body)
        .ok()
        .and_then(|m| m.message)
        .filter(|m| !m.trim().is_empty())
}

fn into_message(path: &str, reply: ApiMessage, fallback: &str) -> Result<String> {
    if reply.success {
        Ok(reply.message.unwrap_or_else(|| fallback.to_string()))
    } else {
        Err(RollCallError::Api(
            reply.message.unwrap_or_else(|| format!("{path} was not accepted")),
        ))
    }
}

fn into_classes(path: &str, reply: ClassListResponse) -> Result<Vec<ClassInfo>> {
    if reply.success {
        Ok(reply.classes)
    } else {
        Err(RollCallError::Api(
            reply.message.unwrap_or_else(|| format!("{path} was not accepted")),
        ))
    }
}

#[async_trait]
impl AttendanceApi for HttpApi {
    async fn set_auth_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }

    async fn login(&self, identifier: &str, password: &str) -> Result<AuthSession> {
        let body = LoginRequest {
            identifier: identifier.to_string(),
            password: password.to_string(),
        };
        let reply: AuthResponse = self
            .send(Method::POST, routes::LOGIN, |r| r.json(&body))
            .await?;
        self.authenticate(routes::LOGIN, reply)
    }

    async fn register(&self, form: &RegisterRequest) -> Result<AuthSession> {
        let reply: AuthResponse = self
            .send(Method::POST, routes::REGISTER, |r| r.json(form))
            .await?;
        self.authenticate(routes::REGISTER, reply)
    }

    async fn forgot_password(&self, identifier: &str) -> Result<String> {
        let body = ForgotPasswordRequest {
            identifier: identifier.to_string(),
        };
        let reply: ApiMessage = self
            .send(Method::POST, routes::FORGOT_PASSWORD, |r| r.json(&body))
            .await?;
        into_message(routes::FORGOT_PASSWORD, reply, "Password reset instructions sent")
    }

    async fn enrolled_classes(&self) -> Result<Vec<ClassInfo>> {
        let reply: ClassListResponse = self
            .send(Method::GET, routes::ENROLLED_CLASSES, |r| r)
            .await?;
        into_classes(routes::ENROLLED_CLASSES, reply)
    }

    async fn available_classes(&self) -> Result<Vec<ClassInfo>> {
        let reply: ClassListResponse = self
            .send(Method::GET, routes::AVAILABLE_CLASSES, |r| r)
            .await?;
        into_classes(routes::AVAILABLE_CLASSES, reply)
    }

    async fn enroll(&self, class_id: &str) -> Result<String> {
        let path = enrollment_path(class_id)?;
        let reply: ApiMessage = self.send(Method::POST, &path, |r| r).await?;
        into_message(&path, reply, "Enrolled")
    }

    async fn unenroll(&self, class_id: &str) -> Result<String> {
        let path = enrollment_path(class_id)?;
        let reply: ApiMessage = self.send(Method::DELETE, &path, |r| r).await?;
        into_message(&path, reply, "Unenrolled")
    }

    async fn validate_qr(&self, token: &str) -> Result<QrValidation> {
        let body = QrValidationRequest {
            token: token.to_string(),
        };
        self.send(Method::POST, routes::VALIDATE_QR, |r| r.json(&body))
            .await
    }

    async fn liveness_challenges(&self) -> Result<ChallengeResponse> {
        self.send(Method::GET, routes::LIVENESS_CHALLENGES, |r| r).await
    }

    async fn submit_attendance(
        &self,
        submission: &AttendanceSubmission,
    ) -> Result<SubmissionResponse> {
        tracing::info!(
            class_id = %submission.class_id,
            frames = submission.challenge_images.len(),
            "Submitting attendance"
        );
        self.send(Method::POST, routes::MARK_ATTENDANCE, |r| r.json(submission))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_ignores_blank_and_malformed_bodies() {
        assert_eq!(
            server_message(br#"{"success":false,"message":"face mismatch"}"#).as_deref(),
            Some("face mismatch")
        );
        assert_eq!(server_message(br#"{"success":false,"message":"  "}"#), None);
        assert_eq!(server_message(b"<html>bad gateway</html>"), None);
    }

    #[test]
    fn class_ids_cannot_escape_the_enrollment_route() {
        let api = HttpApi::new("http://localhost:5000/api", Duration::from_secs(5)).unwrap();

        for id in ["../../auth/login#", "a/b?c=d#e", "../..", "c 1"] {
            let url = reqwest::Url::parse(&api.url(&enrollment_path(id).unwrap())).unwrap();
            assert_eq!(url.query(), None, "{id}");
            assert_eq!(url.fragment(), None, "{id}");
            let segments: Vec<_> = url.path_segments().unwrap().collect();
            assert_eq!(segments.len(), 4, "{id}: {url}");
            assert_eq!(segments[..2], ["api", "classes"]);
            assert_eq!(segments[3], "enroll");
        }

        assert_eq!(
            enrollment_path("../../auth/login#").unwrap(),
            "/classes/..%2F..%2Fauth%2Flogin%23/enroll"
        );
        for id in ["  ", ".", ".."] {
            assert!(matches!(
                enrollment_path(id),
                Err(RollCallError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let api = HttpApi::new("http://localhost:5000/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(api.url(routes::LOGIN), "http://localhost:5000/api/auth/login");
    }
}
