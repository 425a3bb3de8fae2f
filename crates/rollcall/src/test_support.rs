//! In-memory doubles shared by unit tests.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

use rollcall_common::{
    AttendanceSubmission, AuthSession, ChallengeResponse, ClassInfo, Coordinates, QrValidation,
    RegisterRequest, Result, RollCallError, SubmissionResponse, User,
};

use crate::api::AttendanceApi;
use crate::capture::{CaptureSession, FlowObserver, ScreenState};
use crate::device::{Camera, LocationAccuracy, Locator, PermissionGate, SecureStorage};

pub fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        name: "Ada Lovelace".to_string(),
        email: "ada@example.edu".to_string(),
        student_id: Some("S-001".to_string()),
        role: None,
    }
}

pub fn class(id: &str) -> ClassInfo {
    ClassInfo {
        id: id.to_string(),
        name: format!("Class {id}"),
        code: id.to_uppercase(),
        instructor: None,
        schedule: None,
        enrolled_count: None,
    }
}

/// Small valid PNG
pub fn test_png() -> Vec<u8> {
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    let img = RgbImage::from_pixel(32, 24, Rgb([10, 120, 200]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn unconfigured<T>(what: &str) -> Result<T> {
    Err(RollCallError::Network(format!("{what} not configured in mock")))
}

/// Scriptable [`AttendanceApi`]
#[derive(Default)]
pub struct MockApi {
    token: Mutex<Option<String>>,
    login: Mutex<Option<Result<AuthSession>>>,
    challenges: Mutex<Option<Result<ChallengeResponse>>>,
    submission: Mutex<Option<Result<SubmissionResponse>>>,
    hang_submission: AtomicBool,
    qr: Mutex<Option<Result<QrValidation>>>,
    enrolled: Mutex<Vec<ClassInfo>>,
    available: Mutex<Vec<ClassInfo>>,
    enroll_result: Mutex<Option<Result<String>>>,
    submissions: Mutex<Vec<AttendanceSubmission>>,
    challenge_fetches: AtomicUsize,
    enrolled_fetches: AtomicUsize,
    available_fetches: AtomicUsize,
}

impl MockApi {
    pub fn with_login(self, result: Result<AuthSession>) -> Self {
        *self.login.lock().unwrap() = Some(result);
        self
    }

    pub fn with_challenges(self, result: Result<ChallengeResponse>) -> Self {
        *self.challenges.lock().unwrap() = Some(result);
        self
    }

    pub fn with_submission(self, result: Result<SubmissionResponse>) -> Self {
        *self.submission.lock().unwrap() = Some(result);
        self
    }

    pub fn with_hanging_submission(self) -> Self {
        self.hang_submission.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_qr(self, result: Result<QrValidation>) -> Self {
        *self.qr.lock().unwrap() = Some(result);
        self
    }

    pub fn with_enrolled(self, classes: Vec<ClassInfo>) -> Self {
        *self.enrolled.lock().unwrap() = classes;
        self
    }

    pub fn with_available(self, classes: Vec<ClassInfo>) -> Self {
        *self.available.lock().unwrap() = classes;
        self
    }

    pub fn with_enroll_result(self, result: Result<String>) -> Self {
        *self.enroll_result.lock().unwrap() = Some(result);
        self
    }

    pub fn set_enrolled(&self, classes: Vec<ClassInfo>) {
        *self.enrolled.lock().unwrap() = classes;
    }

    pub fn token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    pub fn submissions(&self) -> Vec<AttendanceSubmission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn challenge_fetches(&self) -> usize {
        self.challenge_fetches.load(Ordering::SeqCst)
    }

    pub fn enrolled_fetches(&self) -> usize {
        self.enrolled_fetches.load(Ordering::SeqCst)
    }

    pub fn available_fetches(&self) -> usize {
        self.available_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttendanceApi for MockApi {
    async fn set_auth_token(&self, token: Option<String>) {
        *self.token.lock().unwrap() = token;
    }

    async fn login(&self, _identifier: &str, _password: &str) -> Result<AuthSession> {
        self.login
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| unconfigured("login"))
    }

    async fn register(&self, form: &RegisterRequest) -> Result<AuthSession> {
        Ok(AuthSession {
            token: "registered-token".to_string(),
            user: User {
                name: form.name.clone(),
                email: form.email.clone(),
                student_id: form.student_id.clone(),
                ..user("new-user")
            },
        })
    }

    async fn forgot_password(&self, identifier: &str) -> Result<String> {
        Ok(format!("Reset link sent to {identifier}"))
    }

    async fn enrolled_classes(&self) -> Result<Vec<ClassInfo>> {
        self.enrolled_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.enrolled.lock().unwrap().clone())
    }

    async fn available_classes(&self) -> Result<Vec<ClassInfo>> {
        self.available_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.available.lock().unwrap().clone())
    }

    async fn enroll(&self, _class_id: &str) -> Result<String> {
        self.enroll_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok("Enrolled".to_string()))
    }

    async fn unenroll(&self, _class_id: &str) -> Result<String> {
        Ok("Unenrolled".to_string())
    }

    async fn validate_qr(&self, _token: &str) -> Result<QrValidation> {
        self.qr
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| unconfigured("qr"))
    }

    async fn liveness_challenges(&self) -> Result<ChallengeResponse> {
        self.challenge_fetches.fetch_add(1, Ordering::SeqCst);
        self.challenges
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| unconfigured("challenges"))
    }

    async fn submit_attendance(
        &self,
        submission: &AttendanceSubmission,
    ) -> Result<SubmissionResponse> {
        self.submissions.lock().unwrap().push(submission.clone());
        if self.hang_submission.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.submission
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| unconfigured("submission"))
    }
}

/// Returns the same frame every time and counts captures
pub struct ScriptedCamera {
    frame: Vec<u8>,
    captures: AtomicUsize,
    active: AtomicBool,
}

impl ScriptedCamera {
    pub fn new(frame: Vec<u8>) -> Self {
        Self {
            frame,
            captures: AtomicUsize::new(0),
            active: AtomicBool::new(false),
        }
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Camera for ScriptedCamera {
    async fn capture(&self) -> Result<Vec<u8>> {
        self.active.store(true, Ordering::SeqCst);
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(self.frame.clone())
    }

    async fn release(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

pub struct StaticLocator;

#[async_trait]
impl Locator for StaticLocator {
    async fn current_position(&self, _accuracy: LocationAccuracy) -> Result<Coordinates> {
        Ok(Coordinates {
            latitude: 6.5244,
            longitude: 3.3792,
        })
    }
}

pub struct DeniedPermissions;

#[async_trait]
impl PermissionGate for DeniedPermissions {
    async fn request_camera(&self) -> bool {
        false
    }

    async fn request_location(&self) -> bool {
        false
    }
}

/// Storage whose reads and/or deletes fail
#[derive(Default)]
pub struct FlakyStorage {
    pub fail_reads: bool,
    pub fail_deletes: bool,
    pub deletes: AtomicUsize,
}

#[async_trait]
impl SecureStorage for FlakyStorage {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        if self.fail_reads {
            Err(RollCallError::Storage("keychain locked".into()))
        } else {
            Ok(None)
        }
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes {
            Err(RollCallError::Storage("keychain locked".into()))
        } else {
            Ok(())
        }
    }
}

/// Records state names (deduplicated), ticks, and errors
#[derive(Default)]
pub struct RecordingObserver {
    states: Mutex<Vec<&'static str>>,
    ticks: Mutex<Vec<u32>>,
    attempts: Mutex<Vec<String>>,
    last_error: Mutex<Option<String>>,
    navigated: AtomicBool,
    changed: Notify,
}

impl RecordingObserver {
    pub fn states(&self) -> Vec<&'static str> {
        self.states.lock().unwrap().clone()
    }

    pub fn ticks(&self) -> Vec<u32> {
        self.ticks.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }

    pub fn navigated(&self) -> bool {
        self.navigated.load(Ordering::SeqCst)
    }

    /// Wait until `state` has been entered `times` times
    pub async fn wait_for_state(&self, state: &str, times: usize) {
        self.wait_until(|| self.states().iter().filter(|s| **s == state).count() >= times)
            .await;
    }

    /// Wait until a countdown tick with `remaining` was reported
    pub async fn wait_for_tick(&self, remaining: u32) {
        self.wait_until(|| self.ticks().contains(&remaining)).await;
    }

    async fn wait_until(&self, done: impl Fn() -> bool) {
        let wait = async {
            loop {
                let changed = self.changed.notified();
                if done() {
                    return;
                }
                changed.await;
            }
        };
        tokio::time::timeout(Duration::from_secs(600), wait)
            .await
            .expect("observer condition never met");
    }
}

impl FlowObserver for RecordingObserver {
    fn on_state(&self, state: &ScreenState, _session: Option<&CaptureSession>) {
        {
            let mut states = self.states.lock().unwrap();
            if states.last() != Some(&state.name()) {
                states.push(state.name());
            }
        }
        if let ScreenState::Error { error } = state {
            *self.last_error.lock().unwrap() = Some(error.user_message());
        }
        self.changed.notify_waiters();
    }

    fn on_tick(&self, remaining: u32) {
        self.ticks.lock().unwrap().push(remaining);
        self.changed.notify_waiters();
    }

    fn on_attempt(&self, attempt_id: &str) {
        self.attempts.lock().unwrap().push(attempt_id.to_string());
    }

    fn on_navigate(&self) {
        self.navigated.store(true, Ordering::SeqCst);
        self.changed.notify_waiters();
    }
}
