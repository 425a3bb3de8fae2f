//! Shared constants for Roll Call components.

/// Default attendance API base URL
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000/api";

/// Default per-request timeout (seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default secure storage file
pub const DEFAULT_STORAGE_PATH: &str = ".rollcall/session.json";

/// Enrolled class list staleness window (5 minutes)
pub const CLASS_CACHE_TTL_SECS: u64 = 300;

/// Countdown length before each liveness capture
pub const COUNTDOWN_SECS: u32 = 3;

/// Countdown tick interval (milliseconds)
pub const COUNTDOWN_TICK_MS: u64 = 1000;

/// Pause before auto-advancing to the next challenge (milliseconds)
pub const AUTO_ADVANCE_DELAY_MS: u64 = 1000;

/// Delay before leaving the capture screen after a successful submission (milliseconds)
pub const NAVIGATE_AWAY_DELAY_MS: u64 = 2000;

/// Width frames are resized to before upload
pub const CAPTURE_TARGET_WIDTH: u32 = 480;

/// JPEG quality (1-100) for uploaded frames
pub const CAPTURE_JPEG_QUALITY: u8 = 70;

/// Minimum attendance percentage students must hold
pub const DEFAULT_ATTENDANCE_THRESHOLD: f64 = 75.0;

/// Points above the threshold that still count as "warning"
pub const ATTENDANCE_WARNING_MARGIN: f64 = 5.0;

/// Secure storage keys
pub mod storage_keys {
    /// Bearer token for the attendance API
    pub const TOKEN: &str = "auth_token";

    /// JSON-encoded signed-in user
    pub const USER: &str = "auth_user";
}

/// API routes, relative to the base URL
pub mod routes {
    pub const LOGIN: &str = "/auth/login";
    pub const REGISTER: &str = "/auth/register";
    pub const FORGOT_PASSWORD: &str = "/auth/forgot-password";
    pub const ENROLLED_CLASSES: &str = "/classes/enrolled";
    pub const AVAILABLE_CLASSES: &str = "/classes/available";
    pub const VALIDATE_QR: &str = "/attendance/validate-qr";
    pub const LIVENESS_CHALLENGES: &str = "/attendance/liveness-challenges";
    pub const MARK_ATTENDANCE: &str = "/attendance/mark";

    /// Enroll (POST) / unenroll (DELETE): /classes/{class_id}/enroll.
    /// `class_id` must already be percent-encoded as a single segment.
    pub fn enrollment(class_id: &str) -> String {
        format!("/classes/{class_id}/enroll")
    }
}
