//! Core types shared across Roll Call components.
//!
//! Field names follow the attendance API's JSON (camelCase).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Liveness challenge kinds issued by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeType {
    Neutral,
    Smile,
    TurnLeft,
    TurnRight,
    EyesOpen,
    LookUp,
}

impl ChallengeType {
    pub const ALL: [ChallengeType; 6] = [
        Self::Neutral,
        Self::Smile,
        Self::TurnLeft,
        Self::TurnRight,
        Self::EyesOpen,
        Self::LookUp,
    ];

    /// Wire name (matches the serde representation)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Smile => "smile",
            Self::TurnLeft => "turn_left",
            Self::TurnRight => "turn_right",
            Self::EyesOpen => "eyes_open",
            Self::LookUp => "look_up",
        }
    }

    /// Short label for progress displays
    pub fn label(&self) -> &'static str {
        match self {
            Self::Neutral => "Neutral",
            Self::Smile => "Smile",
            Self::TurnLeft => "Turn left",
            Self::TurnRight => "Turn right",
            Self::EyesOpen => "Eyes open",
            Self::LookUp => "Look up",
        }
    }

    /// Instruction shown when the server sends none
    pub fn default_instruction(&self) -> &'static str {
        match self {
            Self::Neutral => "Look straight at the camera with a neutral expression",
            Self::Smile => "Smile at the camera",
            Self::TurnLeft => "Slowly turn your head to the left",
            Self::TurnRight => "Slowly turn your head to the right",
            Self::EyesOpen => "Keep your eyes wide open",
            Self::LookUp => "Tilt your head and look up",
        }
    }
}

impl fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A server-issued liveness challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    #[serde(rename = "type")]
    pub kind: ChallengeType,

    #[serde(default)]
    pub instruction: String,
}

impl Challenge {
    pub fn new(kind: ChallengeType, instruction: impl Into<String>) -> Self {
        Self {
            kind,
            instruction: instruction.into(),
        }
    }

    /// Instruction to display, falling back to the built-in text
    pub fn instruction_text(&self) -> &str {
        let trimmed = self.instruction.trim();
        if trimmed.is_empty() {
            self.kind.default_instruction()
        } else {
            trimmed
        }
    }
}

/// One completed challenge: the challenge type plus the base64 JPEG frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedChallenge {
    pub challenge_type: String,
    pub image: String,
}

/// A single geolocation reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Signed-in student
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(alias = "_id")]
    pub id: String,

    pub name: String,

    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Token and user pair persisted across launches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub user: User,
}

/// Registration form
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgotPasswordRequest {
    pub identifier: String,
}

/// Login / register response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub user: Option<User>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Generic `{success, message}` envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A class the student is (or could be) enrolled in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    #[serde(alias = "_id")]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub code: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructor: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrolled_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassListResponse {
    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub classes: Vec<ClassInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Content of a scanned attendance QR code; other fields are ignored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrValidationRequest {
    pub token: String,
}

/// Server verdict on a scanned QR token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrValidation {
    #[serde(default)]
    pub valid: bool,

    #[serde(default)]
    pub class_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Liveness challenge list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeResponse {
    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub challenges: Vec<Challenge>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Attendance submission body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSubmission {
    pub class_id: String,
    pub student_coordinates: Coordinates,
    pub challenge_images: Vec<CapturedChallenge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResponse {
    #[serde(default)]
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
