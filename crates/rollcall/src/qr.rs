//! Attendance QR codes: payload parsing and server-side validation.

use rollcall_common::{QrPayload, Result, RollCallError};

use crate::api::AttendanceApi;

/// Where a validated QR code sends the student next
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckIn {
    pub class_id: String,
    pub schedule_id: Option<String>,
}

/// Parse scanned text. Only `token` and `scheduleId` are read.
pub fn parse_payload(text: &str) -> Result<QrPayload> {
    let payload: QrPayload = serde_json::from_str(text.trim())
        .map_err(|_| RollCallError::InvalidInput("Not an attendance QR code".into()))?;

    if payload.token.trim().is_empty() {
        return Err(RollCallError::InvalidInput("QR code has no token".into()));
    }
    Ok(payload)
}

/// Ask the server whether the token is live
pub async fn validate(api: &dyn AttendanceApi, payload: &QrPayload) -> Result<CheckIn> {
    let verdict = api.validate_qr(&payload.token).await.map_err(|e| match e {
        RollCallError::Api(message) => RollCallError::QrRejected(message),
        other => other,
    })?;

    if !verdict.valid {
        let message = verdict
            .message
            .unwrap_or_else(|| "Invalid or expired QR code".to_string());
        tracing::info!(reason = %message, "QR code rejected");
        return Err(RollCallError::QrRejected(message));
    }

    let class_id = verdict.class_id.ok_or_else(|| {
        RollCallError::QrRejected("QR code is not linked to a class".to_string())
    })?;
    let schedule_id = verdict.schedule_id.or_else(|| payload.schedule_id.clone());

    tracing::info!(class_id = %class_id, schedule_id = ?schedule_id, "QR code accepted");
    Ok(CheckIn {
        class_id,
        schedule_id,
    })
}

/// Parse then validate
pub async fn scan(api: &dyn AttendanceApi, text: &str) -> Result<CheckIn> {
    let payload = parse_payload(text)?;
    validate(api, &payload).await
}
