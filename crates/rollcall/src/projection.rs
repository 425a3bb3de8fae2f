//! Attendance projection for the dashboard.

use std::fmt;

use rollcall_common::constants::ATTENDANCE_WARNING_MARGIN;
use rollcall_common::{Result, RollCallError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionStatus {
    Safe,
    Warning,
    Danger,
}

impl fmt::Display for ProjectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Safe => "safe",
            Self::Warning => "warning",
            Self::Danger => "danger",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub percentage: f64,
    pub status: ProjectionStatus,
    /// Consecutive classes to attend to reach the threshold
    pub classes_needed: u32,
    /// Classes that can be missed while staying at or above the threshold
    pub can_skip: u32,
}

/// Project an attendance record against `threshold` percent (exclusive 0..100).
pub fn project(attended: u32, total: u32, threshold: f64) -> Result<Projection> {
    if !(threshold > 0.0 && threshold < 100.0) {
        return Err(RollCallError::InvalidInput(format!(
            "threshold must be between 0 and 100, got {threshold}"
        )));
    }
    if attended > total {
        return Err(RollCallError::InvalidInput(format!(
            "attended ({attended}) exceeds total ({total})"
        )));
    }

    if total == 0 {
        return Ok(Projection {
            percentage: 0.0,
            status: ProjectionStatus::Safe,
            classes_needed: 0,
            can_skip: 0,
        });
    }

    let (attended, total) = (f64::from(attended), f64::from(total));
    let percentage = attended / total * 100.0;
    let percentage = if percentage.is_nan() { 0.0 } else { percentage };

    // Percent units keep integral thresholds exact.
    let shortfall = threshold * total - 100.0 * attended;
    let classes_needed = non_negative((shortfall / (100.0 - threshold)).ceil());
    let can_skip = non_negative((-shortfall / threshold).floor());

    let status = if percentage <= threshold {
        ProjectionStatus::Danger
    } else if percentage <= threshold + ATTENDANCE_WARNING_MARGIN {
        ProjectionStatus::Warning
    } else {
        ProjectionStatus::Safe
    };

    Ok(Projection {
        percentage,
        status,
        classes_needed,
        can_skip,
    })
}

fn non_negative(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value as u32
    } else {
        0
    }
}
