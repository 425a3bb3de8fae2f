//! Configuration management for the Roll Call client.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rollcall_common::constants::{
    AUTO_ADVANCE_DELAY_MS, CAPTURE_JPEG_QUALITY, CAPTURE_TARGET_WIDTH, CLASS_CACHE_TTL_SECS,
    COUNTDOWN_SECS, COUNTDOWN_TICK_MS, DEFAULT_API_URL, DEFAULT_ATTENDANCE_THRESHOLD,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_STORAGE_PATH, NAVIGATE_AWAY_DELAY_MS,
};

use crate::capture::{AdvancePolicy, FlowSettings, MachineSettings};
use crate::device::LocationAccuracy;
use crate::imaging::FrameEncoder;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub location: LocationConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub attendance: AttendanceConfig,
}

/// Attendance API connection
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL including the `/api` prefix
    #[serde(default = "default_api_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Credential file for the desktop secure store
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvanceMode {
    Manual,
    #[default]
    Automatic,
}

/// Liveness capture tuning
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_countdown")]
    pub countdown_secs: u32,

    #[serde(default = "default_tick_ms")]
    pub tick_interval_ms: u64,

    #[serde(default)]
    pub advance: AdvanceMode,

    #[serde(default = "default_advance_delay_ms")]
    pub advance_delay_ms: u64,

    /// Pause on the success screen before leaving it
    #[serde(default = "default_navigate_delay_ms")]
    pub navigate_delay_ms: u64,

    #[serde(default = "default_target_width")]
    pub target_width: u32,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            countdown_secs: default_countdown(),
            tick_interval_ms: default_tick_ms(),
            advance: AdvanceMode::default(),
            advance_delay_ms: default_advance_delay_ms(),
            navigate_delay_ms: default_navigate_delay_ms(),
            target_width: default_target_width(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

/// Location hint plus the fixed position reported by the desktop locator
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationConfig {
    #[serde(default)]
    pub accuracy: LocationAccuracy,

    #[serde(default)]
    pub latitude: f64,

    #[serde(default)]
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl")]
    pub enrolled_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enrolled_ttl_secs: default_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttendanceConfig {
    /// Minimum attendance percentage
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_url: Option<String>,
    pub storage_path: Option<PathBuf>,
}

// Default value functions
fn default_api_url() -> String { DEFAULT_API_URL.to_string() }
fn default_timeout() -> u64 { DEFAULT_REQUEST_TIMEOUT_SECS }
fn default_storage_path() -> PathBuf { PathBuf::from(DEFAULT_STORAGE_PATH) }
fn default_countdown() -> u32 { COUNTDOWN_SECS }
fn default_tick_ms() -> u64 { COUNTDOWN_TICK_MS }
fn default_advance_delay_ms() -> u64 { AUTO_ADVANCE_DELAY_MS }
fn default_navigate_delay_ms() -> u64 { NAVIGATE_AWAY_DELAY_MS }
fn default_target_width() -> u32 { CAPTURE_TARGET_WIDTH }
fn default_jpeg_quality() -> u8 { CAPTURE_JPEG_QUALITY }
fn default_cache_ttl() -> u64 { CLASS_CACHE_TTL_SECS } // 5 minutes
fn default_threshold() -> f64 { DEFAULT_ATTENDANCE_THRESHOLD }

impl AppConfig {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .build()
                .context("Failed to load config file")?;

            settings
                .try_deserialize()
                .context("Failed to parse config")?
        } else {
            // Use defaults if config file doesn't exist
            tracing::warn!(path = config_path, "Config file not found, using defaults");
            Self::default()
        };

        // Apply CLI overrides
        if let Some(ref api_url) = overrides.api_url {
            config.api.base_url = api_url.clone();
        }
        if let Some(ref path) = overrides.storage_path {
            config.storage.path = path.clone();
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.api.timeout_secs > 0, "api.timeout_secs must be positive");
        anyhow::ensure!(
            self.capture.tick_interval_ms > 0,
            "capture.tick_interval_ms must be positive"
        );
        anyhow::ensure!(
            self.attendance.threshold > 0.0 && self.attendance.threshold < 100.0,
            "attendance.threshold must be between 0 and 100"
        );
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn class_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.enrolled_ttl_secs)
    }

    /// Capture settings derived from the `capture` and `location` sections
    pub fn flow_settings(&self) -> FlowSettings {
        let capture = &self.capture;
        let advance = match capture.advance {
            AdvanceMode::Manual => AdvancePolicy::Manual,
            AdvanceMode::Automatic => AdvancePolicy::Automatic {
                delay: Duration::from_millis(capture.advance_delay_ms),
            },
        };

        FlowSettings {
            machine: MachineSettings {
                countdown_secs: capture.countdown_secs,
                tick_interval: Duration::from_millis(capture.tick_interval_ms),
                advance,
                navigate_delay: Duration::from_millis(capture.navigate_delay_ms),
            },
            encoder: FrameEncoder::new(capture.target_width, capture.jpeg_quality),
            accuracy: self.location.accuracy,
            submit_timeout: self.request_timeout(),
        }
    }
}
