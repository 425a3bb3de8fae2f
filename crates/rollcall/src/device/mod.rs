//! Device capabilities consumed by the client.
//!
//! Camera, geolocation, permission prompts, and secure key-value storage are
//! platform services. The client only talks to these traits; the
//! implementations here are the desktop stand-ins used by the CLI.

mod camera;
mod storage;

pub use camera::DirectoryCamera;
pub use storage::{FileSecureStorage, MemoryStorage};

use async_trait::async_trait;
use rollcall_common::{Coordinates, Result};
use serde::Deserialize;

/// Front-facing still camera
#[async_trait]
pub trait Camera: Send + Sync {
    /// Take one still; returns the encoded image bytes (JPEG/PNG)
    async fn capture(&self) -> Result<Vec<u8>>;

    /// Deactivate the device so other screens can claim it
    async fn release(&self) {}
}

/// Accuracy hint for a single-shot position read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationAccuracy {
    Low,
    #[default]
    Balanced,
    High,
}

/// Single-shot geolocation
#[async_trait]
pub trait Locator: Send + Sync {
    async fn current_position(&self, accuracy: LocationAccuracy) -> Result<Coordinates>;
}

/// Runtime permission prompts
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn request_camera(&self) -> bool;
    async fn request_location(&self) -> bool;
}

/// Local secure key-value storage
#[async_trait]
pub trait SecureStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Reports a fixed position (desktop has no GPS)
#[derive(Debug, Clone, Copy)]
pub struct FixedLocator {
    coordinates: Coordinates,
}

impl FixedLocator {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            coordinates: Coordinates {
                latitude,
                longitude,
            },
        }
    }
}

#[async_trait]
impl Locator for FixedLocator {
    async fn current_position(&self, accuracy: LocationAccuracy) -> Result<Coordinates> {
        tracing::debug!(?accuracy, "Reporting fixed position");
        Ok(self.coordinates)
    }
}

/// Grants every permission; the CLI runs with the user's own access rights
#[derive(Debug, Clone, Copy, Default)]
pub struct GrantAll;

#[async_trait]
impl PermissionGate for GrantAll {
    async fn request_camera(&self) -> bool {
        true
    }

    async fn request_location(&self) -> bool {
        true
    }
}
