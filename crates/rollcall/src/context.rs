//! Application context and shared stores.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::api::{AttendanceApi, HttpApi};
use crate::capture::{CaptureDevices, CaptureFlow, FlowSettings};
use crate::classes::ClassStore;
use crate::config::AppConfig;
use crate::device::{FileSecureStorage, SecureStorage};
use crate::qr::{self, CheckIn};
use crate::session::SessionStore;

/// Shared application state
#[derive(Clone)]
pub struct AppContext {
    /// Application configuration
    pub config: AppConfig,

    /// Attendance API client
    pub api: Arc<dyn AttendanceApi>,

    /// Signed-in student
    pub session: Arc<SessionStore>,

    /// Enrolled/available class cache
    pub classes: Arc<ClassStore>,
}

impl AppContext {
    /// Wire stores around an existing API client and secure store
    pub fn new(
        config: AppConfig,
        api: Arc<dyn AttendanceApi>,
        storage: Arc<dyn SecureStorage>,
    ) -> Self {
        let session = Arc::new(SessionStore::new(api.clone(), storage));
        let classes = Arc::new(ClassStore::new(api.clone(), config.class_cache_ttl()));

        Self {
            config,
            api,
            session,
            classes,
        }
    }

    /// Build the HTTP client and file store, then restore any saved session
    pub async fn connect(config: AppConfig) -> Result<Self> {
        let http = HttpApi::new(&config.api.base_url, config.request_timeout())
            .context("Failed to create API client")?;
        let unauthorized = http.subscribe();

        let storage = Arc::new(FileSecureStorage::new(config.storage.path.clone()));
        let ctx = Self::new(config, Arc::new(http), storage);

        ctx.session.watch_unauthorized(unauthorized);
        let restored = ctx.session.check_auth_state().await;
        tracing::debug!(restored, base_url = %ctx.config.api.base_url, "Context ready");

        Ok(ctx)
    }

    /// Logout plus cache reset
    pub async fn sign_out(&self) {
        self.session.logout().await;
        self.classes.clear().await;
    }

    /// Parse and validate a scanned QR code
    pub async fn check_in(&self, qr_text: &str) -> rollcall_common::Result<CheckIn> {
        qr::scan(self.api.as_ref(), qr_text).await
    }

    /// A capture screen for `class_id`, configured from `capture`/`location`
    pub fn capture_flow(&self, devices: CaptureDevices, class_id: impl Into<String>) -> CaptureFlow {
        self.capture_flow_with(devices, class_id, self.config.flow_settings())
    }

    pub fn capture_flow_with(
        &self,
        devices: CaptureDevices,
        class_id: impl Into<String>,
        settings: FlowSettings,
    ) -> CaptureFlow {
        CaptureFlow::new(self.api.clone(), devices, settings, class_id)
    }
}
