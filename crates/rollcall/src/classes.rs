//! Enrolled and available class lists with a staleness window.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use rollcall_common::{ClassInfo, Result};

use crate::api::AttendanceApi;

#[derive(Default)]
struct Cache {
    enrolled: Vec<ClassInfo>,
    enrolled_at: Option<Instant>,
    available: Vec<ClassInfo>,
}

/// Class cache shared by the dashboard and enrollment screens
pub struct ClassStore {
    api: Arc<dyn AttendanceApi>,
    ttl: Duration,
    cache: RwLock<Cache>,
}

impl ClassStore {
    pub fn new(api: Arc<dyn AttendanceApi>, ttl: Duration) -> Self {
        Self {
            api,
            ttl,
            cache: RwLock::new(Cache::default()),
        }
    }

    pub async fn enrolled(&self) -> Vec<ClassInfo> {
        self.cache.read().await.enrolled.clone()
    }

    pub async fn available(&self) -> Vec<ClassInfo> {
        self.cache.read().await.available.clone()
    }

    /// Non-empty and younger than the TTL
    pub async fn is_fresh(&self) -> bool {
        let cache = self.cache.read().await;
        !cache.enrolled.is_empty()
            && cache
                .enrolled_at
                .is_some_and(|at| at.elapsed() < self.ttl)
    }

    /// Enrolled classes, served from cache while fresh unless `force` is set
    pub async fn fetch_enrolled(&self, force: bool) -> Result<Vec<ClassInfo>> {
        if !force && self.is_fresh().await {
            tracing::debug!("Enrolled classes served from cache");
            return Ok(self.enrolled().await);
        }

        let classes = self.api.enrolled_classes().await?;
        tracing::debug!(count = classes.len(), force, "Enrolled classes fetched");

        let mut cache = self.cache.write().await;
        cache.enrolled = classes.clone();
        cache.enrolled_at = Some(Instant::now());
        Ok(classes)
    }

    /// Always hits the network
    pub async fn fetch_available(&self) -> Result<Vec<ClassInfo>> {
        let classes = self.api.available_classes().await?;
        tracing::debug!(count = classes.len(), "Available classes fetched");
        self.cache.write().await.available = classes.clone();
        Ok(classes)
    }

    /// Enroll, then refresh both lists. Refresh failures are logged, not returned.
    pub async fn enroll(&self, class_id: &str) -> Result<String> {
        let message = self.api.enroll(class_id).await?;
        tracing::info!(class_id, "Enrolled");

        if let Err(e) = self.fetch_enrolled(true).await {
            tracing::warn!(error = %e, "Enrolled list refresh failed");
        }
        if let Err(e) = self.fetch_available().await {
            tracing::warn!(error = %e, "Available list refresh failed");
        }
        Ok(message)
    }

    /// Unenroll and drop the class locally without refetching
    pub async fn unenroll(&self, class_id: &str) -> Result<String> {
        let message = self.api.unenroll(class_id).await?;
        tracing::info!(class_id, "Unenrolled");

        self.cache
            .write()
            .await
            .enrolled
            .retain(|class| class.id != class_id);
        Ok(message)
    }

    pub async fn clear(&self) {
        *self.cache.write().await = Cache::default();
    }
}
