//! Secure storage implementations.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use rollcall_common::{Result, RollCallError};

use super::SecureStorage;

/// JSON key-value file, readable only by the owner on Unix
pub struct FileSecureStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSecureStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>> {
        match tokio::fs::read(&self.path).await {
            Ok(data) => serde_json::from_slice(&data).map_err(|e| {
                RollCallError::Storage(format!("Corrupt store {}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(RollCallError::Storage(format!("{}: {e}", self.path.display()))),
        }
    }

    async fn save(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RollCallError::Storage(format!("{}: {e}", parent.display())))?;
        }

        let data = serde_json::to_vec_pretty(entries)
            .map_err(|e| RollCallError::Storage(e.to_string()))?;
        tokio::fs::write(&self.path, data)
            .await
            .map_err(|e| RollCallError::Storage(format!("{}: {e}", self.path.display())))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&self.path, perms)
                .await
                .map_err(|e| RollCallError::Storage(e.to_string()))?;
        }

        Ok(())
    }
}

#[async_trait]
impl SecureStorage for FileSecureStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        if entries.remove(key).is_some() {
            self.save(&entries).await?;
        }
        Ok(())
    }
}

/// Process-local storage; nothing survives a restart
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecureStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}
