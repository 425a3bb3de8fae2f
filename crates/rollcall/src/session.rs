//! Authentication state, persisted in secure storage.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;

use rollcall_common::constants::storage_keys;
use rollcall_common::{AuthSession, RegisterRequest, Result, RollCallError, User};

use crate::api::{AttendanceApi, SessionEvent};
use crate::device::SecureStorage;

/// In-memory view of the signed-in student
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub user: Option<User>,
    pub token: Option<String>,
    pub is_authenticated: bool,
    /// Set when the session was established in this process
    pub signed_in_at: Option<DateTime<Utc>>,
}

/// Owns the auth token: storage, memory, and the API client's copy
pub struct SessionStore {
    api: Arc<dyn AttendanceApi>,
    storage: Arc<dyn SecureStorage>,
    state: RwLock<SessionState>,
}

impl SessionStore {
    pub fn new(api: Arc<dyn AttendanceApi>, storage: Arc<dyn SecureStorage>) -> Self {
        Self {
            api,
            storage,
            state: RwLock::new(SessionState::default()),
        }
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.is_authenticated
    }

    pub async fn login(&self, identifier: &str, password: &str) -> Result<User> {
        let session = self.api.login(identifier, password).await?;
        self.establish(session).await
    }

    pub async fn register(&self, form: &RegisterRequest) -> Result<User> {
        let session = self.api.register(form).await?;
        self.establish(session).await
    }

    /// Returns the server's confirmation message
    pub async fn forgot_password(&self, identifier: &str) -> Result<String> {
        if identifier.trim().is_empty() {
            return Err(RollCallError::InvalidInput(
                "Enter your email or student ID".into(),
            ));
        }
        self.api.forgot_password(identifier.trim()).await
    }

    /// Clears everything. Never fails; storage errors are only logged.
    pub async fn logout(&self) {
        for key in [storage_keys::TOKEN, storage_keys::USER] {
            if let Err(e) = self.storage.delete(key).await {
                tracing::warn!(key, error = %e, "Failed to clear stored credential");
            }
        }
        self.api.set_auth_token(None).await;

        let mut state = self.state.write().await;
        if state.is_authenticated {
            tracing::info!(user_id = ?state.user.as_ref().map(|u| &u.id), "Signed out");
        }
        *state = SessionState::default();
    }

    /// Restore a persisted session. Unreadable credentials force a logout.
    pub async fn check_auth_state(&self) -> bool {
        match self.load_persisted().await {
            Ok(Some((token, user))) => {
                tracing::info!(user_id = %user.id, "Restored session");
                self.api.set_auth_token(Some(token.clone())).await;
                *self.state.write().await = SessionState {
                    user: Some(user),
                    token: Some(token),
                    is_authenticated: true,
                    signed_in_at: None,
                };
                true
            }
            Ok(None) => {
                tracing::debug!("No stored session");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Stored session unreadable, signing out");
                self.logout().await;
                false
            }
        }
    }

    /// Replace the profile in memory and storage
    pub async fn update_user(&self, user: User) -> Result<()> {
        let encoded = serde_json::to_string(&user)
            .map_err(|e| RollCallError::Storage(format!("Failed to encode user: {e}")))?;
        self.storage.set(storage_keys::USER, &encoded).await?;
        self.state.write().await.user = Some(user);
        Ok(())
    }

    /// Sign out whenever the API reports an expired token
    pub fn watch_unauthorized(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<SessionEvent>,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::Unauthorized) => {
                        tracing::warn!("Server rejected token, signing out");
                        store.logout().await;
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Session events lagged, signing out");
                        store.logout().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn establish(&self, session: AuthSession) -> Result<User> {
        let AuthSession { token, user } = session;
        let encoded = serde_json::to_string(&user)
            .map_err(|e| RollCallError::Storage(format!("Failed to encode user: {e}")))?;

        self.storage.set(storage_keys::TOKEN, &token).await?;
        self.storage.set(storage_keys::USER, &encoded).await?;
        self.api.set_auth_token(Some(token.clone())).await;

        tracing::info!(user_id = %user.id, "Signed in");

        *self.state.write().await = SessionState {
            user: Some(user.clone()),
            token: Some(token),
            is_authenticated: true,
            signed_in_at: Some(Utc::now()),
        };
        Ok(user)
    }

    async fn load_persisted(&self) -> Result<Option<(String, User)>> {
        let token = self.storage.get(storage_keys::TOKEN).await?;
        let user = self.storage.get(storage_keys::USER).await?;

        match (token, user) {
            (Some(token), Some(raw)) => {
                let user = serde_json::from_str(&raw)
                    .map_err(|e| RollCallError::Storage(format!("Corrupt stored user: {e}")))?;
                Ok(Some((token, user)))
            }
            _ => Ok(None),
        }
    }
}
