use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::{domain::Session, errors::Error, gateway::ChatGateway, Result};

/// Owns the local identity for the lifetime of the app view.
///
/// At most one session is active at a time; every read of "current user"
/// goes through this component. `None` means the landing state.
pub struct SessionManager {
    gateway: Arc<dyn ChatGateway>,
    state: Mutex<Option<Session>>,
}

impl SessionManager {
    pub fn new(gateway: Arc<dyn ChatGateway>) -> Self {
        Self {
            gateway,
            state: Mutex::new(None),
        }
    }

    /// Register a nickname and store the returned identity as the active
    /// session. On failure the client stays in the landing state; no partial
    /// session is retained.
    pub async fn join(&self, nickname: &str) -> Result<Session> {
        let session = self.register(nickname).await?;
        info!(
            "joined as {} (user id {})",
            session.nickname, session.user_id.0
        );
        *self.state.lock().await = Some(session.clone());
        Ok(session)
    }

    /// Re-register under a new nickname, replacing the active session
    /// wholesale. The backend assigns identity per call, so this is
    /// indistinguishable from joining as a new user; message and invitation
    /// history is not reattributed to the new identity.
    ///
    /// On failure the previous session stays active.
    pub async fn change_nickname(&self, new_nickname: &str) -> Result<Session> {
        if self.state.lock().await.is_none() {
            return Err(Error::Identity("no active session".to_string()));
        }

        let session = self.register(new_nickname).await?;
        info!(
            "nickname changed to {} (user id {})",
            session.nickname, session.user_id.0
        );
        *self.state.lock().await = Some(session.clone());
        Ok(session)
    }

    /// Drop the active session (back to the landing state).
    pub async fn leave(&self) {
        *self.state.lock().await = None;
    }

    pub async fn current(&self) -> Option<Session> {
        self.state.lock().await.clone()
    }

    pub async fn is_joined(&self) -> bool {
        self.state.lock().await.is_some()
    }

    async fn register(&self, nickname: &str) -> Result<Session> {
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(Error::Identity("nickname must not be empty".to_string()));
        }

        self.gateway
            .register(nickname)
            .await
            .map_err(|e| Error::Identity(format!("registration failed: {e}")))
    }
}
