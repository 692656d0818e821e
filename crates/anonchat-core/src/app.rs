use std::sync::Arc;

use tracing::info;

use crate::{
    config::Config,
    domain::{Invitation, Message, Session},
    errors::Error,
    gateway::ChatGateway,
    invites::InvitationTracker,
    session::SessionManager,
    sync::{MessageFeed, MessageSynchronizer},
    Result,
};

/// Profile counters derived from local state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileStats {
    /// Messages in the feed attributed to the current nickname.
    pub messages_sent: usize,
    /// Local invitations, any status.
    pub invitations_sent: usize,
}

/// Application facade: ties the session lifecycle to the two poll loops.
///
/// join/leave are the joined/landing transitions; both loops are started and
/// torn down here so no stale timer survives an identity change.
pub struct ChatApp {
    sessions: SessionManager,
    sync: MessageSynchronizer,
    invites: InvitationTracker,
}

impl ChatApp {
    pub fn new(cfg: &Config, gateway: Arc<dyn ChatGateway>) -> Self {
        Self {
            sessions: SessionManager::new(gateway.clone()),
            sync: MessageSynchronizer::new(gateway.clone(), cfg.poll_interval),
            invites: InvitationTracker::new(
                gateway,
                cfg.app_url.clone(),
                cfg.invite_text.clone(),
                cfg.invite_poll_interval,
            ),
        }
    }

    /// Register and enter the joined state: fresh feed, both poll loops
    /// running under the new session.
    pub async fn join(&self, nickname: &str) -> Result<Session> {
        let session = self.sessions.join(nickname).await?;
        self.sync.feed().clear().await;
        self.invites.clear().await;
        self.sync.start().await;
        self.invites.start(session.clone()).await;
        Ok(session)
    }

    /// Back to landing: both loops torn down (in-flight polls discarded),
    /// local state cleared. Nothing persists across a rejoin.
    pub async fn leave(&self) {
        self.sync.stop().await;
        self.invites.stop().await;
        self.sessions.leave().await;
        self.sync.feed().clear().await;
        self.invites.clear().await;
        info!("left the chat");
    }

    /// Re-register under a new nickname. The message loop is identity-free
    /// and keeps running; the invitation loop is scoped to the user id, so the
    /// old loop is cancelled before the swap (none of its in-flight polls can
    /// land under the new session) and a fresh one starts afterwards.
    pub async fn change_nickname(&self, nickname: &str) -> Result<Session> {
        self.invites.stop().await;

        let session = match self.sessions.change_nickname(nickname).await {
            Ok(session) => session,
            Err(e) => {
                // The previous session stays active; resume its loop.
                if let Some(old) = self.sessions.current().await {
                    self.invites.start(old).await;
                }
                return Err(e);
            }
        };

        self.invites.clear().await;
        self.invites.start(session.clone()).await;
        Ok(session)
    }

    pub async fn send_message(&self, text: &str) -> Result<Message> {
        let session = self
            .sessions
            .current()
            .await
            .ok_or_else(|| Error::Send("no active session".to_string()))?;
        self.sync.send_message(&session, text).await
    }

    pub async fn invite(&self, telegram_username: &str) -> Result<Invitation> {
        let session = self
            .sessions
            .current()
            .await
            .ok_or_else(|| Error::Invite("no active session".to_string()))?;
        self.invites.invite(&session, telegram_username).await
    }

    pub async fn session(&self) -> Option<Session> {
        self.sessions.current().await
    }

    pub fn feed(&self) -> Arc<MessageFeed> {
        self.sync.feed()
    }

    pub async fn invitations(&self) -> Vec<Invitation> {
        self.invites.snapshot().await
    }

    pub async fn stats(&self) -> ProfileStats {
        let Some(session) = self.sessions.current().await else {
            return ProfileStats::default();
        };
        let messages_sent = self
            .sync
            .feed()
            .snapshot()
            .await
            .iter()
            .filter(|m| m.nickname == session.nickname)
            .count();
        ProfileStats {
            messages_sent,
            invitations_sent: self.invites.sent_count().await,
        }
    }
}
