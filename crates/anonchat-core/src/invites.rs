use std::{sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::{
    domain::{Invitation, Session, UserId},
    errors::Error,
    gateway::ChatGateway,
    sync::PollTask,
    Result,
};

const SHARE_URL_BASE: &str = "https://t.me/share/url";

/// Creates invitations and reconciles their status against the backend.
///
/// The local list is only ever appended by a confirmed `invite` or replaced
/// wholesale by `refresh`; status values always mirror the last-fetched
/// server state (the server decides pending vs accepted, including any
/// regression).
pub struct InvitationTracker {
    gateway: Arc<dyn ChatGateway>,
    app_url: String,
    invite_text: String,
    poll_interval: Duration,
    invitations: Arc<Mutex<Vec<Invitation>>>,
    task: Mutex<Option<PollTask>>,
}

impl InvitationTracker {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        app_url: impl Into<String>,
        invite_text: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            gateway,
            app_url: app_url.into(),
            invite_text: invite_text.into(),
            poll_interval,
            invitations: Arc::new(Mutex::new(Vec::new())),
            task: Mutex::new(None),
        }
    }

    /// Normalize the username (leading `@` stripped), build the share link
    /// and submit. The server-returned row (status pending) is appended on
    /// success; on failure the local list is untouched so the caller can let
    /// the user retry.
    pub async fn invite(&self, session: &Session, telegram_username: &str) -> Result<Invitation> {
        let username = telegram_username.trim().trim_start_matches('@');
        if username.is_empty() {
            return Err(Error::Invite(
                "telegram username must not be empty".to_string(),
            ));
        }

        let link = build_share_link(&self.app_url, &self.invite_text)?;
        let invitation = self
            .gateway
            .send_invite(session, username, &link)
            .await
            .map_err(|e| Error::Invite(format!("invitation submission failed: {e}")))?;

        self.invitations.lock().await.push(invitation.clone());
        Ok(invitation)
    }

    /// Fetch the invitation list scoped to the session's user id and replace
    /// local state, preserving server order (newest first) and server status
    /// values.
    pub async fn refresh(&self, session: &Session) -> Result<()> {
        let token = self
            .task
            .lock()
            .await
            .as_ref()
            .map(|t| t.cancel.clone())
            .unwrap_or_default();
        poll_invitations(
            self.gateway.as_ref(),
            &self.invitations,
            session.user_id,
            &token,
        )
        .await
    }

    /// Start periodic reconciliation scoped to this session. A previous loop
    /// (an older identity) is torn down first.
    pub async fn start(&self, session: Session) {
        self.stop().await;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let gateway = self.gateway.clone();
        let invitations = self.invitations.clone();
        let period = self.poll_interval;

        let handle = tokio::spawn(async move {
            let mut tick = interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        match poll_invitations(
                            gateway.as_ref(),
                            &invitations,
                            session.user_id,
                            &token,
                        )
                        .await
                        {
                            Ok(()) => debug!("invitation poll cycle complete"),
                            Err(e) => warn!("{e}"),
                        }
                    }
                }
            }
        });

        *self.task.lock().await = Some(PollTask { cancel, handle });
    }

    pub async fn stop(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.stop().await;
        }
    }

    pub async fn snapshot(&self) -> Vec<Invitation> {
        self.invitations.lock().await.clone()
    }

    /// "Invitations sent" counter: every local invitation, any status.
    pub async fn sent_count(&self) -> usize {
        self.invitations.lock().await.len()
    }

    pub async fn clear(&self) {
        self.invitations.lock().await.clear();
    }
}

async fn poll_invitations(
    gateway: &dyn ChatGateway,
    invitations: &Mutex<Vec<Invitation>>,
    user_id: UserId,
    cancel: &CancellationToken,
) -> Result<()> {
    let fetched = gateway
        .fetch_invitations(user_id)
        .await
        .map_err(|e| Error::Sync(format!("invitation poll failed: {e}")))?;

    // Stale-response suppression: the session may have changed while this
    // request was in flight.
    if cancel.is_cancelled() {
        return Ok(());
    }

    *invitations.lock().await = fetched;
    Ok(())
}

/// Telegram share link carrying the app URL and the invite text, both
/// query-encoded.
fn build_share_link(app_url: &str, invite_text: &str) -> Result<String> {
    let url = Url::parse_with_params(SHARE_URL_BASE, [("url", app_url), ("text", invite_text)])
        .map_err(|e| Error::Invite(format!("invalid share link: {e}")))?;
    Ok(url.into())
}
