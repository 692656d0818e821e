use async_trait::async_trait;

use crate::{
    domain::{Invitation, Message, Session, UserId},
    Result,
};

/// Hexagonal port for the chat backend.
///
/// The HTTP adapter lives in its own crate; core logic and tests talk to this
/// trait only. Inputs are assumed pre-validated (trimmed, non-empty) by the
/// calling component.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Register a nickname and receive the identity for this client instance.
    ///
    /// Registration is stateless per call: the backend upserts by nickname,
    /// so a repeated nickname may map to an existing row while a new one
    /// always yields a fresh user id.
    async fn register(&self, nickname: &str) -> Result<Session>;

    /// Fetch the full, authoritative message list.
    async fn fetch_messages(&self) -> Result<Vec<Message>>;

    /// Submit a message; the returned `Message` carries the server-assigned
    /// id and timestamp.
    async fn send_message(&self, session: &Session, text: &str) -> Result<Message>;

    /// Fetch the invitation list scoped to one user, newest first.
    async fn fetch_invitations(&self, user_id: UserId) -> Result<Vec<Invitation>>;

    /// Submit an invitation; the returned row starts out `pending`.
    async fn send_invite(
        &self,
        session: &Session,
        telegram_username: &str,
        invite_link: &str,
    ) -> Result<Invitation>;
}
