//! HTTP adapter for the chat backend (reqwest).
//!
//! The backend is a single function URL: GET dispatched via `action` query
//! parameters, POST via an `action` field in the JSON body. Responses are
//! JSON envelopes; a missing array field means an empty list, and non-2xx
//! responses carry `{"error": "..."}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;

use anonchat_core::{
    config::Config,
    domain::{Invitation, Message, Session, UserId},
    errors::Error,
    gateway::ChatGateway,
    Result,
};

#[derive(Clone, Debug)]
pub struct HttpGateway {
    base_url: String,
    http: reqwest::Client,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client build");
        Self {
            base_url: base_url.into(),
            http,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.api_url.clone(), cfg.request_timeout)
    }

    async fn get<T: DeserializeOwned>(&self, query: &[(&str, String)]) -> Result<T> {
        let resp = self
            .http
            .get(&self.base_url)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::External(format!("chat api request error: {e}")))?;
        decode(resp).await
    }

    async fn post<T: DeserializeOwned>(&self, body: serde_json::Value) -> Result<T> {
        let resp = self
            .http
            .post(&self.base_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::External(format!("chat api request error: {e}")))?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::External(format!(
            "chat api {status}: {}",
            error_text(&body)
        )));
    }

    resp.json::<T>()
        .await
        .map_err(|e| Error::External(format!("chat api json error: {e}")))
}

/// Pull the `error` field out of a failure body, falling back to a prefix of
/// the raw text.
fn error_text(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error")?.as_str().map(|s| s.to_string()))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    user: Option<UserRow>,
}

#[derive(Debug, Deserialize)]
struct UserRow {
    id: i64,
    nickname: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct InvitationsResponse {
    #[serde(default)]
    invitations: Vec<Invitation>,
}

#[derive(Debug, Deserialize)]
struct SendInviteResponse {
    invitation: Invitation,
}

#[async_trait]
impl ChatGateway for HttpGateway {
    async fn register(&self, nickname: &str) -> Result<Session> {
        let resp: RegisterResponse = self
            .post(json!({ "action": "register", "nickname": nickname }))
            .await?;
        let user = resp
            .user
            .ok_or_else(|| Error::External("register returned no user".to_string()))?;
        Ok(Session {
            user_id: UserId(user.id),
            nickname: user.nickname,
        })
    }

    async fn fetch_messages(&self) -> Result<Vec<Message>> {
        let resp: MessagesResponse = self.get(&[("action", "messages".to_string())]).await?;
        Ok(resp.messages)
    }

    async fn send_message(&self, session: &Session, text: &str) -> Result<Message> {
        let resp: SendMessageResponse = self
            .post(json!({
                "action": "send_message",
                "nickname": session.nickname,
                "text": text,
                "userId": session.user_id.0,
            }))
            .await?;
        Ok(resp.message)
    }

    async fn fetch_invitations(&self, user_id: UserId) -> Result<Vec<Invitation>> {
        let resp: InvitationsResponse = self
            .get(&[
                ("action", "invitations".to_string()),
                ("userId", user_id.0.to_string()),
            ])
            .await?;
        Ok(resp.invitations)
    }

    async fn send_invite(
        &self,
        session: &Session,
        telegram_username: &str,
        invite_link: &str,
    ) -> Result<Invitation> {
        let resp: SendInviteResponse = self
            .post(json!({
                "action": "send_invite",
                "telegramUsername": telegram_username,
                "inviteLink": invite_link,
                "userId": session.user_id.0,
            }))
            .await?;
        Ok(resp.invitation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anonchat_core::domain::InviteStatus;

    #[test]
    fn missing_array_fields_decode_as_empty_lists() {
        let messages: MessagesResponse = serde_json::from_str("{}").unwrap();
        assert!(messages.messages.is_empty());

        let invitations: InvitationsResponse = serde_json::from_str("{}").unwrap();
        assert!(invitations.invitations.is_empty());
    }

    #[test]
    fn register_envelope_tolerates_a_missing_user() {
        let resp: RegisterResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.user.is_none());

        let resp: RegisterResponse =
            serde_json::from_str(r#"{"user": {"id": 4, "nickname": "Fox"}}"#).unwrap();
        let user = resp.user.unwrap();
        assert_eq!(user.id, 4);
        assert_eq!(user.nickname, "Fox");
    }

    #[test]
    fn invitation_envelope_decodes_snake_case_rows() {
        let raw = r#"{
          "invitations": [
            {
              "id": 9,
              "telegram_username": "alice",
              "invite_link": "https://t.me/share/url?url=x",
              "status": "pending",
              "timestamp": "1700000000000.0"
            }
          ]
        }"#;
        let resp: InvitationsResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.invitations.len(), 1);
        assert_eq!(resp.invitations[0].status, InviteStatus::Pending);
        assert_eq!(resp.invitations[0].timestamp, 1_700_000_000_000);
    }

    #[test]
    fn error_text_prefers_the_error_field() {
        assert_eq!(error_text(r#"{"error": "Nickname required"}"#), "Nickname required");
        assert_eq!(error_text("upstream timeout"), "upstream timeout");
        assert_eq!(error_text(r#"{"detail": "x"}"#), r#"{"detail": "x"}"#);
    }
}
