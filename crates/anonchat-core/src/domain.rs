use serde::{Deserialize, Deserializer, Serialize};

/// Server-assigned user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Server-assigned message id (numeric, monotonically increasing).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i64);

/// Server-assigned invitation id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvitationId(pub i64);

/// The active identity of this client instance.
///
/// At most one exists at a time, owned by the session manager. Replaced
/// wholesale on a nickname change (the backend assigns identity per call).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub nickname: String,
}

/// A chat message as the server holds it. Never mutated once accepted;
/// `id` and `timestamp` are server-assigned and trusted over any local guess.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub nickname: String,
    pub text: String,
    #[serde(default, deserialize_with = "de_epoch_millis")]
    pub timestamp: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Accepted,
}

/// An invitation row as the server returns it (snake_case on the wire).
/// Status moves pending -> accepted server-side; the local copy always
/// mirrors the last-fetched server value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: InvitationId,
    pub telegram_username: String,
    pub invite_link: String,
    pub status: InviteStatus,
    #[serde(default, deserialize_with = "de_epoch_millis")]
    pub timestamp: i64,
}

/// Epoch-millis fields arrive as an integer, a float (`EXTRACT(EPOCH ...) *
/// 1000`), or a decimal serialized as a string, depending on the backend
/// code path. Accept all three and truncate to whole milliseconds.
fn de_epoch_millis<'de, D>(de: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct MillisVisitor;

    impl<'de> serde::de::Visitor<'de> for MillisVisitor {
        type Value = i64;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("epoch milliseconds as integer, float or numeric string")
        }

        fn visit_i64<E>(self, v: i64) -> std::result::Result<i64, E>
        where
            E: serde::de::Error,
        {
            Ok(v)
        }

        fn visit_u64<E>(self, v: u64) -> std::result::Result<i64, E>
        where
            E: serde::de::Error,
        {
            Ok(v as i64)
        }

        fn visit_f64<E>(self, v: f64) -> std::result::Result<i64, E>
        where
            E: serde::de::Error,
        {
            Ok(v as i64)
        }

        fn visit_str<E>(self, v: &str) -> std::result::Result<i64, E>
        where
            E: serde::de::Error,
        {
            v.trim()
                .parse::<f64>()
                .map(|f| f as i64)
                .map_err(|_| E::custom(format!("invalid epoch millis: {v}")))
        }
    }

    de.deserialize_any(MillisVisitor)
}
