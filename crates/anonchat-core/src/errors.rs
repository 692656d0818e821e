/// Core error type for the chat client.
///
/// The adapter crate maps transport failures into `External`; components wrap
/// those into the variant for their operation so callers can react per
/// failure class (retryable poll vs user-visible send failure).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("identity error: {0}")]
    Identity(String),

    #[error("send error: {0}")]
    Send(String),

    #[error("invite error: {0}")]
    Invite(String),

    #[error("sync error: {0}")]
    Sync(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
