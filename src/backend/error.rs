use thiserror::Error;

/// Failures from the hosted backend or the plumbing that reaches it.
#[derive(Debug, Error)]
pub enum Error {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("websocket error: {0}")]
    Websocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("realtime link lost: {0}")]
    Realtime(String),

    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sign-in failed: {0}")]
    Auth(String),

    #[error("session expired")]
    SessionExpired,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the backend rejected our token and the session is gone.
    pub fn is_session_expired(&self) -> bool {
        matches!(
            self,
            Error::SessionExpired | Error::Api { status: 401, .. }
        )
    }
}
