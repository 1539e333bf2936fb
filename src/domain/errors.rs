use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RealtimeError {
    #[error("Not connected to the realtime endpoint")]
    NotConnected,
    #[error("User id must not be empty")]
    EmptyUserId,
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Broker error: {0}")]
    Broker(String),
    #[error("Gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Entity not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

impl RealtimeError {
    /// True for failures the connection manager recovers from on its own
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RealtimeError::Transport(_) | RealtimeError::Broker(_) | RealtimeError::NotConnected
        )
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(err: serde_json::Error) -> Self {
        RealtimeError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for RealtimeError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            RealtimeError::Api {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_timeout() {
            RealtimeError::Http(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            RealtimeError::Http(format!("Connection failed: {}", err))
        } else {
            RealtimeError::Http(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RealtimeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RealtimeError::Transport(err.to_string())
    }
}

pub type RealtimeResult<T> = Result<T, RealtimeError>;
