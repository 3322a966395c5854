// src/error.rs
use thiserror::Error;

/// Ошибки HTTP-слоя. Никогда не ретраятся автоматически:
/// пользовательские действия показывают их, фоновые опросы только логируют.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Текст для панели уведомлений: сообщение сервера как есть.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Rejected { message, .. } => message.clone(),
            ApiError::Transport(e) if e.is_timeout() => "Request timed out".to_string(),
            ApiError::Transport(_) => "Network Error".to_string(),
            ApiError::Decode(_) => "Unexpected server response".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("invalid stream url: {0}")]
    Url(#[from] url::ParseError),
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(value))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PopoutError {
    #[error("could not open popout window: {0}")]
    Blocked(String),
    #[error("invalid popout locator: {0}")]
    InvalidLocator(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("select a symbol first")]
    MissingSymbol,
    #[error("volume must be greater than zero")]
    InvalidVolume,
    #[error("{0} order needs a price")]
    MissingPrice(&'static str),
    #[error("SL/TP cannot be negative")]
    NegativeStops,
    #[error("not a number: {0}")]
    InvalidNumber(String),
}
