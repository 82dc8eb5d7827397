use thiserror::Error;

#[derive(Debug, Error)]
pub enum MastodonError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Token exchange failed: {0}")]
    AuthExchange(String),

    #[error("OAuth state mismatch on callback")]
    StateMismatch,

    #[error("API error ({status_code}): {body}")]
    Api { status_code: u16, body: String },

    #[error("App registration failed ({status_code}): {body}")]
    Registration { status_code: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MastodonError {
    pub fn user_message(&self) -> &'static str {
        match self {
            MastodonError::Configuration(_) => "The application is misconfigured.",
            MastodonError::AuthExchange(_) => "Sign-in was rejected by the instance. Please try again.",
            MastodonError::StateMismatch => "Sign-in request could not be verified. Please start over.",
            MastodonError::Api { status_code: 401, .. } => {
                "Your session is no longer authorized. Please sign in again."
            }
            MastodonError::Api { .. } => "The instance returned an error. Please try again later.",
            MastodonError::Registration { .. } => "App registration was rejected by the instance.",
            MastodonError::Network(_) => "Network error. Check your connection.",
            MastodonError::Io(_) => "Could not read or write a local file.",
            MastodonError::Json(_) => "The instance sent an unexpected response.",
        }
    }

    /// HTTP status returned by the instance, if this error carries one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            MastodonError::Api { status_code, .. }
            | MastodonError::Registration { status_code, .. } => Some(*status_code),
            MastodonError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<url::ParseError> for MastodonError {
    fn from(e: url::ParseError) -> Self {
        MastodonError::Configuration(format!("invalid URL: {e}"))
    }
}

pub type MastodonResult<T> = Result<T, MastodonError>;
