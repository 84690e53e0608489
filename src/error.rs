use crate::util::truncate_message;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("request to {url} failed with HTTP {status}: {}", truncate_message(.message, 200))]
    Http {
        status: u16,
        url: String,
        message: String,
    },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode {what}: {detail}")]
    Decode { what: &'static str, detail: String },
    #[error("notification feed {url} closed without delivering anything")]
    FeedClosed { url: String },
    #[error("CSRF token mismatch")]
    CsrfMismatch,
    #[error("no access token in redirect")]
    MissingToken,
    #[error("contact not found: {0}")]
    NotFound(String),
    #[error("invalid standing {0}, expected one of -10, -5, 0, 5, 10")]
    InvalidStanding(i64),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status for errors that carry one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(error) => error.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    /// Request URL for errors that carry one.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Http { url, .. } | Self::FeedClosed { url } => Some(url),
            Self::Transport(error) => error.url().map(|url| url.as_str()),
            _ => None,
        }
    }

    /// Body of a failed response, or the error text otherwise.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Http { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
