use crate::weather::error::FormatError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("Request to {0} timed out")]
    Timeout(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}: {body}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Malformed response from {url}")]
    MalformedPayload {
        url: String,
        #[source]
        source: FormatError,
    },

    #[error("Failed to build HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    // Covers errors joining tokio blocking tasks
    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl DataSourceError {
    /// Classifies a transport error raised while talking to `url`.
    pub(crate) fn from_transport(url: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            DataSourceError::Timeout(url.to_string(), error)
        } else {
            DataSourceError::NetworkRequest(url.to_string(), error)
        }
    }
}
