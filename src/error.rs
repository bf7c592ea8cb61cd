// Error types shared by the library modules. The CLI layer wraps these
// in `anyhow` errors; everything below `ui` returns `Result<T>`.

use thiserror::Error;

/// Every failure the SharePoint client can report.
#[derive(Error, Debug)]
pub enum SharepointError {
    /// One of the authentication round-trips did not yield what it should.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The service answered with a structured `odata.error`; message kept verbatim.
    #[error("{0}")]
    Remote(String),

    /// The service answered with a non-empty body that is not JSON.
    #[error("Unknown error: {0}")]
    UnknownService(String),

    /// A chunk request failed; the transfer was aborted at `offset`.
    #[error("upload aborted at offset {offset}: {source}")]
    Transfer {
        offset: u64,
        #[source]
        source: Box<SharepointError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The request never produced a response (DNS, TLS, connection reset...).
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for SharepointError {
    fn from(e: reqwest::Error) -> Self {
        SharepointError::Http(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SharepointError>;
