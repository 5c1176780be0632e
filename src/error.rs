use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors the widget core can surface to its embedder.
///
/// Transport failures on the realtime channel never appear here; the channel
/// logs them and either reconnects or goes quiet (see `realtime::client`).
#[derive(Debug, Error)]
pub enum Error {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("session store failure: {0}")]
    Session(String),

    #[error("{0}")]
    Validation(String),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Session(e.to_string())
    }
}
