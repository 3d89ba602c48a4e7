use thiserror::Error;

/// Error taxonomy for the scan engine.
///
/// `Transport` and `Timeout` are always recoverable: the offending resource
/// is skipped and the scan moves on. `Parse` means a best-effort partial
/// result was used. `Config` is fatal only for a missing mandatory catalog
/// or an unwritable report destination; unresolved module names are reported
/// as warnings and never reach this type.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("connection failed for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request timed out for {url}")]
    Timeout { url: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("crawl store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// Transport failures and timeouts end one probe, never the scan.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ScanError::Transport { .. } | ScanError::Timeout { .. } | ScanError::Parse(_)
        )
    }
}
