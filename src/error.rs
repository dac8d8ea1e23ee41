use thiserror::Error;

#[derive(Debug, Error)]
pub enum WikiError {
    #[error("search backend answered {status} for {method} {path}: {body}")]
    Backend {
        method: &'static str,
        path: String,
        status: u16,
        body: String,
    },
    #[error("search backend unreachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },
    #[error("index '{0}' does not exist")]
    MissingIndex(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("source '{0}' failed: {1}")]
    Source(String, String),
}

impl WikiError {
    /// A short hint shown under dashboard errors.
    pub fn hint(&self) -> &'static str {
        match self {
            WikiError::Unreachable { .. } => "make sure Elasticsearch is running at the configured url",
            WikiError::MissingIndex(_) => "run `viwiki index all` to build the indices",
            _ => "check the log output for details",
        }
    }
}
