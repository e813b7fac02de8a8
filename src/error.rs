use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    /// The connection provider could not hand out a connection.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("description segmentation failed: {0}")]
    Segment(String),
}

pub type Result<T> = std::result::Result<T, Error>;
