use thiserror::Error;

#[derive(Error, Debug)]
pub enum PeakError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("no elevation sample at ({latitude}, {longitude})")]
    OutOfBounds { latitude: f64, longitude: f64 },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for PeakError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PeakError::Network(format!("timed out: {e}"))
        } else {
            PeakError::Network(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, PeakError>;
