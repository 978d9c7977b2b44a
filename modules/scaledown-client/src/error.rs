use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScaledownError>;

#[derive(Debug, Error)]
pub enum ScaledownError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response shape: {0}")]
    Shape(String),
}

impl From<reqwest::Error> for ScaledownError {
    fn from(err: reqwest::Error) -> Self {
        ScaledownError::Network(err.to_string())
    }
}
