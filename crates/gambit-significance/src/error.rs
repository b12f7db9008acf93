use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignificanceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Response did not contain a two-tailed P value")]
    MissingPValue,
    #[error("Invalid P value: {0}")]
    InvalidPValue(String),
    #[error("Contingency table has an empty cell")]
    EmptyCell,
    #[error("Statistics error: {0}")]
    Statistics(String),
}

pub type Result<T> = std::result::Result<T, SignificanceError>;
