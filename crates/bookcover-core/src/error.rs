use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoverError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Invalid cover image: {0}")]
    ImageError(String),

    #[error("Invalid cover payload: {0}")]
    PayloadError(String),

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
