// Error handling for the CWA reader

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CwaError>;

#[derive(Error, Debug)]
pub enum CwaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Truncated block: expected {expected} bytes, got {got}")]
    TruncatedBlock { expected: usize, got: usize },
}

impl From<CwaError> for std::io::Error {
    fn from(err: CwaError) -> Self {
        match err {
            CwaError::Io(e) => e,
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other.to_string()),
        }
    }
}
