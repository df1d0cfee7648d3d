use thiserror::Error;

#[derive(Debug, Error)]
pub enum UserLimitError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl UserLimitError {
    /// Short, stable error code for CLI output and log fields.
    pub fn code(&self) -> &'static str {
        match self {
            UserLimitError::Config(_) => "CONFIG_ERROR",
            UserLimitError::Io(_) => "IO_ERROR",
            UserLimitError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, UserLimitError>;
