use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The value failed validation; the stored value was left unchanged.
    #[error("Invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Unknown option: {0}")]
    UnknownKey(String),
}

pub type Result<T> = std::result::Result<T, OptionsError>;
