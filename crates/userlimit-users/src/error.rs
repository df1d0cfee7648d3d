use thiserror::Error;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("User already exists: {0}")]
    AlreadyExists(String),
}

pub type Result<T> = std::result::Result<T, UserError>;
