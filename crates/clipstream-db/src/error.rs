use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique index rejected the write (duplicate username/email, or the
    /// losing writer of a toggle race).
    #[error("duplicate key in {0}")]
    Duplicate(&'static str),

    #[error("document in {0} is not valid JSON: {1}")]
    Corrupt(&'static str, #[source] serde_json::Error),

    #[error("invalid filter: {0}")]
    BadFilter(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate(_))
    }
}

/// True when the underlying sqlite error is a unique/primary-key
/// constraint violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
