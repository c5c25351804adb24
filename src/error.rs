use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisionError {
    #[error("Stale condition: {0}")]
    StaleCondition(String),

    #[error("Not found in snapshot: {0}")]
    NotFound(String),

    #[error("Transaction rejected by the agency")]
    TransactionRejected,

    #[error("Malformed value at {path}: expected {expected}")]
    Malformed { path: String, expected: &'static str },

    #[error("Agency unavailable: {0}")]
    StoreUnavailable(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected: {0}")]
    Unexpected(String),
}

impl SupervisionError {
    pub fn malformed(path: impl Into<String>, expected: &'static str) -> Self {
        Self::Malformed {
            path: path.into(),
            expected,
        }
    }

    /// Soft failures leave the job untouched for the next tick.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SupervisionError::StaleCondition(_)
                | SupervisionError::NotFound(_)
                | SupervisionError::TransactionRejected
                | SupervisionError::StoreUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SupervisionError>;
