// src/error.rs

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("document decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum CrmError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("employee {employee_id} already holds {target} active leads today")]
    CapacityExceeded { employee_id: i64, target: i64 },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

pub type CrmResult<T> = Result<T, CrmError>;
