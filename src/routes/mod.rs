use axum::http::StatusCode;

use crate::error::CrmError;

pub mod health;
pub mod auth;
pub mod users;
pub mod leads;
pub mod distributions;
pub mod assignments;
pub mod sales;

// Common error mapper
pub fn internal_error<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("internal error: {e}"))
}

pub fn api_error(e: CrmError) -> (StatusCode, String) {
    match e {
        CrmError::NotFound { .. } => (StatusCode::NOT_FOUND, e.to_string()),
        CrmError::CapacityExceeded { .. } => (StatusCode::CONFLICT, e.to_string()),
        CrmError::Validation(_) => (StatusCode::BAD_REQUEST, e.to_string()),
        CrmError::AuthenticationFailed(_) => (StatusCode::UNAUTHORIZED, e.to_string()),
        CrmError::Persistence(inner) => internal_error(inner),
    }
}
