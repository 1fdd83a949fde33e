// src/routes/auth.rs

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::{AppState, models::UserResp, services::session::Session};
use super::api_error;

#[derive(Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(b): Json<LoginBody>,
) -> Result<Json<UserResp>, (axum::http::StatusCode, String)> {
    let mut session = Session::new();
    let user = session
        .login(state.store.as_ref(), &b.email, &b.password, &state.audit)
        .await
        .map_err(api_error)?;
    Ok(Json(user.into()))
}
