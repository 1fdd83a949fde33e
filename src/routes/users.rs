// src/routes/users.rs

use axum::{extract::{Path, Query, State}, Json};
use serde::Deserialize;

use crate::{AppState, db, models::{User, UserResp, UserRole}};
use crate::services::users::{self, NewUser, UserPatch};
use super::{api_error, internal_error};

#[derive(Deserialize)]
pub struct ListUsersQ {
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(b): Json<NewUser>,
) -> Result<Json<UserResp>, (axum::http::StatusCode, String)> {
    let user = users::create_user(state.store.as_ref(), b).await.map_err(api_error)?;
    Ok(Json(user.into()))
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(q): Query<ListUsersQ>,
) -> Result<Json<Vec<UserResp>>, (axum::http::StatusCode, String)> {
    let mut rows: Vec<User> = db::fetch_all(state.store.as_ref()).await.map_err(internal_error)?;
    rows.retain(|u| {
        q.role.map_or(true, |r| u.role == r) && q.is_active.map_or(true, |a| u.is_active == a)
    });
    Ok(Json(rows.into_iter().map(UserResp::from).collect()))
}

pub async fn patch_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(b): Json<UserPatch>,
) -> Result<Json<UserResp>, (axum::http::StatusCode, String)> {
    let user = users::update_user(state.store.as_ref(), id, b).await.map_err(api_error)?;
    Ok(Json(user.into()))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, (axum::http::StatusCode, String)> {
    let deleted = users::remove_user(state.store.as_ref(), id).await.map_err(api_error)?;
    Ok(Json(serde_json::json!({"deleted": deleted})))
}
