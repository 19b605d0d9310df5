//! Account endpoints: registration, JWT login and self-service
//! profile management.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    auth::{hash_password, issue_token, verify_password, CurrentUser},
    error::{AppError, AppResult},
    models::{LoginRequest, RegisterRequest, UpdateMeRequest, UserOut},
    state::AppState,
};

const MIN_PASSWORD_CHARS: usize = 8;

fn validate_email(email: &str) -> AppResult<()> {
    let trimmed = email.trim();
    if trimmed.len() < 3 || !trimmed.contains('@') {
        return Err(AppError::validation("A valid email address is required."));
    }
    Ok(())
}

fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AppError::validation(
            "Password must be at least 8 characters long.",
        ));
    }
    Ok(())
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Response> {
    validate_email(&req.email)?;
    validate_password(&req.password)?;

    let hash = hash_password(&req.password)?;
    // Duplicate emails trip the UNIQUE constraint and come back as 400.
    let user = state
        .users
        .create(req.email.trim(), &hash, req.is_producer)
        .await?;
    info!("User registered successfully: {}", user.email);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "user": UserOut::from(user),
            "message": "Registration successful"
        })),
    )
        .into_response())
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Response> {
    let user = state
        .users
        .find_by_email(req.email.trim())
        .await?
        .filter(|user| verify_password(&req.password, &user.password_hash))
        .ok_or_else(|| {
            warn!("Failed login attempt");
            AppError::InvalidCredentials("Invalid email or password.")
        })?;

    let access = issue_token(&state.config, &user)?;
    Ok(Json(json!({
        "access": access,
        "user": UserOut::from(user)
    }))
    .into_response())
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> AppResult<Response> {
    let user = state
        .users
        .find_by_id(current.id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    Ok(Json(UserOut::from(user)).into_response())
}

pub async fn update_me(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(req): Json<UpdateMeRequest>,
) -> AppResult<Response> {
    let mut user = state
        .users
        .find_by_id(current.id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if let Some(email) = req.email {
        validate_email(&email)?;
        user.email = email.trim().to_string();
    }
    if let Some(is_producer) = req.is_producer {
        user.is_producer = is_producer;
    }

    let user = state.users.update_profile(&user).await?;
    Ok(Json(UserOut::from(user)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordBody {
    pub old_password: Option<String>,
    pub new_password: Option<String>,
    pub new_password_confirm: Option<String>,
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(req): Json<ChangePasswordBody>,
) -> AppResult<Response> {
    let (old, new, confirm) = match (&req.old_password, &req.new_password, &req.new_password_confirm)
    {
        (Some(old), Some(new), Some(confirm)) => (old, new, confirm),
        _ => return Err(AppError::validation("All fields are required.")),
    };
    if new != confirm {
        return Err(AppError::validation("The new passwords do not match."));
    }

    let user = state
        .users
        .find_by_id(current.id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    if !verify_password(old, &user.password_hash) {
        return Err(AppError::validation("Incorrect old password."));
    }
    validate_password(new)?;

    let hash = hash_password(new)?;
    state.users.update_password(user.id, &hash).await?;

    Ok(Json(json!({ "message": "Password changed successfully." })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct DeleteAccountBody {
    pub password: Option<String>,
}

pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(req): Json<DeleteAccountBody>,
) -> AppResult<Response> {
    let password = req.password.as_deref().ok_or_else(|| {
        AppError::validation("A password is required to confirm deletion.")
    })?;

    let user = state
        .users
        .find_by_id(current.id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    if !verify_password(password, &user.password_hash) {
        return Err(AppError::validation("Incorrect password."));
    }

    // Deleting the user cascades through the producer profile and all
    // of its children, so the caches must be flushed with it.
    let producer = state.producers.find_by_user(user.id).await?;
    state.users.delete(user.id).await?;
    state
        .cache
        .invalidate_producers(producer.map(|p| p.id))
        .await;
    info!("Account {} deleted", user.id);

    Ok(Json(json!({ "message": "Account deleted successfully." })).into_response())
}
