use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{
    ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest, TokenResponse,
};
use crate::{
    error::ServiceError,
    state::AppState,
    users::{
        dto::{MessageResponse, PublicProfile},
        service::Registration,
    },
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/user/:id", get(get_user))
        .route("/auth/user/by-email/:email", get(get_user_by_email))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(raw: &str) -> Result<String, ServiceError> {
    let email = raw.trim().to_lowercase();
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(ServiceError::Validation("invalid email".into()));
    }
    Ok(email)
}

fn require_password(password: &str) -> Result<(), ServiceError> {
    if password.is_empty() {
        return Err(ServiceError::Validation("password is required".into()));
    }
    Ok(())
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<TokenResponse>, ServiceError> {
    let email = normalize_email(&payload.email)?;
    require_password(&payload.password)?;

    let token = state
        .accounts
        .register(Registration {
            email,
            password: payload.password,
            name: payload.name,
            surname: payload.surname,
            phone_number: payload.phone_number,
            birth_date: payload.birth_date,
            gender: payload.gender,
        })
        .await?;
    Ok(Json(TokenResponse { token }))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ServiceError> {
    let identifier = payload.email_or_phone.trim();
    if identifier.is_empty() {
        return Err(ServiceError::Validation("email_or_phone is required".into()));
    }
    // Emails are stored lowercased; phone numbers as given.
    let identifier = if identifier.contains('@') {
        identifier.to_lowercase()
    } else {
        identifier.to_owned()
    };

    let token = state.accounts.login(&identifier, &payload.password).await?;
    Ok(Json(TokenResponse { token }))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    let email = normalize_email(&payload.email)?;
    state.accounts.forgot_password(&email).await?;
    Ok(Json(MessageResponse {
        message: "verification code sent",
    }))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    let email = normalize_email(&payload.email)?;
    require_password(&payload.password)?;

    state
        .accounts
        .reset_password(&email, payload.code.trim(), &payload.password)
        .await?;
    info!("password reset via code");
    Ok(Json(MessageResponse {
        message: "password updated",
    }))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicProfile>, ServiceError> {
    Ok(Json(state.accounts.profile(id).await?))
}

#[instrument(skip(state))]
pub async fn get_user_by_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<PublicProfile>, ServiceError> {
    let email = normalize_email(&email)?;
    Ok(Json(state.accounts.profile_by_email(&email).await?))
}
