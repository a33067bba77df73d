use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use super::dto::{
    ChangePasswordRequest, MessageResponse, PhotoResponse, PublicProfile, UpdateProfileRequest,
};
use super::service::ProfileUpdate;
use crate::{
    auth::extractors::AuthUser,
    error::ServiceError,
    photos::services::{remove_profile_photo, upload_profile_photo},
    state::AppState,
};

const MAX_PHOTO_BYTES: usize = 10 * 1024 * 1024;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/user/profile", get(get_profile).put(update_profile))
        .route("/user/change-password", post(change_password))
        .route(
            "/user/photo",
            post(upload_photo)
                .delete(delete_photo)
                .layer(DefaultBodyLimit::max(MAX_PHOTO_BYTES)),
        )
        .route("/user/delete", delete(delete_account))
}

#[instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<PublicProfile>, ServiceError> {
    Ok(Json(state.accounts.profile(user.user_id).await?))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.user_id))]
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<PublicProfile>, ServiceError> {
    let update = ProfileUpdate {
        name: payload.name,
        surname: payload.surname,
        birth_date: payload.birth_date,
        gender: payload.gender,
        address: payload.address,
        phone_number: payload.phone_number,
    };
    state.accounts.update_profile(user.user_id, update).await?;
    Ok(Json(state.accounts.profile(user.user_id).await?))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.user_id))]
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    if payload.new_password.is_empty() {
        return Err(ServiceError::Validation("new_password is required".into()));
    }
    state
        .accounts
        .change_password(user.user_id, &payload.old_password, &payload.new_password)
        .await?;
    Ok(Json(MessageResponse {
        message: "password changed",
    }))
}

/// POST /user/photo (multipart, field `file`)
#[instrument(skip(state, user, mp), fields(user_id = %user.user_id))]
pub async fn upload_photo(
    State(state): State<AppState>,
    user: AuthUser,
    mut mp: Multipart,
) -> Result<(StatusCode, Json<PhotoResponse>), ServiceError> {
    // refuse before reading the body
    if !state.accounts.user_exists(user.user_id).await? {
        return Err(ServiceError::NotFound);
    }
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| ServiceError::Validation(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_owned();
        let filename = field.file_name().map(str::to_owned);
        let body = field
            .bytes()
            .await
            .map_err(|e| ServiceError::Validation(e.body_text()))?;
        if body.is_empty() {
            return Err(ServiceError::Validation("file is empty".into()));
        }

        let url = upload_profile_photo(
            &state,
            user.user_id,
            body,
            &content_type,
            filename.as_deref(),
        )
        .await?;
        return Ok((StatusCode::CREATED, Json(PhotoResponse { url })));
    }

    warn!("upload without file field");
    Err(ServiceError::Validation("file is required".into()))
}

#[instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn delete_photo(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<MessageResponse>, ServiceError> {
    remove_profile_photo(&state, user.user_id).await?;
    Ok(Json(MessageResponse {
        message: "photo removed",
    }))
}

#[instrument(skip(state, user), fields(user_id = %user.user_id, role = %user.role))]
pub async fn delete_account(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<MessageResponse>, ServiceError> {
    state.accounts.delete_account(user.user_id).await?;
    Ok(Json(MessageResponse {
        message: "account deleted",
    }))
}
