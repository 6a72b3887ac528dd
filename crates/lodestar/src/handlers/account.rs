use actix_multipart::form::{tempfile::TempFile, MultipartForm};
use actix_web::{web, HttpResponse};
use entity::account;
use lodestar_core::models::{ApiResponse, ChangePasswordRequest, UpdateAccountDetailsRequest};
use lodestar_core::validation::{self, blank_fields, non_blank};

use crate::{
    app_state::AppState,
    error::{ApiError, ApiResult},
    handlers::auth::AuthenticatedAccount,
    models::{account_view, uploaded_file, AvatarForm, CoverImageForm},
    store::AccountChanges,
};

/// GET /api/v1/users/current-user
pub async fn current_account(
    AuthenticatedAccount(account): AuthenticatedAccount,
) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(ApiResponse::new(
        200,
        account_view(&account),
        "User fetched successfully",
    )))
}

/// POST /api/v1/users/change-password
pub async fn change_password(
    app_state: web::Data<AppState>,
    AuthenticatedAccount(account): AuthenticatedAccount,
    payload: web::Json<ChangePasswordRequest>,
) -> ApiResult<HttpResponse> {
    let missing = blank_fields(&[
        ("oldPassword", Some(payload.old_password.as_str())),
        ("newPassword", Some(payload.new_password.as_str())),
    ]);
    if !missing.is_empty() {
        return Err(ApiError::invalid_fields(
            "Old and new password are required",
            &missing,
        ));
    }

    let password_valid = app_state
        .credentials
        .verify(&payload.old_password, &account.password_hash)
        .map_err(|e| ApiError::internal(format!("Failed to verify password: {e}")))?;

    if !password_valid {
        log::warn!("Wrong current password for account: {}", account.id);
        return Err(ApiError::bad_request("Invalid old password"));
    }

    let new_hash = app_state
        .credentials
        .hash(&payload.new_password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {e}")))?;

    let updated = update_or_missing(
        &app_state,
        &account.id,
        AccountChanges {
            password_hash: Some(new_hash),
            ..Default::default()
        },
    )
    .await?;

    log::info!("Password changed successfully for account: {}", account.id);

    Ok(HttpResponse::Ok().json(ApiResponse::new(
        200,
        account_view(&updated),
        "Password changed successfully",
    )))
}

/// PATCH /api/v1/users/update-account
pub async fn update_account_details(
    app_state: web::Data<AppState>,
    AuthenticatedAccount(account): AuthenticatedAccount,
    payload: web::Json<UpdateAccountDetailsRequest>,
) -> ApiResult<HttpResponse> {
    let full_name = non_blank(payload.full_name.as_deref());
    let email = non_blank(payload.email.as_deref());

    let (Some(full_name), Some(email)) = (full_name, email) else {
        let missing = blank_fields(&[("fullName", full_name), ("email", email)]);
        return Err(ApiError::invalid_fields("All fields are required", &missing));
    };

    let updated = update_or_missing(
        &app_state,
        &account.id,
        AccountChanges {
            full_name: Some(full_name.to_string()),
            email: Some(validation::normalize_email(email)),
            ..Default::default()
        },
    )
    .await?;

    log::info!("Account details updated for: {}", account.id);

    Ok(HttpResponse::Ok().json(ApiResponse::new(
        200,
        account_view(&updated),
        "Account details updated successfully",
    )))
}

/// PATCH /api/v1/users/avatar
pub async fn update_avatar(
    app_state: web::Data<AppState>,
    AuthenticatedAccount(account): AuthenticatedAccount,
    MultipartForm(form): MultipartForm<AvatarForm>,
) -> ApiResult<HttpResponse> {
    let updated = replace_image(
        &app_state,
        &account,
        uploaded_file(&form.avatar),
        ImageSlot::Avatar,
    )
    .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(
        200,
        account_view(&updated),
        "Avatar image updated successfully",
    )))
}

/// PATCH /api/v1/users/cover-image
pub async fn update_cover_image(
    app_state: web::Data<AppState>,
    AuthenticatedAccount(account): AuthenticatedAccount,
    MultipartForm(form): MultipartForm<CoverImageForm>,
) -> ApiResult<HttpResponse> {
    let updated = replace_image(
        &app_state,
        &account,
        uploaded_file(&form.cover_image),
        ImageSlot::CoverImage,
    )
    .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(
        200,
        account_view(&updated),
        "Cover image updated successfully",
    )))
}

#[derive(Debug, Clone, Copy)]
enum ImageSlot {
    Avatar,
    CoverImage,
}

impl ImageSlot {
    fn label(self) -> &'static str {
        match self {
            ImageSlot::Avatar => "avatar",
            ImageSlot::CoverImage => "cover image",
        }
    }

    fn missing_message(self) -> &'static str {
        match self {
            ImageSlot::Avatar => "Avatar file is missing",
            ImageSlot::CoverImage => "Cover image file is missing",
        }
    }

    fn current(self, account: &account::Model) -> Option<&str> {
        match self {
            ImageSlot::Avatar => Some(account.avatar_url.as_str()),
            ImageSlot::CoverImage => account.cover_image_url.as_deref(),
        }
    }

    fn changes(self, url: String) -> AccountChanges {
        match self {
            ImageSlot::Avatar => AccountChanges {
                avatar_url: Some(url),
                ..Default::default()
            },
            ImageSlot::CoverImage => AccountChanges {
                cover_image_url: Some(Some(url)),
                ..Default::default()
            },
        }
    }
}

/// Upload a replacement image, point the account at it, then drop the old one.
async fn replace_image(
    app_state: &AppState,
    account: &account::Model,
    file: Option<&TempFile>,
    slot: ImageSlot,
) -> ApiResult<account::Model> {
    let label = slot.label();

    let file = file.ok_or_else(|| ApiError::bad_request(slot.missing_message()))?;

    let uploaded = app_state.media.upload(file.file.path()).await.map_err(|e| {
        log::error!("Failed to upload {} for account {}: {}", label, account.id, e);
        ApiError::bad_request(format!("Error while uploading {label}"))
    })?;

    let updated =
        match update_or_missing(app_state, &account.id, slot.changes(uploaded.url.clone())).await {
            Ok(updated) => updated,
            Err(e) => {
                // Nothing references the new upload; drop it before reporting.
                if let Err(remove_err) = app_state.media.remove(&uploaded.url).await {
                    log::warn!("Failed to remove orphaned upload {}: {}", uploaded.url, remove_err);
                }
                return Err(e);
            }
        };

    // The old file is no longer referenced; failing to delete it only leaks storage.
    if let Some(previous) = slot.current(account).filter(|p| *p != uploaded.url) {
        if let Err(e) = app_state.media.remove(previous).await {
            log::warn!("Failed to remove previous {} {}: {}", label, previous, e);
        }
    }

    log::info!("Updated {} for account: {}", label, account.id);

    Ok(updated)
}

async fn update_or_missing(
    app_state: &AppState,
    account_id: &str,
    changes: AccountChanges,
) -> ApiResult<account::Model> {
    app_state
        .accounts
        .update_by_id(account_id, changes)
        .await?
        .ok_or_else(|| ApiError::NotFound("User does not exist".to_string()))
}
