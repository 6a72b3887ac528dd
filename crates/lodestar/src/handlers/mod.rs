pub mod account;
pub mod auth;


pub use auth::{logout, refresh_token, AuthenticatedAccount};

use actix_multipart::form::MultipartForm;
use actix_web::{http::StatusCode, web, HttpResponse};
use lodestar_core::models::{ApiResponse, LoginPayload, LoginResponse};
use lodestar_core::validation::{self, blank_fields, non_blank};

use crate::{
    app_state::AppState,
    error::{ApiError, ApiResult},
    models::{account_view, text_value, uploaded_file, RegisterForm},
    store::NewAccount,
};

/// POST /api/v1/users/register
/// Create an account from a multipart form with a mandatory avatar
pub async fn register(
    app_state: web::Data<AppState>,
    MultipartForm(form): MultipartForm<RegisterForm>,
) -> ApiResult<HttpResponse> {
    let full_name = non_blank(text_value(&form.full_name));
    let email = non_blank(text_value(&form.email));
    let username = non_blank(text_value(&form.username));
    // Passwords are taken verbatim; only an all-whitespace value counts as blank.
    let password = text_value(&form.password).filter(|p| !validation::is_blank(p));

    // 1. Required fields
    let (Some(full_name), Some(email), Some(username), Some(password)) =
        (full_name, email, username, password)
    else {
        let missing = blank_fields(&[
            ("fullName", full_name),
            ("email", email),
            ("username", username),
            ("password", password),
        ]);
        return Err(ApiError::invalid_fields("All fields are required", &missing));
    };

    let username = validation::normalize_username(username);
    let email = validation::normalize_email(email);

    log::info!("Registration attempt for user: {}", username);

    // 2. Uniqueness
    if app_state
        .accounts
        .find_by_username_or_email(Some(&username), Some(&email))
        .await?
        .is_some()
    {
        log::warn!("Registration failed: username or email already exists: {}", username);
        return Err(ApiError::Conflict(
            "User with email or username already exists".to_string(),
        ));
    }

    // 3. Avatar is mandatory, cover image is not
    let avatar = uploaded_file(&form.avatar)
        .ok_or_else(|| ApiError::bad_request("Avatar file is required"))?;

    let avatar = app_state.media.upload(avatar.file.path()).await.map_err(|e| {
        log::error!("Avatar upload failed for {}: {}", username, e);
        ApiError::bad_request("Avatar file is required")
    })?;

    let cover_image = match uploaded_file(&form.cover_image) {
        Some(file) => match app_state.media.upload(file.file.path()).await {
            Ok(uploaded) => Some(uploaded),
            Err(e) => {
                log::warn!("Cover image upload failed for {}, continuing without: {}", username, e);
                None
            }
        },
        None => None,
    };

    // 4. Persist
    let password_hash = app_state
        .credentials
        .hash(password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {e}")))?;

    let created = app_state
        .accounts
        .create(NewAccount {
            username: username.clone(),
            email,
            full_name: full_name.to_string(),
            password_hash,
            avatar_url: avatar.url.clone(),
            cover_image_url: cover_image.as_ref().map(|c| c.url.clone()),
        })
        .await;

    let account_id = match created {
        Ok(id) => id,
        Err(e) => {
            // Nothing references the uploads now; drop them before reporting.
            let mut orphans = vec![avatar.url];
            orphans.extend(cover_image.map(|c| c.url));
            for url in orphans {
                if let Err(remove_err) = app_state.media.remove(&url).await {
                    log::warn!("Failed to remove orphaned upload {}: {}", url, remove_err);
                }
            }
            return Err(e.into());
        }
    };

    // 5. Re-read what was stored
    let account = app_state
        .accounts
        .find_by_id(&account_id)
        .await?
        .ok_or_else(|| {
            ApiError::internal(format!(
                "Something went wrong while registering the user: {account_id} not found after insert"
            ))
        })?;

    log::info!(
        "User registered successfully: {} (ID: {})",
        account.username,
        account.id
    );

    Ok(HttpResponse::Created().json(ApiResponse::new(
        201,
        account_view(&account),
        "User registered successfully",
    )))
}

/// POST /api/v1/users/login
/// Authenticates an account and sets session cookies
pub async fn login(
    app_state: web::Data<AppState>,
    payload: web::Json<LoginPayload>,
) -> ApiResult<HttpResponse> {
    let username = non_blank(payload.username.as_deref()).map(validation::normalize_username);
    let email = non_blank(payload.email.as_deref()).map(validation::normalize_email);

    if username.is_none() && email.is_none() {
        return Err(ApiError::bad_request("username or email is required"));
    }

    let identifier = username.as_deref().or(email.as_deref()).unwrap_or_default();
    log::info!("Login attempt for: {}", identifier);

    // 1. Resolve the account by either identifier
    let account = app_state
        .accounts
        .find_by_username_or_email(username.as_deref(), email.as_deref())
        .await?
        .ok_or_else(|| {
            log::warn!("Account not found for: {}", identifier);
            ApiError::NotFound("User does not exist".to_string())
        })?;

    // 2. Verify password
    let password_valid = app_state
        .credentials
        .verify(&payload.password, &account.password_hash)
        .map_err(|e| {
            ApiError::internal(format!(
                "Failed to verify password hash for account {}: {e}",
                account.id
            ))
        })?;

    if !password_valid {
        log::warn!("Invalid password for: {}", identifier);
        return Err(ApiError::unauthorized("Invalid user credentials"));
    }

    // 3. Create session tokens
    let (pair, account) = auth::start_session(&app_state, &account).await?;

    log::info!("Login successful for user: {}", account.username);

    // 4. Return tokens in body and cookies
    Ok(
        auth::with_session_cookies(StatusCode::OK, &app_state, &pair).json(ApiResponse::new(
            200,
            LoginResponse {
                user: account_view(&account),
                access_token: pair.access_token.clone(),
                refresh_token: pair.refresh_token.clone(),
            },
            "User logged in successfully",
        )),
    )
}
