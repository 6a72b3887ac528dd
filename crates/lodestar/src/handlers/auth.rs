use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::dev::Payload;
use actix_web::http::{header, StatusCode};
use actix_web::{web, FromRequest, HttpRequest, HttpResponse, HttpResponseBuilder};
use entity::account;
use futures::future::LocalBoxFuture;
use lodestar_core::models::{ApiResponse, RefreshTokenPayload, TokenPairResponse};
use lodestar_core::token::{token_digest, TokenPair};
use lodestar_core::validation::non_blank;

use crate::{
    app_state::AppState,
    error::{ApiError, ApiResult},
    models::token_subject,
    store::AccountChanges,
};

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// The account behind a valid access token.
///
/// Used as a handler argument on every route that needs a logged-in caller.
/// The token comes from the `accessToken` cookie or an `Authorization: Bearer`
/// header; the account is reloaded from the store so revoked or missing
/// accounts are rejected immediately.
pub struct AuthenticatedAccount(pub account::Model);

impl FromRequest for AuthenticatedAccount {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let app_state = req.app_data::<web::Data<AppState>>().cloned();
        let token = get_access_token(req);

        Box::pin(async move {
            let app_state =
                app_state.ok_or_else(|| ApiError::internal("AppState is not registered"))?;
            let token = token.ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;

            let claims = app_state.tokens.verify_access(&token).map_err(|e| {
                log::warn!("Rejected access token: {}", e);
                ApiError::unauthorized("Invalid access token")
            })?;

            let account = app_state
                .accounts
                .find_by_id(&claims.sub)
                .await?
                .ok_or_else(|| {
                    log::warn!("Access token references missing account: {}", claims.sub);
                    ApiError::unauthorized("Invalid access token")
                })?;

            Ok(AuthenticatedAccount(account))
        })
    }
}

/// Helper: Extract access token from cookie or bearer header
pub fn get_access_token(req: &HttpRequest) -> Option<String> {
    if let Some(cookie) = req.cookie(ACCESS_TOKEN_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Helper: Issue a fresh token pair and make its refresh token the only one
/// accepted for the account. Only the digest of the refresh token is stored.
/// Returns the updated record.
pub async fn start_session(
    app_state: &AppState,
    account: &account::Model,
) -> ApiResult<(TokenPair, account::Model)> {
    let pair = app_state
        .tokens
        .issue_pair(&token_subject(account))
        .map_err(|e| ApiError::internal(format!("Failed to issue tokens: {e}")))?;

    let updated = app_state
        .accounts
        .update_by_id(
            &account.id,
            AccountChanges::refresh_token(Some(token_digest(&pair.refresh_token))),
        )
        .await?
        .ok_or_else(|| {
            ApiError::internal(format!("Account vanished while starting session: {}", account.id))
        })?;

    Ok((pair, updated))
}

fn session_cookie(name: &'static str, value: String, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build(name, value)
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .max_age(Duration::seconds(max_age_secs))
        .finish()
}

fn cleared_cookie(name: &'static str) -> Cookie<'static> {
    session_cookie(name, String::new(), 0)
}

/// Helper: Response builder with both session cookies set
pub fn with_session_cookies(
    status: StatusCode,
    app_state: &AppState,
    pair: &TokenPair,
) -> HttpResponseBuilder {
    let mut builder = HttpResponse::build(status);
    builder
        .cookie(session_cookie(
            ACCESS_TOKEN_COOKIE,
            pair.access_token.clone(),
            app_state.tokens.access_ttl(),
        ))
        .cookie(session_cookie(
            REFRESH_TOKEN_COOKIE,
            pair.refresh_token.clone(),
            app_state.tokens.refresh_ttl(),
        ));
    builder
}

/// POST /api/v1/users/refresh-token
/// Rotate the session: exchange the current refresh token for a new pair
pub async fn refresh_token(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    body: Option<web::Json<RefreshTokenPayload>>,
) -> ApiResult<HttpResponse> {
    let from_cookie = req
        .cookie(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty());
    let from_body = body.and_then(|b| non_blank(b.refresh_token.as_deref()).map(str::to_string));

    let Some(incoming) = from_cookie.or(from_body) else {
        return Err(ApiError::unauthorized("Unauthorized request"));
    };

    let claims = app_state.tokens.verify_refresh(&incoming).map_err(|e| {
        log::warn!("Rejected refresh token: {}", e);
        ApiError::unauthorized("Invalid refresh token")
    })?;

    let account = app_state
        .accounts
        .find_by_id(&claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid refresh token"))?;

    // Only the most recently issued token is accepted; anything else was
    // already rotated away or revoked by logout.
    let presented = token_digest(&incoming);
    if account.refresh_token.as_deref() != Some(presented.as_str()) {
        log::warn!("Stale refresh token presented for account: {}", account.id);
        return Err(ApiError::unauthorized("Refresh token is expired or used"));
    }

    let pair = app_state
        .tokens
        .issue_pair(&token_subject(&account))
        .map_err(|e| ApiError::internal(format!("Failed to issue tokens: {e}")))?;

    // The swap only succeeds while the stored digest is still the presented one,
    // so concurrent requests with the same token cannot both rotate it.
    let rotated = app_state
        .accounts
        .rotate_refresh_token(&account.id, &presented, &token_digest(&pair.refresh_token))
        .await?;
    if !rotated {
        log::warn!("Refresh token for account {} was used concurrently", account.id);
        return Err(ApiError::unauthorized("Refresh token is expired or used"));
    }

    log::info!("Session refreshed for account: {}", account.id);

    Ok(with_session_cookies(StatusCode::OK, &app_state, &pair).json(ApiResponse::new(
        200,
        TokenPairResponse {
            access_token: pair.access_token.clone(),
            refresh_token: pair.refresh_token.clone(),
        },
        "Access token refreshed",
    )))
}

/// POST /api/v1/users/logout
/// Forget the stored refresh token and clear both cookies
pub async fn logout(
    app_state: web::Data<AppState>,
    AuthenticatedAccount(account): AuthenticatedAccount,
) -> ApiResult<HttpResponse> {
    app_state
        .accounts
        .update_by_id(&account.id, AccountChanges::refresh_token(None))
        .await?;

    log::info!("Account logged out: {}", account.id);

    Ok(HttpResponse::Ok()
        .cookie(cleared_cookie(ACCESS_TOKEN_COOKIE))
        .cookie(cleared_cookie(REFRESH_TOKEN_COOKIE))
        .json(ApiResponse::new(200, serde_json::json!({}), "User logged out")))
}
