use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Uniform success envelope returned by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub data: T,
    pub message: String,
    pub success: bool,
}

impl<T> ApiResponse<T> {
    pub fn new(status_code: u16, data: T, message: impl Into<String>) -> Self {
        Self {
            status_code,
            data,
            message: message.into(),
            success: status_code < 400,
        }
    }
}

/// Error envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub message: String,
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Public representation of an account.
///
/// Built from the storage record with the credential fields left out, so there is
/// no way to serialize a password hash or refresh token through this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request payload for POST /api/v1/users/login
///
/// Either identifier is enough; when both are given an account matching
/// either one is accepted.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginPayload {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: String,
}

/// Response for successful login
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: AccountView,
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// Request payload for POST /api/v1/users/refresh-token
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RefreshTokenPayload {
    #[serde(rename = "refreshToken", default)]
    pub refresh_token: Option<String>,
}

/// Response for POST /api/v1/users/refresh-token
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPairResponse {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// Change password request
#[derive(Debug, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(rename = "oldPassword", default)]
    pub old_password: String,
    #[serde(rename = "newPassword", default)]
    pub new_password: String,
}

/// Update account details request
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateAccountDetailsRequest {
    #[serde(rename = "fullName", default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}
