use actix_multipart::form::{tempfile::TempFile, text::Text, MultipartForm};
use chrono::{DateTime, Utc};
use entity::account;
use lodestar_core::models::AccountView;
use lodestar_core::token::TokenSubject;

/// Multipart body for POST /api/v1/users/register
///
/// Every field is optional at the extractor level so that missing input is
/// reported through our own BadRequest envelope rather than actix's.
#[derive(MultipartForm)]
pub struct RegisterForm {
    #[multipart(rename = "fullName")]
    pub full_name: Option<Text<String>>,
    pub email: Option<Text<String>>,
    pub username: Option<Text<String>>,
    pub password: Option<Text<String>>,
    pub avatar: Option<TempFile>,
    #[multipart(rename = "coverImage")]
    pub cover_image: Option<TempFile>,
}

/// Multipart body for PATCH /api/v1/users/avatar
#[derive(MultipartForm)]
pub struct AvatarForm {
    pub avatar: Option<TempFile>,
}

/// Multipart body for PATCH /api/v1/users/cover-image
#[derive(MultipartForm)]
pub struct CoverImageForm {
    #[multipart(rename = "coverImage")]
    pub cover_image: Option<TempFile>,
}

pub fn text_value(field: &Option<Text<String>>) -> Option<&str> {
    field.as_ref().map(|t| t.as_str())
}

/// Browsers send an empty part for an unselected file input.
pub fn uploaded_file(field: &Option<TempFile>) -> Option<&TempFile> {
    field.as_ref().filter(|f| f.size > 0)
}

pub fn account_view(model: &account::Model) -> AccountView {
    AccountView {
        id: model.id.clone(),
        username: model.username.clone(),
        email: model.email.clone(),
        full_name: model.full_name.clone(),
        avatar: model.avatar_url.clone(),
        cover_image: model.cover_image_url.clone(),
        created_at: timestamp(model.created_at),
        updated_at: timestamp(model.updated_at),
    }
}

pub fn token_subject(model: &account::Model) -> TokenSubject {
    TokenSubject {
        account_id: model.id.clone(),
        username: model.username.clone(),
        email: model.email.clone(),
        full_name: model.full_name.clone(),
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
