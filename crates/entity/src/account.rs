use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    /// UUIDv7 string.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Always stored trimmed and lowercased.
    #[sea_orm(unique)]
    pub username: String,

    /// Always stored trimmed and lowercased.
    #[sea_orm(unique)]
    pub email: String,

    pub full_name: String,

    /// Argon2id PHC string.
    pub password_hash: String,

    pub avatar_url: String,

    pub cover_image_url: Option<String>,

    /// Hex SHA-256 digest of the single refresh token currently accepted
    /// for this account. `None` means the account is logged out.
    pub refresh_token: Option<String>,

    /// Unix timestamp (seconds).
    pub created_at: i64,

    /// Unix timestamp (seconds).
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
