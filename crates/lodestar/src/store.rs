use async_trait::async_trait;
use chrono::Utc;
use entity::account;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, Set, SqlErr,
};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique index rejected the write (duplicate username or email).
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(DbErr),
}

impl From<DbErr> for StoreError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => StoreError::Conflict(detail),
            _ => StoreError::Database(err),
        }
    }
}

/// Fields required to create an account. Identifiers must already be normalised.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub avatar_url: String,
    pub cover_image_url: Option<String>,
}

/// Partial update. `None` leaves a column untouched; for nullable columns
/// `Some(None)` clears the value.
#[derive(Debug, Clone, Default)]
pub struct AccountChanges {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub password_hash: Option<String>,
    pub avatar_url: Option<String>,
    pub cover_image_url: Option<Option<String>>,
    pub refresh_token: Option<Option<String>>,
}

impl AccountChanges {
    pub fn refresh_token(token: Option<String>) -> Self {
        Self {
            refresh_token: Some(token),
            ..Default::default()
        }
    }
}

/// Persistence seam for accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<account::Model>, StoreError>;

    /// Finds an account whose username OR email matches. Both arguments are
    /// expected to be normalised; with neither given nothing matches.
    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<account::Model>, StoreError>;

    /// Inserts the account and returns its new id.
    async fn create(&self, new_account: NewAccount) -> Result<String, StoreError>;

    /// Applies `changes` and returns the updated record, or `None` if no account has `id`.
    async fn update_by_id(
        &self,
        id: &str,
        changes: AccountChanges,
    ) -> Result<Option<account::Model>, StoreError>;

    /// Swaps the stored refresh token digest from `expected` to `new` in one
    /// conditional write. Returns `false` if the stored value was no longer
    /// `expected`, i.e. another request rotated or revoked it first.
    async fn rotate_refresh_token(
        &self,
        id: &str,
        expected: &str,
        new: &str,
    ) -> Result<bool, StoreError>;
}

pub struct SeaOrmAccountStore {
    db: DatabaseConnection,
}

impl SeaOrmAccountStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccountStore for SeaOrmAccountStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<account::Model>, StoreError> {
        Ok(account::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?)
    }

    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<account::Model>, StoreError> {
        if username.is_none() && email.is_none() {
            return Ok(None);
        }

        let mut condition = Condition::any();
        if let Some(username) = username {
            condition = condition.add(account::Column::Username.eq(username));
        }
        if let Some(email) = email {
            condition = condition.add(account::Column::Email.eq(email));
        }

        Ok(account::Entity::find()
            .filter(condition)
            .one(&self.db)
            .await?)
    }

    async fn create(&self, new_account: NewAccount) -> Result<String, StoreError> {
        let now = Utc::now().timestamp();
        let id = Uuid::now_v7().to_string();

        let model = account::ActiveModel {
            id: Set(id.clone()),
            username: Set(new_account.username),
            email: Set(new_account.email),
            full_name: Set(new_account.full_name),
            password_hash: Set(new_account.password_hash),
            avatar_url: Set(new_account.avatar_url),
            cover_image_url: Set(new_account.cover_image_url),
            refresh_token: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        account::Entity::insert(model)
            .exec_without_returning(&self.db)
            .await?;

        Ok(id)
    }

    async fn update_by_id(
        &self,
        id: &str,
        changes: AccountChanges,
    ) -> Result<Option<account::Model>, StoreError> {
        let Some(existing) = account::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let mut active: account::ActiveModel = existing.into();
        if let Some(email) = changes.email {
            active.email = Set(email);
        }
        if let Some(full_name) = changes.full_name {
            active.full_name = Set(full_name);
        }
        if let Some(password_hash) = changes.password_hash {
            active.password_hash = Set(password_hash);
        }
        if let Some(avatar_url) = changes.avatar_url {
            active.avatar_url = Set(avatar_url);
        }
        if let Some(cover_image_url) = changes.cover_image_url {
            active.cover_image_url = Set(cover_image_url);
        }
        if let Some(refresh_token) = changes.refresh_token {
            active.refresh_token = Set(refresh_token);
        }
        active.updated_at = Set(Utc::now().timestamp());

        Ok(Some(active.update(&self.db).await?))
    }

    async fn rotate_refresh_token(
        &self,
        id: &str,
        expected: &str,
        new: &str,
    ) -> Result<bool, StoreError> {
        let result = account::Entity::update_many()
            .col_expr(account::Column::RefreshToken, Expr::value(new))
            .col_expr(account::Column::UpdatedAt, Expr::value(Utc::now().timestamp()))
            .filter(account::Column::Id.eq(id))
            .filter(account::Column::RefreshToken.eq(expected))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }
}

#[cfg(test)]
pub mod memory {
    //! In-process store used by handler tests. Enforces the same uniqueness
    //! rules as the database indexes.

    use super::*;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{ConnectOptions, Database};
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    #[derive(Default)]
    pub struct MemoryAccountStore {
        accounts: RwLock<HashMap<String, account::Model>>,
    }

    impl MemoryAccountStore {
        pub async fn len(&self) -> usize {
            self.accounts.read().await.len()
        }

        pub async fn get(&self, id: &str) -> Option<account::Model> {
            self.accounts.read().await.get(id).cloned()
        }
    }

    #[async_trait]
    impl AccountStore for MemoryAccountStore {
        async fn find_by_id(&self, id: &str) -> Result<Option<account::Model>, StoreError> {
            Ok(self.get(id).await)
        }

        async fn find_by_username_or_email(
            &self,
            username: Option<&str>,
            email: Option<&str>,
        ) -> Result<Option<account::Model>, StoreError> {
            let accounts = self.accounts.read().await;
            Ok(accounts
                .values()
                .find(|a| {
                    username.is_some_and(|u| a.username == u) || email.is_some_and(|e| a.email == e)
                })
                .cloned())
        }

        async fn create(&self, new_account: NewAccount) -> Result<String, StoreError> {
            let mut accounts = self.accounts.write().await;
            if accounts
                .values()
                .any(|a| a.username == new_account.username || a.email == new_account.email)
            {
                return Err(StoreError::Conflict("accounts.username/email".to_string()));
            }

            let now = Utc::now().timestamp();
            let id = Uuid::now_v7().to_string();
            accounts.insert(
                id.clone(),
                account::Model {
                    id: id.clone(),
                    username: new_account.username,
                    email: new_account.email,
                    full_name: new_account.full_name,
                    password_hash: new_account.password_hash,
                    avatar_url: new_account.avatar_url,
                    cover_image_url: new_account.cover_image_url,
                    refresh_token: None,
                    created_at: now,
                    updated_at: now,
                },
            );
            Ok(id)
        }

        async fn update_by_id(
            &self,
            id: &str,
            changes: AccountChanges,
        ) -> Result<Option<account::Model>, StoreError> {
            let mut accounts = self.accounts.write().await;

            if let Some(email) = changes.email.as_deref() {
                if accounts.values().any(|a| a.id != id && a.email == email) {
                    return Err(StoreError::Conflict("accounts.email".to_string()));
                }
            }

            let Some(existing) = accounts.get_mut(id) else {
                return Ok(None);
            };
            if let Some(email) = changes.email {
                existing.email = email;
            }
            if let Some(full_name) = changes.full_name {
                existing.full_name = full_name;
            }
            if let Some(password_hash) = changes.password_hash {
                existing.password_hash = password_hash;
            }
            if let Some(avatar_url) = changes.avatar_url {
                existing.avatar_url = avatar_url;
            }
            if let Some(cover_image_url) = changes.cover_image_url {
                existing.cover_image_url = cover_image_url;
            }
            if let Some(refresh_token) = changes.refresh_token {
                existing.refresh_token = refresh_token;
            }
            existing.updated_at = Utc::now().timestamp();

            Ok(Some(existing.clone()))
        }

        async fn rotate_refresh_token(
            &self,
            id: &str,
            expected: &str,
            new: &str,
        ) -> Result<bool, StoreError> {
            let mut accounts = self.accounts.write().await;
            match accounts.get_mut(id) {
                Some(existing) if existing.refresh_token.as_deref() == Some(expected) => {
                    existing.refresh_token = Some(new.to_string());
                    existing.updated_at = Utc::now().timestamp();
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
    }

    /// `SeaOrmAccountStore` on a migrated in-memory SQLite database.
    pub async fn sqlite_store() -> SeaOrmAccountStore {
        // One pooled connection: every connection to `sqlite::memory:` is a separate database.
        let mut options = ConnectOptions::new("sqlite::memory:");
        options
            .max_connections(1)
            .min_connections(1)
            .sqlx_logging(false);

        let db = Database::connect(options).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        SeaOrmAccountStore::new(db)
    }
}

#[cfg(test)]
mod tests {
    use super::memory::sqlite_store;
    use super::*;

    fn new_account(username: &str, email: &str) -> NewAccount {
        NewAccount {
            username: username.to_string(),
            email: email.to_string(),
            full_name: "A B".to_string(),
            password_hash: "$argon2id$stub".to_string(),
            avatar_url: "https://media.example/a.png".to_string(),
            cover_image_url: None,
        }
    }

    #[actix_web::test]
    async fn test_create_then_find() {
        let store = sqlite_store().await;
        let id = store.create(new_account("ab1", "a@b.com")).await.unwrap();

        let by_id = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "ab1");
        assert!(by_id.refresh_token.is_none());

        let by_email = store
            .find_by_username_or_email(None, Some("a@b.com"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, id);

        // Either identifier matching is enough.
        let mixed = store
            .find_by_username_or_email(Some("nobody"), Some("a@b.com"))
            .await
            .unwrap();
        assert_eq!(mixed.map(|a| a.id), Some(id));
    }

    #[actix_web::test]
    async fn test_find_without_identifiers_matches_nothing() {
        let store = sqlite_store().await;
        store.create(new_account("ab1", "a@b.com")).await.unwrap();

        assert!(store
            .find_by_username_or_email(None, None)
            .await
            .unwrap()
            .is_none());
    }

    #[actix_web::test]
    async fn test_duplicate_username_is_conflict() {
        let store = sqlite_store().await;
        store.create(new_account("ab1", "a@b.com")).await.unwrap();

        let err = store
            .create(new_account("ab1", "other@b.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)), "got {err:?}");
    }

    #[actix_web::test]
    async fn test_duplicate_email_is_conflict() {
        let store = sqlite_store().await;
        store.create(new_account("ab1", "a@b.com")).await.unwrap();

        let err = store
            .create(new_account("ab2", "a@b.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)), "got {err:?}");
    }

    #[actix_web::test]
    async fn test_update_sets_and_clears_refresh_token() {
        let store = sqlite_store().await;
        let id = store.create(new_account("ab1", "a@b.com")).await.unwrap();

        let updated = store
            .update_by_id(&id, AccountChanges::refresh_token(Some("rt-1".to_string())))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.refresh_token.as_deref(), Some("rt-1"));

        let cleared = store
            .update_by_id(&id, AccountChanges::refresh_token(None))
            .await
            .unwrap()
            .unwrap();
        assert!(cleared.refresh_token.is_none());
        assert_eq!(cleared.email, "a@b.com");
    }

    #[actix_web::test]
    async fn test_update_missing_account() {
        let store = sqlite_store().await;
        let result = store
            .update_by_id("missing", AccountChanges::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[actix_web::test]
    async fn test_update_email_to_taken_value_is_conflict() {
        let store = sqlite_store().await;
        store.create(new_account("ab1", "a@b.com")).await.unwrap();
        let second = store.create(new_account("ab2", "c@d.com")).await.unwrap();

        let err = store
            .update_by_id(
                &second,
                AccountChanges {
                    email: Some("a@b.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)), "got {err:?}");
    }

    #[actix_web::test]
    async fn test_rotate_refresh_token_swaps_only_expected_value() {
        let store = sqlite_store().await;
        let id = store.create(new_account("ab1", "a@b.com")).await.unwrap();
        store
            .update_by_id(&id, AccountChanges::refresh_token(Some("digest-1".to_string())))
            .await
            .unwrap();

        assert!(store
            .rotate_refresh_token(&id, "digest-1", "digest-2")
            .await
            .unwrap());
        // The old value is gone, so a second swap from it loses.
        assert!(!store
            .rotate_refresh_token(&id, "digest-1", "digest-3")
            .await
            .unwrap());

        let stored = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("digest-2"));
    }

    #[actix_web::test]
    async fn test_rotate_refresh_token_after_logout() {
        let store = sqlite_store().await;
        let id = store.create(new_account("ab1", "a@b.com")).await.unwrap();

        assert!(!store
            .rotate_refresh_token(&id, "digest-1", "digest-2")
            .await
            .unwrap());
        assert!(store
            .find_by_id(&id)
            .await
            .unwrap()
            .unwrap()
            .refresh_token
            .is_none());
    }
}
