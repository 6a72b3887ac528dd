//! Access/refresh token issuance and verification.
//!
//! Both tokens are HS256 JWTs signed with distinct secrets. The access token is
//! short-lived and carries enough identity to authenticate a request; the refresh
//! token only names the account and is stored server-side so it can be rotated
//! and revoked.

use chrono::Utc;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const ACCESS_TOKEN_TYPE: &str = "access";
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("wrong token type: expected {expected}, got {actual}")]
    WrongType { expected: &'static str, actual: String },

    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Identity encoded into access tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub account_id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
}

/// Access token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Issuer
    pub iss: String,
    /// Subject (account ID)
    pub sub: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique token ID
    pub jti: String,
    pub token_type: String,
}

/// Refresh token claims. Deliberately minimal: the account is reloaded on use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub iss: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub token_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
pub struct TokenSettings {
    /// `iss` claim, usually the server's public base URL
    pub issuer: String,
    pub access_secret: String,
    /// Access token lifetime in seconds
    pub access_ttl: i64,
    pub refresh_secret: String,
    /// Refresh token lifetime in seconds
    pub refresh_ttl: i64,
}

#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[derive(Clone)]
pub struct TokenIssuer {
    issuer: String,
    access: SigningKeys,
    refresh: SigningKeys,
    access_ttl: i64,
    refresh_ttl: i64,
}

impl TokenIssuer {
    pub fn new(settings: &TokenSettings) -> Self {
        Self {
            issuer: settings.issuer.clone(),
            access: SigningKeys::from_secret(&settings.access_secret),
            refresh: SigningKeys::from_secret(&settings.refresh_secret),
            access_ttl: settings.access_ttl,
            refresh_ttl: settings.refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> i64 {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> i64 {
        self.refresh_ttl
    }

    pub fn issue_access_token(&self, subject: &TokenSubject) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            iss: self.issuer.clone(),
            sub: subject.account_id.clone(),
            username: subject.username.clone(),
            email: subject.email.clone(),
            full_name: subject.full_name.clone(),
            iat: now,
            exp: now + self.access_ttl,
            jti: Uuid::new_v4().to_string(),
            token_type: ACCESS_TOKEN_TYPE.to_string(),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.access.encoding)?)
    }

    pub fn issue_refresh_token(&self, account_id: &str) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let claims = RefreshClaims {
            iss: self.issuer.clone(),
            sub: account_id.to_string(),
            iat: now,
            exp: now + self.refresh_ttl,
            jti: Uuid::new_v4().to_string(),
            token_type: REFRESH_TOKEN_TYPE.to_string(),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.refresh.encoding)?)
    }

    pub fn issue_pair(&self, subject: &TokenSubject) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(subject)?,
            refresh_token: self.issue_refresh_token(&subject.account_id)?,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let claims: AccessClaims = decode(token, &self.access.decoding, &self.validation())
            .map_err(map_decode_error)?
            .claims;

        if claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(TokenError::WrongType {
                expected: ACCESS_TOKEN_TYPE,
                actual: claims.token_type,
            });
        }

        Ok(claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let claims: RefreshClaims = decode(token, &self.refresh.decoding, &self.validation())
            .map_err(map_decode_error)?
            .claims;

        if claims.token_type != REFRESH_TOKEN_TYPE {
            return Err(TokenError::WrongType {
                expected: REFRESH_TOKEN_TYPE,
                actual: claims.token_type,
            });
        }

        Ok(claims)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.validate_exp = true;
        validation
    }
}

/// Hex SHA-256 of a token. Refresh tokens are persisted only in this form.
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid(err.to_string()),
    }
}
