use lodestar_core::password::CredentialVerifier;
use lodestar_core::token::TokenIssuer;
use std::sync::Arc;

use crate::media::MediaStore;
use crate::store::AccountStore;

/// Shared application state.
///
/// Every collaborator a handler needs is reachable from here; nothing is looked
/// up from globals.
pub struct AppState {
    /// Account persistence
    pub accounts: Arc<dyn AccountStore>,

    /// Hosted media storage for avatars and cover images
    pub media: Arc<dyn MediaStore>,

    /// Password hashing and verification
    pub credentials: Arc<dyn CredentialVerifier>,

    /// Access/refresh token signer and verifier
    pub tokens: TokenIssuer,
}
