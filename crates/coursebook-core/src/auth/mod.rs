//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `SessionManager`: access/refresh token lifecycle with proactive renewal
//!   and a single retry after a 401
//! - `TokenStore`: durable storage for the token pair (file, keychain, memory)
//! - `Navigator`: where the user is sent when the session ends
//! - `decode_claims`: unverified decoding of the access token payload

pub mod claims;
pub mod credentials;
pub mod navigator;
pub mod session;
pub mod store;

use std::sync::Arc;

use anyhow::Result;

use crate::config::{Config, TokenStorage};

pub use claims::{decode_claims, AccessClaims};
pub use credentials::KeyringTokenStore;
pub use navigator::{LogNavigator, Navigator, RecordingNavigator};
pub use session::{SessionManager, SessionState, TokenPair};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};

/// Build the token store selected by `config.token_storage`.
pub fn open_token_store(config: &Config) -> Result<Arc<dyn TokenStore>> {
    let store: Arc<dyn TokenStore> = match config.token_storage {
        TokenStorage::File => Arc::new(FileTokenStore::new(config.cache_dir()?)),
        TokenStorage::Keyring => Arc::new(KeyringTokenStore::new()),
        TokenStorage::Memory => Arc::new(MemoryTokenStore::new()),
    };
    Ok(store)
}
