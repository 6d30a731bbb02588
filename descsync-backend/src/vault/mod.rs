//! Credential vault: encrypted per-channel OAuth tokens with single-flight refresh

mod crypto;
pub mod oauth;

pub use crypto::TokenCipher;
pub use oauth::{OAuthClient, TokenEndpoint, TokenGrant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::gateway::map_remote_failure;
use crate::models::{Channel, TokenStatus};

/// Scope needed to read and edit video metadata
pub const REQUIRED_SCOPE: &str = "https://www.googleapis.com/auth/youtube.force-ssl";

/// Seconds before expiry at which a token is treated as expired
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 60;

/// A decrypted, currently valid access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Encrypted tokens ready to be stored
#[derive(Debug, Clone)]
pub struct SealedGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

pub struct CredentialVault {
    db: Arc<Database>,
    cipher: TokenCipher,
    oauth: Arc<dyn TokenEndpoint>,
    refresh_margin_secs: i64,
    /// One lock per channel so concurrent callers share a single refresh
    refresh_locks: DashMap<i64, Arc<AsyncMutex<()>>>,
}

impl CredentialVault {
    pub fn new(db: Arc<Database>, cipher: TokenCipher, oauth: Arc<dyn TokenEndpoint>) -> Self {
        Self {
            db,
            cipher,
            oauth,
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
            refresh_locks: DashMap::new(),
        }
    }

    pub fn with_refresh_margin(mut self, secs: i64) -> Self {
        self.refresh_margin_secs = secs;
        self
    }

    /// Exchange an authorization code. Returns the plaintext access token for
    /// immediate use and the sealed grant to persist.
    pub async fn exchange_code(&self, code: &str) -> Result<(AccessToken, SealedGrant)> {
        let grant = self.oauth.exchange_code(code).await.map_err(|f| {
            log::warn!("[VAULT] Authorization code exchange failed: {}", f);
            map_remote_failure(&f)
        })?;

        if !grant.has_scope(REQUIRED_SCOPE) {
            log::warn!("[VAULT] Granted scopes {:?} lack {}", grant.scope, REQUIRED_SCOPE);
            return Err(Error::ScopeInsufficient);
        }

        let expires_at = Utc::now() + chrono::Duration::seconds(grant.expires_in);
        let sealed = SealedGrant {
            access_token: self.cipher.encrypt(&grant.access_token)?,
            refresh_token: grant
                .refresh_token
                .as_deref()
                .map(|t| self.cipher.encrypt(t))
                .transpose()?,
            expires_at,
        };

        Ok((
            AccessToken {
                token: grant.access_token,
                expires_at,
            },
            sealed,
        ))
    }

    /// A valid access token for the channel, refreshing it first if it has expired
    pub async fn get_valid_token(&self, channel_id: i64) -> Result<AccessToken> {
        let channel = self.load_channel(channel_id)?;
        if channel.token_is_fresh(self.refresh_margin_secs) {
            return self.open(&channel);
        }

        let lock = self
            .refresh_locks
            .entry(channel_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let result = {
            let _guard = lock.lock().await;
            self.refresh_once(channel_id).await
        };

        // Whoever drops the last outside handle prunes the entry
        drop(lock);
        self.refresh_locks
            .remove_if(&channel_id, |_, entry| Arc::strong_count(entry) == 1);
        result
    }

    async fn refresh_once(&self, channel_id: i64) -> Result<AccessToken> {
        // Whoever held the lock before us may already have refreshed (or failed to)
        let channel = self.load_channel(channel_id)?;
        if channel.token_is_fresh(self.refresh_margin_secs) {
            log::debug!("[VAULT] Channel {} refreshed by a concurrent caller", channel_id);
            return self.open(&channel);
        }

        self.refresh(&channel).await
    }

    fn load_channel(&self, channel_id: i64) -> Result<Channel> {
        let channel = self.db.get_channel(channel_id)?.ok_or(Error::NotConnected)?;
        match channel.token_status {
            TokenStatus::Valid => Ok(channel),
            TokenStatus::Invalid => Err(Error::TokenRefreshFailed(
                "stored credentials are invalid".to_string(),
            )),
            TokenStatus::Revoked => Err(Error::TokenRefreshFailed(
                "access was revoked".to_string(),
            )),
        }
    }

    fn open(&self, channel: &Channel) -> Result<AccessToken> {
        let token = self.cipher.decrypt(&channel.access_token).inspect_err(|e| {
            log::error!("[VAULT] Cannot decrypt access token of channel {}: {}", channel.id, e);
        })?;
        Ok(AccessToken {
            token,
            expires_at: channel.token_expires_at.unwrap_or_else(Utc::now),
        })
    }

    async fn refresh(&self, channel: &Channel) -> Result<AccessToken> {
        let refresh_token = match &channel.refresh_token {
            Some(sealed) => self.cipher.decrypt(sealed).inspect_err(|e| {
                log::error!("[VAULT] Cannot decrypt refresh token of channel {}: {}", channel.id, e);
            })?,
            None => {
                self.db.set_token_status(channel.id, TokenStatus::Invalid)?;
                return Err(Error::TokenRefreshFailed("no refresh token stored".to_string()));
            }
        };

        log::info!("[VAULT] Refreshing access token for channel {}", channel.id);
        let grant = match self.oauth.refresh(&refresh_token).await {
            Ok(grant) => grant,
            Err(failure) => {
                let status = if failure.reason.as_deref() == Some("invalid_grant") {
                    TokenStatus::Revoked
                } else {
                    TokenStatus::Invalid
                };
                log::warn!(
                    "[VAULT] Refresh failed for channel {}: {} (marking {})",
                    channel.id,
                    failure,
                    status
                );
                self.db.set_token_status(channel.id, status)?;
                return Err(Error::TokenRefreshFailed(failure.message));
            }
        };

        let expires_at = Utc::now() + chrono::Duration::seconds(grant.expires_in);
        let sealed_access = self.cipher.encrypt(&grant.access_token)?;
        let sealed_refresh = grant
            .refresh_token
            .as_deref()
            .map(|t| self.cipher.encrypt(t))
            .transpose()?;
        self.db.update_channel_tokens(
            channel.id,
            &sealed_access,
            sealed_refresh.as_deref(),
            expires_at,
        )?;

        Ok(AccessToken {
            token: grant.access_token,
            expires_at,
        })
    }
}
