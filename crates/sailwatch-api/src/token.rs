//! Bearer token lifecycle — credential grant with cached expiry.
//!
//! The token never touches disk. The stored expiry already has the
//! safety margin folded in, so freshness is a plain clock comparison.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use sailwatch_core::config::ApiConfig;
use sailwatch_core::error::{Result, SailwatchError};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_lifetime")]
    expires_in: u64,
}

fn default_lifetime() -> u64 {
    3600
}

/// Caches one bearer credential for the availability source.
pub struct TokenCache {
    config: ApiConfig,
    client: reqwest::Client,
    token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    /// Exchanges performed, for observability.
    exchanges: u32,
}

impl TokenCache {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            token: None,
            expires_at: None,
            exchanges: 0,
        }
    }

    /// Return the cached token when it is still fresh, otherwise perform
    /// one credential-grant exchange. `force_refresh` bypasses the cache
    /// unconditionally (the 401 retry hook).
    pub async fn get_token(&mut self, force_refresh: bool) -> Result<String> {
        if !force_refresh
            && let (Some(token), Some(expires_at)) = (&self.token, self.expires_at)
            && Utc::now() < expires_at
        {
            return Ok(token.clone());
        }

        let url = format!("{}{}", self.config.base_url, self.config.token_path);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("scope", self.config.scope.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SailwatchError::Auth(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(SailwatchError::Auth(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| SailwatchError::Auth(format!("invalid token response: {e}")))?;

        let usable = body.expires_in.saturating_sub(self.config.token_margin_secs);
        self.expires_at = Some(Utc::now() + Duration::seconds(usable as i64));
        self.token = Some(body.access_token.clone());
        self.exchanges += 1;
        tracing::debug!("🔑 Token refreshed (usable for {usable}s)");
        Ok(body.access_token)
    }

    /// How many exchanges this cache has performed.
    pub fn exchanges(&self) -> u32 {
        self.exchanges
    }

    #[cfg(test)]
    pub(crate) fn seed(&mut self, token: &str, expires_at: DateTime<Utc>) {
        self.token = Some(token.to_string());
        self.expires_at = Some(expires_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config() -> ApiConfig {
        // Unroutable base URL: any network attempt fails fast.
        ApiConfig {
            base_url: "http://127.0.0.1:1".into(),
            ..ApiConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fresh_token_returned_without_exchange() {
        let mut cache = TokenCache::new(offline_config());
        cache.seed("cached-token", Utc::now() + Duration::seconds(600));

        // Would error if it hit the (unroutable) network.
        let token = cache.get_token(false).await.unwrap();
        assert_eq!(token, "cached-token");
        assert_eq!(cache.exchanges(), 0);
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_cache() {
        let mut cache = TokenCache::new(offline_config());
        cache.seed("cached-token", Utc::now() + Duration::seconds(600));

        let err = cache.get_token(true).await.unwrap_err();
        assert!(matches!(err, SailwatchError::Auth(_)));
    }

    #[tokio::test]
    async fn test_expired_token_triggers_exchange() {
        let mut cache = TokenCache::new(offline_config());
        cache.seed("stale-token", Utc::now() - Duration::seconds(1));

        let err = cache.get_token(false).await.unwrap_err();
        assert!(matches!(err, SailwatchError::Auth(_)));
    }
}
