use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use reqwest::{Client, RequestBuilder};
use tracing::debug;

use crate::cache::token::CachedToken;
use crate::cache::token_cache::CacheKey;
use crate::error::AuthResult;
use crate::observability::metrics::get_metrics;
use crate::provider::factory::FactoryShared;
use crate::sources::oauth2::TokenExchangeClient;
use crate::sources::signing::SigningStrategy;

/// The "current bearer token" capability handed to HTTP callers.
///
/// Cheap to clone. Tokens are fetched lazily by the first caller that finds
/// the cached one missing or stale; there is no background refresher.
#[derive(Clone)]
pub struct TokenProvider {
    key: CacheKey,
    scope: Option<String>,
    tolerance: Duration,
    strategy: Arc<SigningStrategy>,
    shared: Arc<FactoryShared>,
}

impl TokenProvider {
    pub(crate) fn new(
        key: CacheKey,
        scope: Option<String>,
        tolerance: Duration,
        strategy: Arc<SigningStrategy>,
        shared: Arc<FactoryShared>,
    ) -> Self {
        Self {
            key,
            scope,
            tolerance,
            strategy,
            shared,
        }
    }

    /// Access token to send as `Authorization: Bearer <token>`.
    pub async fn current_token(&self) -> AuthResult<String> {
        Ok(self.current().await?.access_token.clone())
    }

    /// The cached token, refreshed first when missing or stale.
    pub async fn current(&self) -> AuthResult<Arc<CachedToken>> {
        let provider = self.clone();
        self.shared
            .cache
            .get_or_refresh(&self.key, move || {
                let transport = provider.shared.transport();
                provider.refresh(transport)
            })
            .await
    }

    /// Drops the cached token, e.g. after the resource server answered 401.
    pub async fn invalidate(&self) {
        debug!(key = %self.key, "cached token invalidated");
        self.shared.cache.invalidate(&self.key).await;
    }

    /// Attaches the current bearer token to an outgoing request.
    pub async fn authorize(&self, request: RequestBuilder) -> AuthResult<RequestBuilder> {
        let token = self.current_token().await?;
        Ok(request.bearer_auth(token))
    }

    pub fn token_endpoint(&self) -> &str {
        &self.key.token_endpoint
    }

    pub fn cache_key(&self) -> &CacheKey {
        &self.key
    }

    async fn refresh(self, transport: AuthResult<Client>) -> AuthResult<CachedToken> {
        let client = transport?;
        let auth = self.strategy.authenticate(&self.key.token_endpoint)?;

        let token = TokenExchangeClient::new(client)
            .exchange(&self.key.token_endpoint, &auth, self.scope.as_deref(), self.tolerance)
            .await?;

        get_metrics()
            .await
            .token_expiry_unix
            .with_label_values(&[self.key.token_endpoint.as_str(), self.key.client_id.as_str()])
            .set(token.expires_at.timestamp());
        Ok(token)
    }
}

impl fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenProvider")
            .field("key", &self.key)
            .field("scope", &self.scope)
            .field("auth_method", &self.strategy.auth_method())
            .finish_non_exhaustive()
    }
}
