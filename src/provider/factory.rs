use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock as SyncRwLock};
use std::time::Duration;

use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::token_cache::{CacheKey, TokenCache};
use crate::config::auth::AuthSettings;
use crate::config::proc_validator::{ensure_valid, Violation};
use crate::error::{AuthError, AuthResult};
use crate::helpers::web::parse_http_url;
use crate::provider::token_provider::TokenProvider;
use crate::sources::discovery::{well_known_url, DiscoveryDocument, DiscoveryResolver};
use crate::sources::signing::SigningStrategy;
use crate::utils::constants::GRANT_TYPE_CLIENT_CREDENTIALS;

const INVALID_SETTINGS_TITLE: &str = "invalid SMART authentication settings:";

/// State shared between a factory and every provider it created.
pub(crate) struct FactoryShared {
    closed: AtomicBool,
    transport: SyncRwLock<Option<Client>>,
    pub(crate) cache: TokenCache,
    discovery: RwLock<HashMap<String, Arc<DiscoveryDocument>>>,
}

impl FactoryShared {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The HTTP client, or `Closed` once the factory has been shut down.
    ///
    /// Taken when a refresh starts, so a close that lands while the exchange
    /// is still queued does not fail it.
    pub(crate) fn transport(&self) -> AuthResult<Client> {
        if self.is_closed() {
            return Err(AuthError::Closed);
        }
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(AuthError::Closed)
    }
}

/// Builds [`TokenProvider`]s and owns the HTTP transport they share.
///
/// Providers created by one factory share its token cache, so two providers
/// for the same token endpoint and client id never fetch tokens twice.
#[derive(Clone)]
pub struct CredentialFactory {
    shared: Arc<FactoryShared>,
}

impl CredentialFactory {
    pub fn new(client: Client) -> Self {
        Self {
            shared: Arc::new(FactoryShared {
                closed: AtomicBool::new(false),
                transport: SyncRwLock::new(Some(client)),
                cache: TokenCache::new(),
                discovery: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Factory with its own client whose requests time out after `timeout`.
    pub fn with_timeout(timeout: Duration) -> AuthResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| AuthError::Configuration {
            message: format!("cannot build HTTP client: {}", e),
            violations: Vec::new(),
        })?;
        Ok(Self::new(client))
    }

    /// Returns a provider for `fhir_endpoint`, or `None` when auth is disabled.
    ///
    /// Settings are validated and key material parsed before anything goes on
    /// the wire; the token endpoint is resolved here, once.
    pub async fn create_credentials(
        &self,
        fhir_endpoint: &str,
        settings: &AuthSettings,
    ) -> AuthResult<Option<TokenProvider>> {
        if self.is_closed() {
            return Err(AuthError::Closed);
        }
        if !settings.enabled {
            debug!(fhir_endpoint, "authentication disabled, no credentials");
            return Ok(None);
        }

        ensure_valid(settings, INVALID_SETTINGS_TITLE)?;
        let strategy = SigningStrategy::from_settings(settings)?;
        let token_endpoint = self.resolve_token_endpoint(fhir_endpoint, settings, &strategy).await?;

        let key = CacheKey::new(token_endpoint, strategy.client_id());
        info!(
            key = %key,
            auth_method = strategy.auth_method(),
            "credentials created"
        );
        Ok(Some(TokenProvider::new(
            key,
            settings.effective_scope().map(str::to_owned),
            settings.token_expiry_tolerance(),
            Arc::new(strategy),
            self.shared.clone(),
        )))
    }

    async fn resolve_token_endpoint(
        &self,
        fhir_endpoint: &str,
        settings: &AuthSettings,
        strategy: &SigningStrategy,
    ) -> AuthResult<String> {
        if !settings.use_smart {
            // presence and shape checked by validation
            let endpoint = settings.token_endpoint.as_deref().unwrap_or_default().trim();
            return Ok(endpoint.to_string());
        }

        let metadata_url = match settings.smart_metadata_url.as_deref() {
            Some(raw) => parse_http_url(raw, AuthError::discovery)?,
            None => {
                let base = parse_http_url(fhir_endpoint, |message| {
                    invalid_setting("fhir_endpoint", message)
                })?;
                well_known_url(&base)?
            }
        };

        let document = self.resolve_discovery(&metadata_url).await?;
        check_advertised_capabilities(&document, strategy);
        Ok(document.token_endpoint.trim().to_string())
    }

    /// Discovery document for `metadata_url`, fetched once per factory.
    pub async fn resolve_discovery(&self, metadata_url: &Url) -> AuthResult<Arc<DiscoveryDocument>> {
        let cache_key = metadata_url.to_string();
        if let Some(document) = self.shared.discovery.read().await.get(&cache_key) {
            return Ok(document.clone());
        }

        let resolver = DiscoveryResolver::new(self.shared.transport()?);
        let document = Arc::new(resolver.resolve_from_url(metadata_url).await?);

        // two racing resolutions keep whichever landed first
        let mut discovered = self.shared.discovery.write().await;
        Ok(discovered.entry(cache_key).or_insert(document).clone())
    }

    /// Shared token cache of every provider built by this factory.
    pub fn token_cache(&self) -> &TokenCache {
        &self.shared.cache
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Stops new providers and refreshes, lets running exchanges finish, then
    /// releases the HTTP client. Tokens already cached keep being served.
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("closing credential factory");
        self.shared.cache.wait_idle().await;
        self.shared
            .transport
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        debug!("credential factory transport released");
    }
}

fn invalid_setting(path: &str, message: String) -> AuthError {
    let violation = Violation::new(Some(path), message);
    AuthError::Configuration {
        message: format!("{}\n{}", INVALID_SETTINGS_TITLE, violation),
        violations: vec![violation],
    }
}

// servers that leave a list out are not refusing anything
fn check_advertised_capabilities(document: &DiscoveryDocument, strategy: &SigningStrategy) {
    if !document.allows_grant_type(GRANT_TYPE_CLIENT_CREDENTIALS) {
        warn!(
            token_endpoint = %document.token_endpoint,
            "server does not advertise the client_credentials grant"
        );
    }
    if !document.allows_auth_method(strategy.auth_method()) {
        warn!(
            token_endpoint = %document.token_endpoint,
            auth_method = strategy.auth_method(),
            supported = ?document.token_endpoint_auth_methods_supported,
            "server does not advertise the configured client authentication method"
        );
    }
    if let Some(alg) = strategy.signing_algorithm() {
        if !document.allows_signing_alg(alg) {
            warn!(
                token_endpoint = %document.token_endpoint,
                alg,
                supported = ?document.token_endpoint_auth_signing_alg_values_supported,
                "server does not advertise the assertion signing algorithm"
            );
        }
    }
}
