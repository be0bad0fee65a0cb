use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::cache::token::CachedToken;
use crate::error::{AuthError, AuthResult};
use crate::helpers::time::now_utc;
use crate::observability::metrics::get_metrics;

/// Tokens are shared by everything that talks to the same authorization
/// server as the same client, whatever FHIR endpoint they were created for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub token_endpoint: String,
    pub client_id: String,
}

impl CacheKey {
    pub fn new(token_endpoint: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            token_endpoint: token_endpoint.into(),
            client_id: client_id.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.client_id, self.token_endpoint)
    }
}

/// `None` while the exchange is running, then its single shared outcome.
type RefreshOutcome = Option<AuthResult<Arc<CachedToken>>>;

#[derive(Default)]
struct Entry {
    token: Option<Arc<CachedToken>>,
    pending: Option<watch::Receiver<RefreshOutcome>>,
}

impl Entry {
    /// A pending refresh whose task died without reporting is not waited on.
    fn live_pending(&self) -> Option<watch::Receiver<RefreshOutcome>> {
        self.pending
            .as_ref()
            .filter(|rx| rx.borrow().is_some() || rx.has_changed().is_ok())
            .cloned()
    }
}

/// Expiry-aware token cache with at most one refresh in flight per key.
///
/// Refreshes run on their own task, so a caller that gives up waiting does
/// not cancel the exchange other callers are waiting on.
#[derive(Clone, Default)]
pub struct TokenCache {
    inner: Arc<Mutex<HashMap<CacheKey, Entry>>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached token for `key` if present and not stale.
    pub async fn get(&self, key: &CacheKey) -> Option<Arc<CachedToken>> {
        let now = now_utc();
        self.inner
            .lock()
            .await
            .get(key)
            .and_then(|entry| entry.token.clone())
            .filter(|token| !token.is_stale_at(now))
    }

    /// Serves the cached token, or joins / starts the single refresh for `key`.
    ///
    /// `refresh` is only invoked by the caller that starts a new exchange.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        key: &CacheKey,
        refresh: F,
    ) -> AuthResult<Arc<CachedToken>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AuthResult<CachedToken>> + Send + 'static,
    {
        let metrics = get_metrics().await;
        let endpoint = key.token_endpoint.as_str();

        let mut receiver = {
            let mut entries = self.inner.lock().await;
            let entry = entries.entry(key.clone()).or_default();

            let now = now_utc();
            if let Some(token) = entry.token.as_ref().filter(|t| !t.is_stale_at(now)) {
                metrics.cache_hits.with_label_values(&[endpoint]).inc();
                return Ok(token.clone());
            }

            match entry.live_pending() {
                Some(receiver) => {
                    debug!(key = %key, "joining in-flight token refresh");
                    receiver
                }
                None => {
                    info!(key = %key, "token missing or stale, starting refresh");
                    metrics.cache_refreshes.with_label_values(&[endpoint]).inc();
                    let (sender, receiver) = watch::channel(None);
                    entry.pending = Some(receiver.clone());
                    self.spawn_refresh(key.clone(), refresh(), sender);
                    receiver
                }
            }
        };

        wait_for_outcome(&mut receiver).await
    }

    fn spawn_refresh<Fut>(&self, key: CacheKey, refresh: Fut, sender: watch::Sender<RefreshOutcome>)
    where
        Fut: Future<Output = AuthResult<CachedToken>> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let outcome = refresh.await.map(Arc::new);
            {
                let mut entries = inner.lock().await;
                let entry = entries.entry(key.clone()).or_default();
                match &outcome {
                    Ok(token) => {
                        debug!(key = %key, expires_at = %token.expires_at, "token refreshed");
                        entry.token = Some(token.clone());
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "token refresh failed");
                        entry.token = None;
                    }
                }
                entry.pending = None;
            }
            // waiters may all have gone away; the value is kept for late borrowers
            sender.send_replace(Some(outcome));
        });
    }

    /// Drops the cached token so the next call refreshes.
    pub async fn invalidate(&self, key: &CacheKey) {
        if let Some(entry) = self.inner.lock().await.get_mut(key) {
            entry.token = None;
        }
    }

    /// Resolves once every refresh that was in flight at call time has finished.
    pub async fn wait_idle(&self) {
        let pending: Vec<_> = self
            .inner
            .lock()
            .await
            .values()
            .filter_map(Entry::live_pending)
            .collect();

        for mut receiver in pending {
            let _ = receiver.wait_for(Option::is_some).await;
        }
    }

    /// Number of keys with a usable token.
    pub async fn len(&self) -> usize {
        let now = now_utc();
        self.inner
            .lock()
            .await
            .values()
            .filter(|entry| entry.token.as_ref().is_some_and(|t| !t.is_stale_at(now)))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

async fn wait_for_outcome(
    receiver: &mut watch::Receiver<RefreshOutcome>,
) -> AuthResult<Arc<CachedToken>> {
    let outcome = receiver
        .wait_for(Option::is_some)
        .await
        .map_err(|_| AuthError::token_request("token refresh ended without a result"))?;

    match &*outcome {
        Some(result) => result.clone(),
        None => Err(AuthError::token_request("token refresh ended without a result")),
    }
}
