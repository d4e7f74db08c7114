//! Signing key cache with rate-limited, single-flight JWKS refresh.
//!
//! Resolution of a `kid`:
//!
//! 1. Cache hit returns immediately, without suspending.
//! 2. On a miss, join the refresh already in flight if there is one.
//! 3. Otherwise take one unit of fetch budget (fail fast with
//!    `RateLimitExceeded` if none is left) and start a refresh of the whole
//!    key set.
//! 4. Look the `kid` up in the refreshed set; `UnknownKeyId` if absent.
//!
//! At most one refresh is in flight at any time, whatever `kid` triggered
//! it, so a burst of misses costs one fetch and one unit of budget. Waiters
//! that join an in-flight refresh consume no budget.
//!
//! The refresh runs on its own task. A caller that is cancelled while
//! waiting does not abort it; the result still populates the cache for
//! everyone else.

use crate::auth::jwks::{JwksClient, KeySet, KeySetSource, PublicKey};
use crate::auth::rate_limit::FetchRateLimiter;
use crate::config::Config;
use crate::errors::KeyError;
use crate::observability::metrics::{record_key_cache_lookup, record_rate_limit_decision};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::instrument;

type RefreshFuture = Shared<BoxFuture<'static, Result<Arc<KeySet>, KeyError>>>;

/// A cached key and when its key set was fetched.
struct CachedKey {
    key: Arc<PublicKey>,
    fetched_at: Instant,
}

struct InFlightRefresh {
    id: u64,
    future: RefreshFuture,
}

/// State shared with spawned refresh tasks.
#[derive(Default)]
struct CacheState {
    entries: RwLock<HashMap<String, CachedKey>>,
    in_flight: Mutex<Option<InFlightRefresh>>,
}

impl CacheState {
    /// Replace the cached keys with a freshly fetched set.
    fn store(&self, key_set: &KeySet) {
        let fetched_at = Instant::now();
        let entries: HashMap<String, CachedKey> = key_set
            .iter()
            .map(|(kid, key)| {
                (
                    kid.to_string(),
                    CachedKey {
                        key: Arc::clone(key),
                        fetched_at,
                    },
                )
            })
            .collect();

        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        *guard = entries;
    }

    /// Clear the in-flight slot if it still belongs to refresh `id`.
    fn finish_refresh(&self, id: u64) {
        let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|r| r.id == id) {
            *slot = None;
        }
    }
}

/// Outcome of a miss: either another refresh already filled the cache, or
/// there is a refresh to wait on.
enum Pending {
    Ready(Arc<PublicKey>),
    Refresh(RefreshFuture),
}

/// Process-wide signing key cache.
///
/// Owned by the request-handling layer and shared by `Arc` with every
/// verification.
pub struct KeyCache {
    source: Arc<dyn KeySetSource>,
    rate_limiter: FetchRateLimiter,
    cache_enabled: bool,
    key_ttl: Option<Duration>,
    state: Arc<CacheState>,
    next_refresh_id: AtomicU64,
}

impl KeyCache {
    /// Create a cache over `source` with the given fetch budget.
    ///
    /// Caching is enabled and keys never expire by default.
    pub fn new(source: Arc<dyn KeySetSource>, rate_limiter: FetchRateLimiter) -> Self {
        Self {
            source,
            rate_limiter,
            cache_enabled: true,
            key_ttl: None,
            state: Arc::new(CacheState::default()),
            next_refresh_id: AtomicU64::new(0),
        }
    }

    /// Create a cache backed by an HTTP [`JwksClient`] for `config.jwks_uri()`.
    pub fn from_config(config: &Config) -> Self {
        let client = JwksClient::new(config.jwks_uri(), config.jwks_fetch_timeout);
        Self::new(
            Arc::new(client),
            FetchRateLimiter::new(config.jwks_fetch_rate_limit, config.jwks_fetch_window),
        )
        .with_cache_enabled(config.cache_enabled)
        .with_key_ttl(config.key_ttl)
    }

    /// When disabled, no keys are retained; misses are still coalesced and
    /// rate limited.
    #[must_use]
    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Treat keys older than `ttl` as absent.
    #[must_use]
    pub fn with_key_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.key_ttl = ttl;
        self
    }

    /// Resolve the verification key for `kid`.
    ///
    /// # Errors
    ///
    /// - `KeyError::RateLimitExceeded` if a fetch is needed and the budget is spent
    /// - `KeyError::Fetch` if the refresh failed
    /// - `KeyError::UnknownKeyId` if the refreshed set has no such key
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn resolve_key(&self, kid: &str) -> Result<Arc<PublicKey>, KeyError> {
        if let Some(key) = self.lookup(kid) {
            tracing::debug!(target: "auth.key_cache", "Key cache hit");
            record_key_cache_lookup("hit");
            return Ok(key);
        }

        let refresh = match self.join_or_start_refresh(kid)? {
            Pending::Ready(key) => return Ok(key),
            Pending::Refresh(refresh) => refresh,
        };

        let key_set = refresh.await?;

        key_set.get(kid).ok_or_else(|| {
            tracing::warn!(target: "auth.key_cache", "Key not found in JWKS after refresh");
            KeyError::UnknownKeyId
        })
    }

    /// Drop every cached key. The next lookup refreshes (subject to budget).
    pub fn invalidate(&self) {
        let mut entries = self
            .state
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.clear();
        tracing::info!(target: "auth.key_cache", "Key cache invalidated");
    }

    /// Number of keys currently cached (including any past their TTL).
    pub fn cached_key_count(&self) -> usize {
        self.state
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Remaining fetch budget in the current window.
    pub fn remaining_fetch_budget(&self) -> u32 {
        self.rate_limiter.remaining()
    }

    fn lookup(&self, kid: &str) -> Option<Arc<PublicKey>> {
        if !self.cache_enabled {
            return None;
        }

        let entries = self
            .state
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let cached = entries.get(kid)?;

        if let Some(ttl) = self.key_ttl {
            if cached.fetched_at.elapsed() >= ttl {
                tracing::debug!(target: "auth.key_cache", kid = %kid, "Cached key expired");
                return None;
            }
        }

        Some(Arc::clone(&cached.key))
    }

    /// Join the in-flight refresh, or start one if budget allows.
    ///
    /// Holds the in-flight lock across the budget check so two misses can
    /// never both start a refresh.
    fn join_or_start_refresh(&self, kid: &str) -> Result<Pending, KeyError> {
        let mut slot = self
            .state
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(in_flight) = slot.as_ref() {
            tracing::debug!(target: "auth.key_cache", "Joining in-flight JWKS refresh");
            record_key_cache_lookup("coalesced");
            return Ok(Pending::Refresh(in_flight.future.clone()));
        }

        // A refresh may have completed between the first lookup and taking
        // the lock; refreshes store keys before clearing the slot.
        if let Some(key) = self.lookup(kid) {
            record_key_cache_lookup("hit");
            return Ok(Pending::Ready(key));
        }

        record_key_cache_lookup("miss");

        if !self.rate_limiter.try_acquire() {
            tracing::warn!(
                target: "auth.key_cache",
                max_fetches = self.rate_limiter.max_fetches(),
                window_secs = self.rate_limiter.window().as_secs(),
                "JWKS fetch rate limit exceeded"
            );
            record_rate_limit_decision("rejected");
            return Err(KeyError::RateLimitExceeded);
        }
        record_rate_limit_decision("allowed");

        let id = self.next_refresh_id.fetch_add(1, Ordering::Relaxed);
        let future = self.spawn_refresh(id);
        *slot = Some(InFlightRefresh {
            id,
            future: future.clone(),
        });

        Ok(Pending::Refresh(future))
    }

    fn spawn_refresh(&self, id: u64) -> RefreshFuture {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let cache_enabled = self.cache_enabled;

        tracing::debug!(target: "auth.key_cache", refresh_id = id, "Starting JWKS refresh");

        let task = tokio::spawn({
            let state = Arc::clone(&state);
            async move {
                let result = source.fetch_key_set().await.map(Arc::new);
                if let Ok(key_set) = &result {
                    if cache_enabled {
                        state.store(key_set);
                    }
                }
                state.finish_refresh(id);
                result
            }
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(target: "auth.key_cache", error = %e, "JWKS refresh task failed");
                    state.finish_refresh(id);
                    Err(KeyError::Fetch("refresh task failed".to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }
}
