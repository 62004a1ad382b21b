use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::DecodingKey;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use super::circuit_breaker::{BreakerError, CircuitBreaker, CircuitBreakerConfig};
use super::AuthError;

#[derive(Default)]
struct CachedKeys {
    keys: Option<JwkSet>,
    fetched_at: Option<Instant>,
    last_attempt: Option<Instant>,
}

/// Signing keys of the identity provider.
///
/// Keys are refetched when older than `ttl`, or when a token names an unknown
/// `kid` (at most once per `min_refresh`). If the provider cannot be reached
/// the last known keys keep being served.
pub struct JwksCache {
    url: String,
    client: reqwest::Client,
    cache: RwLock<CachedKeys>,
    /// Held for the duration of one provider fetch
    fetching: Mutex<()>,
    breaker: CircuitBreaker,
    ttl: Duration,
    min_refresh: Duration,
}

impl JwksCache {
    pub fn new(url: impl Into<String>, ttl: Duration, min_refresh: Duration, breaker: CircuitBreakerConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            url: url.into(),
            client,
            cache: RwLock::new(CachedKeys::default()),
            fetching: Mutex::new(()),
            breaker: CircuitBreaker::new("jwks", breaker),
            ttl,
            min_refresh,
        }
    }

    /// `https://{domain}/.well-known/jwks.json`
    pub fn url_for_domain(domain: &str) -> String {
        format!("https://{}/.well-known/jwks.json", domain.trim_end_matches('/'))
    }

    /// Seed the cache, e.g. with keys loaded out of band
    pub async fn preload(&self, keys: JwkSet) {
        let mut cache = self.cache.write().await;
        cache.keys = Some(keys);
        cache.fetched_at = Some(Instant::now());
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Decoding key for `kid`, refreshing the key set when needed
    pub async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        let (found, stale, may_refresh, have_keys) = {
            let cache = self.cache.read().await;
            let found = Self::lookup(&cache, kid)?;
            let stale = cache.fetched_at.map_or(true, |t| t.elapsed() >= self.ttl);
            let may_refresh = cache.last_attempt.map_or(true, |t| t.elapsed() >= self.min_refresh);
            (found, stale, may_refresh, cache.keys.is_some())
        };

        if let Some(key) = found {
            if !stale || !may_refresh {
                return Ok(key);
            }
        }

        if may_refresh {
            if let Err(e) = self.refresh(have_keys).await {
                if !have_keys {
                    return Err(e);
                }
                warn!("JWKS refresh failed, serving cached keys: {}", e);
            }
        }

        let cache = self.cache.read().await;
        if cache.keys.is_none() {
            return Err(AuthError::KeySetUnavailable("no signing keys fetched yet".to_string()));
        }
        Self::lookup(&cache, kid)?.ok_or_else(|| AuthError::UnknownKey(kid.to_string()))
    }

    fn lookup(cache: &CachedKeys, kid: &str) -> Result<Option<DecodingKey>, AuthError> {
        match cache.keys.as_ref().and_then(|set| set.find(kid)) {
            Some(jwk) => Ok(Some(DecodingKey::from_jwk(jwk)?)),
            None => Ok(None),
        }
    }

    /// Fetch the key set without holding the cache lock. With keys already
    /// cached, a fetch in flight elsewhere is not waited for.
    async fn refresh(&self, have_keys: bool) -> Result<(), AuthError> {
        let _fetching = if have_keys {
            match self.fetching.try_lock() {
                Ok(guard) => guard,
                Err(_) => return Ok(()),
            }
        } else {
            self.fetching.lock().await
        };

        {
            let mut cache = self.cache.write().await;
            // Another request may have refreshed while we waited
            if cache.last_attempt.is_some_and(|t| t.elapsed() < self.min_refresh) {
                return Ok(());
            }
            cache.last_attempt = Some(Instant::now());
        }

        match self.breaker.call(self.fetch()).await {
            Ok(keys) => {
                debug!(keys = keys.keys.len(), "Fetched JWKS from {}", self.url);
                let mut cache = self.cache.write().await;
                cache.keys = Some(keys);
                cache.fetched_at = Some(Instant::now());
                Ok(())
            }
            Err(BreakerError::Open { retry_after_secs, .. }) => Err(AuthError::KeySetUnavailable(format!(
                "identity provider circuit open, retry in {}s",
                retry_after_secs
            ))),
            Err(BreakerError::Inner(e)) => Err(AuthError::KeySetUnavailable(e.to_string())),
        }
    }

    async fn fetch(&self) -> Result<JwkSet, reqwest::Error> {
        self.client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json::<JwkSet>()
            .await
    }
}
