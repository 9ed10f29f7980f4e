//! Issuer key sets.
//!
//! A SMART Health Card issuer publishes its ES256 verification keys at
//! `{iss}/.well-known/jwks.json`. The trust evaluator reaches them through
//! [`KeySetSource`]; two sources are provided:
//!
//! - [`JwksCache`] fetches over HTTPS and keeps each key set until its
//!   `Cache-Control: max-age` runs out (clamped to configured bounds).
//! - [`StaticKeySets`] serves fixed key sets, for offline use and tests.
//!
//! Plain HTTP is refused unless [`KeySetCacheConfig::allow_http`] is set, and
//! response bodies above [`KeySetCacheConfig::max_response_size`] are refused.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use reqwest::header::{ACCEPT, CACHE_CONTROL, HeaderMap};
use tokio::sync::RwLock;
use url::Url;

use crate::error::TrustError;

/// Well-known path of an issuer's key set, relative to the issuer identifier.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
const MIN_TTL: Duration = Duration::from_secs(5 * 60);
const MAX_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RESPONSE_SIZE: usize = 1024 * 1024;

/// Builds the key-set URL for an issuer identifier.
pub fn jwks_uri(iss: &str) -> Result<Url, TrustError> {
    let raw = format!("{iss}{JWKS_PATH}");
    Url::parse(&raw).map_err(|e| TrustError::InvalidIssuerUrl(format!("{raw}: {e}")))
}

/// A source of issuer key sets.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    /// Returns the key set published at `jwks_uri`.
    async fn key_set(&self, jwks_uri: &Url) -> Result<Arc<JwkSet>, TrustError>;
}

/// Settings for [`JwksCache`].
#[derive(Debug, Clone)]
pub struct KeySetCacheConfig {
    /// Lifetime of a key set served without `max-age` (1 hour).
    pub default_ttl: Duration,
    /// Upper clamp for `max-age` (24 hours).
    pub max_ttl: Duration,
    /// Lower clamp for `max-age` (5 minutes).
    pub min_ttl: Duration,
    /// Per-request HTTP timeout (10 seconds).
    pub request_timeout: Duration,
    /// Largest accepted key-set document in bytes (1 MB).
    pub max_response_size: usize,
    /// Accept `http://` issuers. Test servers only.
    pub allow_http: bool,
}

impl Default for KeySetCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            max_ttl: MAX_TTL,
            min_ttl: MIN_TTL,
            request_timeout: REQUEST_TIMEOUT,
            max_response_size: MAX_RESPONSE_SIZE,
            allow_http: false,
        }
    }
}

impl KeySetCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_max_ttl(mut self, ttl: Duration) -> Self {
        self.max_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_min_ttl(mut self, ttl: Duration) -> Self {
        self.min_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_response_size(mut self, size: usize) -> Self {
        self.max_response_size = size;
        self
    }

    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    /// Applies `max-age` (if any) within the configured bounds.
    fn ttl_for(&self, max_age: Option<Duration>) -> Duration {
        max_age
            .unwrap_or(self.default_ttl)
            .clamp(self.min_ttl, self.max_ttl.max(self.min_ttl))
    }
}

struct CacheEntry {
    keys: Arc<JwkSet>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// HTTP key-set source with a per-URL TTL cache.
pub struct JwksCache {
    client: reqwest::Client,
    entries: RwLock<HashMap<String, CacheEntry>>,
    config: KeySetCacheConfig,
}

impl JwksCache {
    /// # Errors
    ///
    /// Returns [`TrustError::Network`] if the HTTP client cannot be built.
    pub fn new(config: KeySetCacheConfig) -> Result<Self, TrustError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TrustError::Network(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            entries: RwLock::new(HashMap::new()),
            config,
        })
    }

    pub fn with_defaults() -> Result<Self, TrustError> {
        Self::new(KeySetCacheConfig::default())
    }

    pub fn config(&self) -> &KeySetCacheConfig {
        &self.config
    }

    async fn lookup(&self, jwks_uri: &Url) -> Option<Arc<JwkSet>> {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .get(&cache_key(jwks_uri))
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| Arc::clone(&entry.keys))
    }

    /// Fetches the key set, bypassing and then replacing any cached copy.
    ///
    /// # Errors
    ///
    /// Fails on a disallowed scheme, transport errors, a non-2xx status, an
    /// oversized body or a body that is not a JWKS document.
    pub async fn refresh(&self, jwks_uri: &Url) -> Result<Arc<JwkSet>, TrustError> {
        let (keys, max_age) = self.fetch(jwks_uri).await?;
        let ttl = self.config.ttl_for(max_age);
        let keys = Arc::new(keys);

        tracing::debug!(
            uri = %jwks_uri,
            keys = keys.keys.len(),
            ttl_secs = ttl.as_secs(),
            "Cached issuer key set"
        );

        self.entries.write().await.insert(
            cache_key(jwks_uri),
            CacheEntry {
                keys: Arc::clone(&keys),
                expires_at: expiry(Instant::now(), ttl),
            },
        );
        Ok(keys)
    }

    async fn fetch(&self, jwks_uri: &Url) -> Result<(JwkSet, Option<Duration>), TrustError> {
        self.check_scheme(jwks_uri)?;
        tracing::debug!(uri = %jwks_uri, "Fetching issuer key set");

        let response = self
            .client
            .get(jwks_uri.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(uri = %jwks_uri, error = %e, "Key set request failed");
                if e.is_timeout() {
                    TrustError::Timeout(self.config.request_timeout.as_millis())
                } else {
                    TrustError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrustError::HttpStatus(status.as_u16()));
        }

        let limit = self.config.max_response_size;
        let too_large = TrustError::ResponseTooLarge { max_size: limit };
        if response
            .content_length()
            .is_some_and(|len| len > limit as u64)
        {
            return Err(too_large);
        }

        let max_age = max_age(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| TrustError::Network(e.to_string()))?;
        if body.len() > limit {
            return Err(too_large);
        }

        let keys = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(uri = %jwks_uri, error = %e, "Key set is not a JWKS document");
            TrustError::KeySetParse(e.to_string())
        })?;
        Ok((keys, max_age))
    }

    fn check_scheme(&self, uri: &Url) -> Result<(), TrustError> {
        match (uri.scheme(), self.config.allow_http) {
            ("https", _) | ("http", true) => Ok(()),
            _ => Err(TrustError::InvalidScheme),
        }
    }

    /// Drops the cached key set for `jwks_uri`.
    pub async fn invalidate(&self, jwks_uri: &Url) {
        if self.entries.write().await.remove(&cache_key(jwks_uri)).is_some() {
            tracing::debug!(uri = %jwks_uri, "Invalidated cached key set");
        }
    }

    /// Drops every expired entry.
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now));
        tracing::trace!(removed = before - entries.len(), "Key set cache cleanup");
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeySetSource for JwksCache {
    async fn key_set(&self, jwks_uri: &Url) -> Result<Arc<JwkSet>, TrustError> {
        match self.lookup(jwks_uri).await {
            Some(keys) => {
                tracing::trace!(uri = %jwks_uri, "Key set cache hit");
                Ok(keys)
            }
            None => self.refresh(jwks_uri).await,
        }
    }
}

/// Fixed key sets keyed by JWKS URL.
#[derive(Default)]
pub struct StaticKeySets {
    sets: HashMap<String, Arc<JwkSet>>,
}

impl StaticKeySets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the key set for an issuer identifier.
    pub fn insert_issuer(&mut self, iss: &str, jwks: JwkSet) -> Result<(), TrustError> {
        let uri = jwks_uri(iss)?;
        self.sets.insert(cache_key(&uri), Arc::new(jwks));
        Ok(())
    }

    #[must_use]
    pub fn with_issuer(mut self, iss: &str, jwks: JwkSet) -> Self {
        if let Err(e) = self.insert_issuer(iss, jwks) {
            tracing::warn!(iss, error = %e, "Ignoring key set for invalid issuer");
        }
        self
    }
}

#[async_trait]
impl KeySetSource for StaticKeySets {
    async fn key_set(&self, jwks_uri: &Url) -> Result<Arc<JwkSet>, TrustError> {
        self.sets
            .get(&cache_key(jwks_uri))
            .cloned()
            .ok_or_else(|| TrustError::Network(format!("No key set registered for {jwks_uri}")))
    }
}

/// `max-age` from a `Cache-Control` header, if present and numeric.
fn max_age(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get_all(CACHE_CONTROL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|directive| {
            let (name, seconds) = directive.trim().split_once('=')?;
            if !name.eq_ignore_ascii_case("max-age") {
                return None;
            }
            seconds.trim_matches('"').parse().ok().map(Duration::from_secs)
        })
}

/// `now + ttl`, falling back to [`MAX_TTL`] when the sum is not representable.
fn expiry(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(MAX_TTL))
        .unwrap_or(now)
}

fn cache_key(uri: &Url) -> String {
    uri.as_str().trim_end_matches('/').to_string()
}
