//! Axum integration for the distributed-cache adapter.
//!
//! This crate does not implement cache semantics itself — it translates Axum request
//! state into calls against a [`CacheEngine`] scoped to the reserved
//! `__distributedCache__` partition, the same way [`cachekit_actix`] does for
//! actix-web.
//!
//! # Example
//!
//! ```rust,ignore
//! use axum::{Router, routing::get, extract::State};
//! use cachekit_axum::{CacheLayer, CacheClient};
//! use std::sync::Arc;
//!
//! async fn handler(State(cache): State<Arc<CacheClient<MyFactory>>>) -> String {
//!     cache.refresh("session:42").await.ok();
//!     "ok".to_string()
//! }
//!
//! let app = Router::new()
//!     .route("/", get(handler))
//!     .layer(CacheLayer::new(client.clone()))
//!     .with_state(client);
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{Request, StatusCode},
    response::IntoResponse,
};
use cachekit_engine::{
    CacheEngine, CacheError, CacheRead, ConnectionFactory, DISTRIBUTED_CACHE_PARTITION,
};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};
use tracing::{debug, instrument};

/// Errors surfaced at the Axum boundary. Wraps [`CacheError`] with the one failure
/// mode specific to this adapter: conflicting expiration options.
#[derive(Error, Debug, Clone)]
pub enum CacheAxumError {
    /// More than one expiration kind was set on [`DistributedCacheEntryOptions`].
    #[error("at most one of sliding/absolute/absolute-relative expiration may be set")]
    ConflictingExpirationOptions,
    /// The underlying engine operation failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl IntoResponse for CacheAxumError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            CacheAxumError::ConflictingExpirationOptions => StatusCode::BAD_REQUEST,
            CacheAxumError::Cache(CacheError::InvalidArgument(_)) => StatusCode::BAD_REQUEST,
            CacheAxumError::Cache(CacheError::Capacity { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            CacheAxumError::Cache(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, self.to_string()).into_response()
    }
}

/// Result type for this adapter's operations.
pub type Result<T> = std::result::Result<T, CacheAxumError>;

/// Expiration options for a distributed-cache `Set`. At most one field may be
/// populated; validated by [`DistributedCacheEntryOptions::validate`].
#[derive(Debug, Clone, Default)]
pub struct DistributedCacheEntryOptions {
    /// Reset the expiry to `now + interval` on every read.
    pub sliding_expiration: Option<Duration>,
    /// Expire at a fixed point in time.
    pub absolute_expiration: Option<DateTime<Utc>>,
    /// Expire `duration` after the entry is written.
    pub absolute_expiration_relative_to_now: Option<Duration>,
}

impl DistributedCacheEntryOptions {
    fn set_count(&self) -> usize {
        [
            self.sliding_expiration.is_some(),
            self.absolute_expiration.is_some(),
            self.absolute_expiration_relative_to_now.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }

    fn validate(&self) -> Result<()> {
        if self.set_count() > 1 {
            return Err(CacheAxumError::ConflictingExpirationOptions);
        }
        Ok(())
    }
}

/// A distributed-cache client that can be used with Axum.
///
/// Add it to your router state and extract it in handlers, or wrap the whole router
/// with [`CacheLayer`]. Internally, keys live in the reserved
/// [`DISTRIBUTED_CACHE_PARTITION`] partition of the wrapped engine.
pub struct CacheClient<F, S = cachekit_engine::JsonSerializer, C = cachekit_engine::ZstdCompressor> {
    engine: Arc<CacheEngine<F, S, C>>,
}

impl<F, S, C> Clone for CacheClient<F, S, C> {
    fn clone(&self) -> Self {
        Self { engine: Arc::clone(&self.engine) }
    }
}

impl<F, S, C> CacheClient<F, S, C>
where
    F: ConnectionFactory,
    S: cachekit_engine::Serializer,
    C: cachekit_engine::Compressor,
{
    /// Wrap an existing engine instance.
    pub fn new(engine: Arc<CacheEngine<F, S, C>>) -> Self {
        Self { engine }
    }

    /// `Get(key) -> bytes`.
    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let cancel = CancellationToken::new();
        match self.engine.get::<Vec<u8>>(DISTRIBUTED_CACHE_PARTITION, key, &cancel).await? {
            CacheRead::Present(bytes) => {
                debug!("distributed cache hit");
                Ok(Some(bytes))
            }
            CacheRead::Absent => Ok(None),
        }
    }

    /// `Set(key, bytes, options)`. Falls back to
    /// `DefaultDistributedCacheAbsoluteExpiration` when `options` sets nothing.
    #[instrument(skip(self, value, options))]
    pub async fn set(&self, key: &str, value: Vec<u8>, options: DistributedCacheEntryOptions) -> Result<()> {
        options.validate()?;
        let cancel = CancellationToken::new();
        let settings = self.engine.settings().get();

        let expiration = if let Some(interval) = options.sliding_expiration {
            cachekit_engine::Expiration::Sliding { interval }
        } else if let Some(at) = options.absolute_expiration {
            cachekit_engine::Expiration::Timed { utc_expiry: at }
        } else if let Some(relative) = options.absolute_expiration_relative_to_now {
            cachekit_engine::Expiration::Timed {
                utc_expiry: Utc::now()
                    + chrono::Duration::from_std(relative)
                        .unwrap_or_else(|_| chrono::Duration::zero()),
            }
        } else {
            cachekit_engine::Expiration::Timed {
                utc_expiry: Utc::now()
                    + chrono::Duration::from_std(settings.default_distributed_cache_absolute_expiration)
                        .unwrap_or_else(|_| chrono::Duration::zero()),
            }
        };

        self.engine
            .add(DISTRIBUTED_CACHE_PARTITION, key, &value, expiration, Vec::new(), &cancel)
            .await?;
        Ok(())
    }

    /// `Refresh(key)`: a read that discards its result, extending sliding expiry.
    #[instrument(skip(self))]
    pub async fn refresh(&self, key: &str) -> Result<()> {
        let cancel = CancellationToken::new();
        self.engine.get::<Vec<u8>>(DISTRIBUTED_CACHE_PARTITION, key, &cancel).await?;
        Ok(())
    }

    /// `Remove(key)`.
    #[instrument(skip(self))]
    pub async fn remove(&self, key: &str) -> Result<()> {
        let cancel = CancellationToken::new();
        self.engine.remove(DISTRIBUTED_CACHE_PARTITION, key, &cancel).await?;
        Ok(())
    }
}

/// Tower layer that makes a [`CacheClient`] available to downstream services via
/// request extensions.
pub struct CacheLayer<F, S = cachekit_engine::JsonSerializer, C = cachekit_engine::ZstdCompressor> {
    client: CacheClient<F, S, C>,
}

impl<F, S, C> CacheLayer<F, S, C> {
    /// Wrap a client so it can be installed as Tower middleware.
    pub fn new(client: CacheClient<F, S, C>) -> Self {
        Self { client }
    }
}

impl<F, S, C> Clone for CacheLayer<F, S, C>
where
    CacheClient<F, S, C>: Clone,
{
    fn clone(&self) -> Self {
        Self { client: self.client.clone() }
    }
}

impl<Svc, F, S, C> Layer<Svc> for CacheLayer<F, S, C>
where
    CacheClient<F, S, C>: Clone,
{
    type Service = CacheMiddleware<Svc, F, S, C>;

    fn layer(&self, inner: Svc) -> Self::Service {
        CacheMiddleware { inner, client: self.client.clone() }
    }
}

/// Tower middleware service installed by [`CacheLayer`].
pub struct CacheMiddleware<Svc, F, S = cachekit_engine::JsonSerializer, C = cachekit_engine::ZstdCompressor> {
    inner: Svc,
    client: CacheClient<F, S, C>,
}

impl<Svc: Clone, F, S, C> Clone for CacheMiddleware<Svc, F, S, C>
where
    CacheClient<F, S, C>: Clone,
{
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), client: self.client.clone() }
    }
}

impl<Svc, ReqBody, F, S, C> Service<Request<ReqBody>> for CacheMiddleware<Svc, F, S, C>
where
    Svc: Service<Request<ReqBody>> + Clone + Send + 'static,
    Svc::Future: Send,
    ReqBody: Send + 'static,
    F: Send + Sync + 'static,
    S: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    type Response = Svc::Response;
    type Error = Svc::Error;
    type Future = Svc::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        debug!("CacheMiddleware handling request");
        request.extensions_mut().insert(self.client.clone());
        self.inner.call(request)
    }
}

/// Extractor for getting a [`CacheClient`] in handlers, either from request
/// extensions (set by [`CacheMiddleware`]) or from router state via [`FromRef`].
#[derive(Debug)]
pub struct DistributedCache<F, S = cachekit_engine::JsonSerializer, C = cachekit_engine::ZstdCompressor>(
    pub CacheClient<F, S, C>,
);

impl<F, S, C> Clone for DistributedCache<F, S, C>
where
    CacheClient<F, S, C>: Clone,
{
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[axum::async_trait]
impl<AppState, F, S, C> FromRequestParts<AppState> for DistributedCache<F, S, C>
where
    CacheClient<F, S, C>: FromRef<AppState> + Clone + Send + Sync + 'static,
    AppState: Send + Sync,
{
    type Rejection = CacheAxumError;

    async fn from_request_parts(
        _parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        Ok(DistributedCache(CacheClient::<F, S, C>::from_ref(state)))
    }
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        CacheAxumError, CacheClient, CacheLayer, CacheMiddleware, DistributedCache,
        DistributedCacheEntryOptions, Result,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachekit_engine::Settings;
    use cachekit_sqlite::{SqliteConfig, SqliteConnectionFactory};

    async fn client() -> CacheClient<SqliteConnectionFactory> {
        let factory = SqliteConnectionFactory::with_defaults(SqliteConfig::memory()).await.unwrap();
        let engine = CacheEngine::new(factory, Settings::default()).await.unwrap();
        CacheClient::new(Arc::new(engine))
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let client = client().await;
        client
            .set("session:1", b"hello".to_vec(), DistributedCacheEntryOptions::default())
            .await
            .unwrap();

        let found = client.get("session:1").await.unwrap();
        assert_eq!(found, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn conflicting_options_are_rejected() {
        let client = client().await;
        let options = DistributedCacheEntryOptions {
            sliding_expiration: Some(Duration::from_secs(60)),
            absolute_expiration: Some(Utc::now()),
            ..Default::default()
        };

        let result = client.set("session:1", b"hello".to_vec(), options).await;
        assert!(matches!(result, Err(CacheAxumError::ConflictingExpirationOptions)));
    }

    #[tokio::test]
    async fn remove_clears_the_entry() {
        let client = client().await;
        client
            .set("session:1", b"hello".to_vec(), DistributedCacheEntryOptions::default())
            .await
            .unwrap();
        client.remove("session:1").await.unwrap();

        assert_eq!(client.get("session:1").await.unwrap(), None);
    }
}
