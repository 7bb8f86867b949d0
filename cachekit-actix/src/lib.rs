//! Actix-web integration for the distributed-cache adapter.
//!
//! This crate does not implement cache semantics itself — it translates actix-web
//! request state into calls against a [`CacheEngine`] scoped to the reserved
//! `__distributedCache__` partition, the same way `cachekit-axum` does for Axum.
//!
//! # Example
//!
//! ```rust,ignore
//! use actix_web::{web, App, HttpServer, HttpResponse};
//! use cachekit_actix::{CacheClient, DistributedCache};
//!
//! async fn handler(cache: DistributedCache<MyFactory>) -> HttpResponse {
//!     cache.0.refresh("session:42").await.ok();
//!     HttpResponse::Ok().finish()
//! }
//! ```

use std::future::{Future, Ready};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorInternalServerError,
    web, Error, FromRequest, HttpRequest,
};
use cachekit_engine::{
    CacheEngine, CacheError, CacheRead, ConnectionFactory, DISTRIBUTED_CACHE_PARTITION,
};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Errors surfaced at the actix-web boundary.
#[derive(Error, Debug, Clone)]
pub enum CacheActixError {
    /// More than one expiration kind was set on [`DistributedCacheEntryOptions`].
    #[error("at most one of sliding/absolute/absolute-relative expiration may be set")]
    ConflictingExpirationOptions,
    /// No [`CacheClient`] was registered as app data.
    #[error("distributed cache client not found in app data")]
    NotFound,
    /// The underlying engine operation failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl actix_web::ResponseError for CacheActixError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        match self {
            CacheActixError::ConflictingExpirationOptions => actix_web::http::StatusCode::BAD_REQUEST,
            CacheActixError::NotFound => actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
            CacheActixError::Cache(CacheError::InvalidArgument(_)) => actix_web::http::StatusCode::BAD_REQUEST,
            CacheActixError::Cache(CacheError::Capacity { .. }) => {
                actix_web::http::StatusCode::PAYLOAD_TOO_LARGE
            }
            CacheActixError::Cache(_) => actix_web::http::StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Result type for this adapter's operations.
pub type Result<T> = std::result::Result<T, CacheActixError>;

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
            return Err(CacheActixError::ConflictingExpirationOptions);
        }
        Ok(())
    }
}

/// A distributed-cache client that can be used with actix-web.
///
/// Register it with `App::app_data` and extract it in handlers via [`DistributedCache`].
/// Internally, keys live in the reserved [`DISTRIBUTED_CACHE_PARTITION`] partition of
/// the wrapped engine.
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

/// Extractor for getting a [`CacheClient`] in handlers from app data.
#[derive(Debug, Clone)]
pub struct DistributedCache<F, S = cachekit_engine::JsonSerializer, C = cachekit_engine::ZstdCompressor>(
    pub CacheClient<F, S, C>,
);

impl<F, S, C> FromRequest for DistributedCache<F, S, C>
where
    F: Send + Sync + 'static,
    S: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    type Error = Error;
    type Future = Ready<std::result::Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let result = req
            .app_data::<web::Data<CacheClient<F, S, C>>>()
            .map(|data| DistributedCache(data.get_ref().clone()))
            .ok_or_else(|| ErrorInternalServerError(CacheActixError::NotFound));

        std::future::ready(result)
    }
}

/// Middleware factory that makes a [`CacheClient`] available to handlers that don't
/// use the [`DistributedCache`] extractor directly (e.g. inner services composed via
/// `App::wrap`).
pub struct CacheMiddleware<F, S = cachekit_engine::JsonSerializer, C = cachekit_engine::ZstdCompressor> {
    client: CacheClient<F, S, C>,
}

impl<F, S, C> CacheMiddleware<F, S, C> {
    /// Wrap a client so it can be installed with `App::wrap`.
    pub fn new(client: CacheClient<F, S, C>) -> Self {
        Self { client }
    }
}

impl<Svc, B, F, S, C> Transform<Svc, ServiceRequest> for CacheMiddleware<F, S, C>
where
    Svc: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    Svc::Future: 'static,
    B: 'static,
    CacheClient<F, S, C>: Clone + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = CacheMiddlewareService<Svc, F, S, C>;
    type Future = Ready<std::result::Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: Svc) -> Self::Future {
        std::future::ready(Ok(CacheMiddlewareService { service, client: self.client.clone() }))
    }
}

/// The actual middleware service installed by [`CacheMiddleware`].
pub struct CacheMiddlewareService<Svc, F, S = cachekit_engine::JsonSerializer, C = cachekit_engine::ZstdCompressor> {
    service: Svc,
    client: CacheClient<F, S, C>,
}

impl<Svc, B, F, S, C> Service<ServiceRequest> for CacheMiddlewareService<Svc, F, S, C>
where
    Svc: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    Svc::Future: 'static,
    B: 'static,
    CacheClient<F, S, C>: Clone + 'static,
    F: 'static,
    S: 'static,
    C: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>>>>;

    fn poll_ready(
        &self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        debug!("CacheMiddleware handling request");
        req.extensions_mut().insert(self.client.clone());
        let fut = self.service.call(req);
        Box::pin(async move { fut.await })
    }
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        CacheActixError, CacheClient, CacheMiddleware, DistributedCache, DistributedCacheEntryOptions,
        Result,
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
            absolute_expiration_relative_to_now: Some(Duration::from_secs(60)),
            ..Default::default()
        };

        let result = client.set("session:1", b"hello".to_vec(), options).await;
        assert!(matches!(result, Err(CacheActixError::ConflictingExpirationOptions)));
    }
}
