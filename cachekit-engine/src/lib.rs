//! # cachekit-engine
//!
//! A persistent, partition-scoped key-value cache engine. Entries live in a
//! SQL-backed store behind a dialect-agnostic [`ConnectionFactory`], support timed,
//! sliding, and static lifetimes, and may declare parent keys whose removal cascades
//! transitively to dependents.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cachekit_engine::prelude::*;
//! use std::time::Duration;
//!
//! let engine = CacheEngine::new(factory, Settings::default()).await?;
//! let cancel = CancellationToken::new();
//!
//! engine
//!     .add("users", "42", &user, Expiration::Sliding { interval: Duration::from_secs(300) }, vec![], &cancel)
//!     .await?;
//!
//! if let CacheRead::Present(user) = engine.get::<User>("users", "42", &cancel).await? {
//!     // ...
//! }
//! ```

pub mod clock;
pub mod codec;
pub mod connection_factory;
pub mod engine;
pub mod error;
pub mod item;
pub mod maintenance;
pub mod random;
pub mod settings;

pub use clock::{Clock, SystemClock};
pub use codec::{Compressor, JsonSerializer, NoopCompressor, Serializer, ValueCodec, ZstdCompressor};
pub use connection_factory::{ConnectionFactory, StoredRow};
pub use engine::CacheEngine;
pub use error::{CacheError, CacheResult};
pub use item::{
    CacheItem, CacheRead, CacheReadMode, Expiration, LifetimeKind, ParentKeys,
    DISTRIBUTED_CACHE_PARTITION,
};
pub use random::{Random, ThreadRandom};
pub use settings::{Settings, SettingsHandle};

/// Convenience re-export of the crate's public surface.
pub mod prelude {
    pub use crate::clock::{Clock, SystemClock};
    pub use crate::codec::{Compressor, JsonSerializer, NoopCompressor, Serializer, ZstdCompressor};
    pub use crate::connection_factory::{ConnectionFactory, StoredRow};
    pub use crate::engine::CacheEngine;
    pub use crate::error::{CacheError, CacheResult};
    pub use crate::item::{
        CacheItem, CacheRead, CacheReadMode, Expiration, LifetimeKind, ParentKeys,
        DISTRIBUTED_CACHE_PARTITION,
    };
    pub use crate::random::{Random, ThreadRandom};
    pub use crate::settings::{Settings, SettingsHandle};
    pub use tokio_util::sync::CancellationToken;
}
