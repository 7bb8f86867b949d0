//! SQLite-backed `ConnectionFactory` for `cachekit-engine`.
//!
//! This crate provides the one storage backend the cache engine ships with, using
//! `tokio-rusqlite` to run blocking `rusqlite` calls off the async runtime.
//!
//! # Features
//!
//! - Async access via `tokio-rusqlite`
//! - Connection pooling, tuned for SQLite's single-writer model
//! - PRAGMA-configurable journal/synchronous modes
//! - In-memory and file-based databases
//!
//! # Example
//!
//! ```rust,ignore
//! use cachekit_sqlite::{SqliteConnectionFactory, SqliteConfig};
//! use cachekit_engine::{CacheEngine, Settings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let factory = SqliteConnectionFactory::with_defaults(
//!         SqliteConfig::from_url("sqlite://./cache.db")?,
//!     )
//!     .await?;
//!     let engine = CacheEngine::new(factory, Settings::default()).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod pool;

pub use config::{DatabasePath, JournalMode, SqliteConfig, SynchronousMode};
pub use connection::SqliteConnection;
pub use engine::SqliteConnectionFactory;
pub use error::{SqliteError, SqliteResult};
pub use pool::{PoolConfig, SqlitePool, SqlitePoolBuilder};
