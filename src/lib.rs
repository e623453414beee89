//! ShadowDB - read-only shadow replicas over a shared index directory
//!
//! A shadow replica serves searches and gets over index files that another
//! node (the primary) writes to a shared filesystem. It never indexes on its
//! own: every write operation is a no-op, and `refresh` makes the primary's
//! latest commit point visible.
//!
//! # Quick Start
//!
//! ```ignore
//! use shadowdb::{Directory, Engine, EngineConfig, ShadowEngine, ShardId, Store};
//! use std::sync::Arc;
//!
//! let directory = Directory::open("/mnt/shared/index-0")?;
//! let store = Arc::new(Store::new(ShardId::new("logs", 0), directory));
//! let engine = ShadowEngine::new(EngineConfig::new(store))?;
//!
//! engine.refresh("poll")?;
//! let searcher = engine.acquire_searcher("search")?;
//! let doc = searcher.reader().get("user:123");
//! ```
//!
//! # Architecture
//!
//! - `shadow-core`: shard identity and the error taxonomy
//! - `shadow-storage`: directory, segments, commit points, store and read views
//! - `shadow-engine`: the `Engine` surface, `ShadowEngine` and factory selection

pub use shadow_core::*;
pub use shadow_engine::*;
pub use shadow_storage::*;
