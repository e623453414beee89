//! Shard engines for shadow replicas
//!
//! This crate coordinates a shard's view of its index:
//! - Engine: the call surface shard-level callers use for any engine kind
//! - ShadowEngine: read-only replica over index files written by the primary
//! - Searcher: scoped read view holding a store reference
//! - Recovery: single-phase handoff of a pinned commit point
//! - Fail-engine protocol: first failure wins, listener told exactly once
//! - EngineKind and factories: which engine a shard copy runs
//!
//! A shadow replica never writes. Index files appear in its directory through
//! a shared filesystem, and `refresh` makes the primary's latest commit point
//! visible.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod factory;
pub mod listener;
pub mod operation;
pub mod recovery;
pub mod searcher;
pub mod segments;
pub mod shadow;
pub mod state;

pub use config::{EngineConfig, EngineSettings, CONFIG_FILE_NAME};
pub use engine::Engine;
pub use factory::{EngineFactory, EngineFactoryRegistry, EngineKind, ShadowEngineFactory};
pub use listener::{FailedEngineListener, NoopFailedEngineListener, RecoveryHandler};
pub use operation::{Create, Delete, DeleteByQuery, ForceMergeOptions, Get, GetResult, Index};
pub use recovery::{RecoveryCounter, RecoveryGuard};
pub use searcher::Searcher;
pub use segments::{Segment, SegmentsStats};
pub use shadow::ShadowEngine;
pub use state::EngineState;
