//! Core types for the shadow replica engine
//!
//! This crate defines the foundational types shared by the index library
//! and the engine:
//! - ShardId: Identity of the shard an engine serves
//! - IndexError: Errors raised by the index library (directory, segments, store)
//! - EngineError: Engine-level error taxonomy
//! - Cause: Shared, cloneable failure cause recorded by a failed engine

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

pub use error::{
    is_corruption, is_out_of_memory, unwrap_corruption, Cause, EngineError, EngineResult,
    IndexError, IndexResult,
};
pub use types::ShardId;
