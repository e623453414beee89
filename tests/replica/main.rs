//! End-to-end tests for shadow replicas
//!
//! A primary `IndexWriter` commits into a directory; replicas are built
//! through the engine factory registry and follow its commit points.

#[path = "../common/mod.rs"]
mod common;

mod lifecycle;
mod recovery;
mod settings;
