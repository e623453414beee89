//! Error types for the shadow replica engine
//!
//! Two layers:
//! - `IndexError`: raised by the index library (directory I/O, segment
//!   decoding, store reference counting). Never surfaced raw by the engine.
//! - `EngineError`: the engine taxonomy every public operation returns.
//!
//! `Cause` is the shared form of an arbitrary error. A failed engine records
//! exactly one `Cause` and chains it into every error it raises afterwards,
//! so it has to be cheap to clone and safe to hand across threads.
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::types::ShardId;
use std::collections::TryReserveError;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for index library operations
pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Result type alias for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

// ============================================================================
// IndexError
// ============================================================================

/// Errors raised by the index library
#[derive(Debug, Error)]
pub enum IndexError {
    /// I/O error from the underlying directory
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A file failed validation (magic, version, checksum or payload)
    #[error("index corrupted [{resource}]: {message}")]
    Corruption {
        /// File or logical resource that failed validation
        resource: String,
        /// What was wrong with it
        message: String,
    },

    /// The resource (store, manager, reader) was already closed
    #[error("already closed: {0}")]
    AlreadyClosed(String),

    /// An allocation could not be satisfied
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// The directory contains no commit point
    #[error("no committed index found in {}", .0.display())]
    IndexNotFound(PathBuf),

    /// Operation is not valid in the current state
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl IndexError {
    /// Build a corruption error for the given resource
    pub fn corruption(resource: impl Into<String>, message: impl Into<String>) -> Self {
        IndexError::Corruption {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// True for corruption-class errors
    pub fn is_corruption(&self) -> bool {
        matches!(self, IndexError::Corruption { .. })
    }

    /// True when the resource was torn down underneath the caller
    pub fn is_already_closed(&self) -> bool {
        matches!(self, IndexError::AlreadyClosed(_))
    }

    /// True for out-of-memory-class errors
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, IndexError::OutOfMemory(_))
    }
}

impl From<TryReserveError> for IndexError {
    fn from(e: TryReserveError) -> Self {
        IndexError::OutOfMemory(e.to_string())
    }
}

// ============================================================================
// Cause
// ============================================================================

/// Shared, cloneable error used as a failure cause
///
/// Transparent: `Display` and `source()` are those of the wrapped error, and
/// the classification helpers in this module look through it.
#[derive(Clone)]
pub struct Cause(Arc<dyn StdError + Send + Sync + 'static>);

impl Cause {
    /// Wrap an error
    pub fn new<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Cause(Arc::new(err))
    }

    /// Cause carrying only a message
    pub fn msg(message: impl Into<String>) -> Self {
        Cause(Arc::new(MessageError(message.into())))
    }

    /// The wrapped error
    pub fn as_error(&self) -> &(dyn StdError + 'static) {
        &*self.0
    }

    /// Downcast the wrapped error
    pub fn downcast_ref<T: StdError + 'static>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// True if both causes share the same underlying error instance
    pub fn ptr_eq(&self, other: &Cause) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// True if the cause chain contains a corruption-class error
    pub fn is_corruption(&self) -> bool {
        is_corruption(self.as_error())
    }

    /// True if the cause chain contains an out-of-memory-class error
    pub fn is_out_of_memory(&self) -> bool {
        is_out_of_memory(self.as_error())
    }
}

impl fmt::Debug for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl StdError for Cause {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

impl From<IndexError> for Cause {
    fn from(e: IndexError) -> Self {
        Cause::new(e)
    }
}

impl From<EngineError> for Cause {
    fn from(e: EngineError) -> Self {
        Cause::new(e)
    }
}

impl From<io::Error> for Cause {
    fn from(e: io::Error) -> Self {
        Cause::new(e)
    }
}

impl From<Box<dyn StdError + Send + Sync + 'static>> for Cause {
    fn from(e: Box<dyn StdError + Send + Sync + 'static>) -> Self {
        Cause(Arc::from(e))
    }
}

#[derive(Debug)]
struct MessageError(String);

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for MessageError {}

// ============================================================================
// Classification
// ============================================================================

/// Walk the source chain (looking through `Cause`) for a matching error
fn find_in_chain<'a, T, F>(mut err: &'a (dyn StdError + 'static), pred: F) -> Option<&'a T>
where
    T: StdError + 'static,
    F: Fn(&T) -> bool,
{
    loop {
        if let Some(cause) = err.downcast_ref::<Cause>() {
            err = cause.as_error();
            continue;
        }
        if let Some(found) = err.downcast_ref::<T>() {
            if pred(found) {
                return Some(found);
            }
        }
        err = err.source()?;
    }
}

/// First corruption-class error in the chain, if any
pub fn unwrap_corruption<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a IndexError> {
    find_in_chain(err, IndexError::is_corruption)
}

/// True if the chain contains a corruption-class error
pub fn is_corruption(err: &(dyn StdError + 'static)) -> bool {
    unwrap_corruption(err).is_some()
}

/// True if the chain contains an out-of-memory-class error
pub fn is_out_of_memory(err: &(dyn StdError + 'static)) -> bool {
    find_in_chain(err, IndexError::is_out_of_memory).is_some()
        || find_in_chain::<TryReserveError, _>(err, |_| true).is_some()
}

// ============================================================================
// EngineError
// ============================================================================

/// Error taxonomy of the engine
///
/// Low-level errors are always wrapped; once the engine is closed or failed
/// every read, query and recovery operation reports `Closed`, with the
/// recorded failure (if any) as its source.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine is closed or failed
    #[error("{shard_id} engine is closed")]
    Closed {
        /// Shard the engine serves
        shard_id: ShardId,
        /// Recorded failure, or the error that hit the closed engine
        #[source]
        cause: Option<Cause>,
    },

    /// Generic engine failure wrapping an underlying error
    #[error("{shard_id} {message}")]
    Failure {
        /// Shard the engine serves
        shard_id: ShardId,
        /// Operation that failed
        message: String,
        /// Underlying error
        #[source]
        cause: Cause,
    },

    /// Refreshing the read view failed
    #[error("{shard_id} refresh failed")]
    RefreshFailed {
        /// Shard the engine serves
        shard_id: ShardId,
        /// Underlying error
        #[source]
        cause: Cause,
    },

    /// Taking a commit-point snapshot failed
    #[error("{shard_id} snapshot failed")]
    SnapshotFailed {
        /// Shard the engine serves
        shard_id: ShardId,
        /// Underlying error
        #[source]
        cause: Cause,
    },

    /// A recovery session failed
    #[error("{shard_id} phase[{phase}] {message}")]
    RecoveryFailed {
        /// Shard the engine serves
        shard_id: ShardId,
        /// Recovery phase that failed
        phase: u8,
        /// What failed in that phase
        message: String,
        /// Underlying error
        #[source]
        cause: Cause,
    },

    /// A query-time handle could not be acquired
    #[error("{shard_id} failed to acquire searcher, source {source_tag}")]
    QueryAcquisitionFailed {
        /// Shard the engine serves
        shard_id: ShardId,
        /// Tag of the caller that asked for the handle
        source_tag: String,
        /// Underlying error
        #[source]
        cause: Cause,
    },

    /// Invalid engine settings
    #[error("invalid engine configuration: {0}")]
    Config(String),

    /// No factory is registered under the configured name
    #[error("no engine factory registered under [{0}]")]
    UnknownEngineFactory(String),
}

impl EngineError {
    /// Closed error with an optional cause
    pub fn closed(shard_id: &ShardId, cause: Option<Cause>) -> Self {
        EngineError::Closed {
            shard_id: shard_id.clone(),
            cause,
        }
    }

    /// Generic failure wrapping `cause`
    pub fn failure(shard_id: &ShardId, message: impl Into<String>, cause: impl Into<Cause>) -> Self {
        EngineError::Failure {
            shard_id: shard_id.clone(),
            message: message.into(),
            cause: cause.into(),
        }
    }

    /// True for `Closed`
    pub fn is_closed(&self) -> bool {
        matches!(self, EngineError::Closed { .. })
    }

    /// Shard the error belongs to, if it is shard-scoped
    pub fn shard_id(&self) -> Option<&ShardId> {
        match self {
            EngineError::Closed { shard_id, .. }
            | EngineError::Failure { shard_id, .. }
            | EngineError::RefreshFailed { shard_id, .. }
            | EngineError::SnapshotFailed { shard_id, .. }
            | EngineError::RecoveryFailed { shard_id, .. }
            | EngineError::QueryAcquisitionFailed { shard_id, .. } => Some(shard_id),
            EngineError::Config(_) | EngineError::UnknownEngineFactory(_) => None,
        }
    }

    /// Directly chained cause, if any
    pub fn cause(&self) -> Option<&Cause> {
        match self {
            EngineError::Closed { cause, .. } => cause.as_ref(),
            EngineError::Failure { cause, .. }
            | EngineError::RefreshFailed { cause, .. }
            | EngineError::SnapshotFailed { cause, .. }
            | EngineError::RecoveryFailed { cause, .. }
            | EngineError::QueryAcquisitionFailed { cause, .. } => Some(cause),
            EngineError::Config(_) | EngineError::UnknownEngineFactory(_) => None,
        }
    }

    /// True if the directly chained cause is itself a `Closed` error
    pub fn is_caused_by_closed(&self) -> bool {
        self.cause()
            .and_then(|c| c.downcast_ref::<EngineError>())
            .is_some_and(EngineError::is_closed)
    }
}
