//! Engine kinds and factory selection
//!
//! A shard gets a read-only replica engine when it is not the primary and
//! shadow replicas are enabled; otherwise it gets the read/write engine.
//! Each kind resolves to a factory by the name configured for it, looked up
//! in an `EngineFactoryRegistry`. Only the shadow factory is built in; the
//! read/write engine is registered by the embedding application.

use crate::config::{EngineConfig, EngineSettings, DEFAULT_SHADOW_ENGINE_FACTORY};
use crate::engine::Engine;
use crate::shadow::ShadowEngine;
use serde::{Deserialize, Serialize};
use shadow_core::{EngineError, EngineResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Capability of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineKind {
    /// Indexes documents and owns the index files
    ReadWrite,
    /// Serves another node's index files; all writes are no-ops
    ReadOnlyReplica,
}

impl EngineKind {
    /// Kind of engine a shard copy gets
    pub fn select(primary: bool, settings: &EngineSettings) -> Self {
        if !primary && settings.shadow_replicas {
            EngineKind::ReadOnlyReplica
        } else {
            EngineKind::ReadWrite
        }
    }

    /// Configured factory name for this kind
    pub fn factory_name(self, settings: &EngineSettings) -> &str {
        match self {
            EngineKind::ReadWrite => &settings.engine_factory,
            EngineKind::ReadOnlyReplica => &settings.shadow_engine_factory,
        }
    }

    /// True if write operations are discarded
    pub fn is_read_only(self) -> bool {
        matches!(self, EngineKind::ReadOnlyReplica)
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::ReadWrite => f.write_str("read-write"),
            EngineKind::ReadOnlyReplica => f.write_str("read-only-replica"),
        }
    }
}

/// Builds engines of one kind
pub trait EngineFactory: Send + Sync {
    /// Kind of engine this factory builds
    fn kind(&self) -> EngineKind;

    /// Build an engine from `config`
    fn new_engine(&self, config: EngineConfig) -> EngineResult<Box<dyn Engine>>;
}

/// Builds `ShadowEngine`s
#[derive(Debug, Default, Clone, Copy)]
pub struct ShadowEngineFactory;

impl EngineFactory for ShadowEngineFactory {
    fn kind(&self) -> EngineKind {
        EngineKind::ReadOnlyReplica
    }

    fn new_engine(&self, config: EngineConfig) -> EngineResult<Box<dyn Engine>> {
        Ok(Box::new(ShadowEngine::new(config)?))
    }
}

/// Engine factories by name
pub struct EngineFactoryRegistry {
    factories: HashMap<String, Arc<dyn EngineFactory>>,
}

impl EngineFactoryRegistry {
    /// Registry holding the built-in shadow factory
    pub fn new() -> Self {
        let mut registry = EngineFactoryRegistry {
            factories: HashMap::new(),
        };
        registry.register(DEFAULT_SHADOW_ENGINE_FACTORY, Arc::new(ShadowEngineFactory));
        registry
    }

    /// Register `factory` under `name`, replacing any previous one
    pub fn register(&mut self, name: impl Into<String>, factory: Arc<dyn EngineFactory>) {
        self.factories.insert(name.into(), factory);
    }

    /// Factory registered under `name`
    pub fn get(&self, name: &str) -> Option<&Arc<dyn EngineFactory>> {
        self.factories.get(name)
    }

    /// Factory for an engine of `kind`
    pub fn resolve(
        &self,
        kind: EngineKind,
        settings: &EngineSettings,
    ) -> EngineResult<Arc<dyn EngineFactory>> {
        let name = kind.factory_name(settings);
        let factory = self
            .get(name)
            .ok_or_else(|| EngineError::UnknownEngineFactory(name.to_string()))?;
        if factory.kind() != kind {
            return Err(EngineError::Config(format!(
                "engine factory [{}] builds {} engines, expected {}",
                name,
                factory.kind(),
                kind
            )));
        }
        Ok(Arc::clone(factory))
    }

    /// Build the engine a shard copy should run
    pub fn new_engine(
        &self,
        primary: bool,
        settings: &EngineSettings,
        config: EngineConfig,
    ) -> EngineResult<Box<dyn Engine>> {
        let kind = EngineKind::select(primary, settings);
        let factory = self.resolve(kind, settings)?;
        debug!(
            target: "shadow::engine",
            shard = %config.shard_id(),
            primary,
            kind = %kind,
            "Creating engine"
        );
        factory.new_engine(config)
    }
}

impl Default for EngineFactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EngineFactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("EngineFactoryRegistry")
            .field("factories", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shadow_core::ShardId;
    use shadow_storage::{Directory, Document, IndexWriter, Store};
    use tempfile::TempDir;

    fn shadow_settings() -> EngineSettings {
        EngineSettings {
            shadow_replicas: true,
            ..EngineSettings::default()
        }
    }

    #[test]
    fn test_select() {
        let plain = EngineSettings::default();
        let shadow = shadow_settings();
        assert_eq!(EngineKind::select(true, &plain), EngineKind::ReadWrite);
        assert_eq!(EngineKind::select(false, &plain), EngineKind::ReadWrite);
        assert_eq!(EngineKind::select(true, &shadow), EngineKind::ReadWrite);
        assert_eq!(EngineKind::select(false, &shadow), EngineKind::ReadOnlyReplica);
    }

    #[test]
    fn test_factory_names() {
        let settings = shadow_settings();
        assert_eq!(EngineKind::ReadWrite.factory_name(&settings), "internal");
        assert_eq!(EngineKind::ReadOnlyReplica.factory_name(&settings), "shadow");
    }

    #[test]
    fn test_read_write_factory_must_be_registered() {
        let registry = EngineFactoryRegistry::new();
        let err = registry
            .resolve(EngineKind::ReadWrite, &EngineSettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::UnknownEngineFactory(name) if name == "internal"));
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let registry = EngineFactoryRegistry::new();
        let settings = EngineSettings {
            engine_factory: "shadow".to_string(),
            ..EngineSettings::default()
        };
        let err = registry.resolve(EngineKind::ReadWrite, &settings).err().unwrap();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_replica_gets_shadow_engine() {
        let tmp = TempDir::new().unwrap();
        let dir = Directory::open(tmp.path()).unwrap();
        let mut writer = IndexWriter::open(&dir).unwrap();
        writer.add_document(Document::new("a", json!(1)));
        writer.commit().unwrap();
        let store = Arc::new(Store::new(ShardId::new("idx", 0), dir));

        let registry = EngineFactoryRegistry::new();
        let engine = registry
            .new_engine(false, &shadow_settings(), EngineConfig::new(Arc::clone(&store)))
            .unwrap();
        assert_eq!(engine.kind(), EngineKind::ReadOnlyReplica);
        assert_eq!(store.ref_count(), 2);
        drop(engine);
        assert_eq!(store.ref_count(), 1);
    }
}
