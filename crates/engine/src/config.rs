//! Engine configuration via `engine.toml`
//!
//! `EngineSettings` is the file-backed part: the corruption policy and the
//! keys that decide which engine a shard gets. On first start a default
//! `engine.toml` is written next to the shard data; edit it and restart to
//! change settings.
//!
//! `EngineConfig` is what an engine is built from: the settings plus the
//! collaborators wired in by the shard (store, listener, read-view provider).

use crate::listener::{FailedEngineListener, NoopFailedEngineListener};
use serde::{Deserialize, Serialize};
use shadow_core::{EngineError, EngineResult, ShardId};
use shadow_storage::{DirectoryReaderProvider, ReadViewProvider, SnapshotDeletionPolicy, Store};
use std::path::Path;
use std::sync::Arc;

/// Config file name placed in the shard data directory.
pub const CONFIG_FILE_NAME: &str = "engine.toml";

/// Factory name of the read/write engine.
pub const DEFAULT_ENGINE_FACTORY: &str = "internal";

/// Factory name of the shadow replica engine.
pub const DEFAULT_SHADOW_ENGINE_FACTORY: &str = "shadow";

/// Engine settings loaded from `engine.toml`.
///
/// # Example
///
/// ```toml
/// fail_on_corruption = true
/// shadow_replicas = true
/// engine_factory = "internal"
/// shadow_engine_factory = "shadow"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Fail the engine when a corrupted file is detected.
    #[serde(default = "default_true")]
    pub fail_on_corruption: bool,
    /// Replicas read the primary's files instead of indexing themselves.
    #[serde(default)]
    pub shadow_replicas: bool,
    /// Factory used for primaries and regular replicas.
    #[serde(default = "default_engine_factory")]
    pub engine_factory: String,
    /// Factory used for shadow replicas.
    #[serde(default = "default_shadow_engine_factory")]
    pub shadow_engine_factory: String,
}

fn default_true() -> bool {
    true
}

fn default_engine_factory() -> String {
    DEFAULT_ENGINE_FACTORY.to_string()
}

fn default_shadow_engine_factory() -> String {
    DEFAULT_SHADOW_ENGINE_FACTORY.to_string()
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            fail_on_corruption: true,
            shadow_replicas: false,
            engine_factory: default_engine_factory(),
            shadow_engine_factory: default_shadow_engine_factory(),
        }
    }
}

impl EngineSettings {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Shard engine configuration
#
# Fail the engine when a corrupted index file is detected (default: true).
# When false, corruption is logged and the engine keeps serving.
fail_on_corruption = true

# Shadow replicas (default: false)
# When true, replicas open the primary's index files read-only instead of
# indexing documents themselves. Requires a shared filesystem.
shadow_replicas = false

# Engine factories, by registered name.
#   engine_factory        = primaries and regular replicas
#   shadow_engine_factory = replicas when shadow_replicas is on
engine_factory = "internal"
shadow_engine_factory = "shadow"
"#
    }

    /// Parse settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be parsed or fails validation.
    pub fn from_toml_str(content: &str) -> EngineResult<Self> {
        let settings: EngineSettings = toml::from_str(content)
            .map_err(|e| EngineError::Config(format!("Failed to parse engine settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read and parse settings from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let settings: EngineSettings = toml::from_str(&content).map_err(|e| {
            EngineError::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check that both factory names are usable.
    pub fn validate(&self) -> EngineResult<()> {
        for (key, value) in [
            ("engine_factory", &self.engine_factory),
            ("shadow_engine_factory", &self.shadow_engine_factory),
        ] {
            if value.trim().is_empty() {
                return Err(EngineError::Config(format!(
                    "'{}' must name a registered engine factory",
                    key
                )));
            }
        }
        Ok(())
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> EngineResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                EngineError::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize these settings to TOML and write them to the given path.
    pub fn write_to_file(&self, path: &Path) -> EngineResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("Failed to serialize settings: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            EngineError::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

// ============================================================================
// EngineConfig
// ============================================================================

/// Everything an engine is constructed from
#[derive(Clone)]
pub struct EngineConfig {
    shard_id: ShardId,
    store: Arc<Store>,
    fail_on_corruption: bool,
    listener: Arc<dyn FailedEngineListener>,
    provider: Arc<dyn ReadViewProvider>,
    deletion_policy: SnapshotDeletionPolicy,
}

impl EngineConfig {
    /// Config over `store` with default collaborators
    pub fn new(store: Arc<Store>) -> Self {
        EngineConfig {
            shard_id: store.shard_id().clone(),
            store,
            fail_on_corruption: true,
            listener: Arc::new(NoopFailedEngineListener),
            provider: Arc::new(DirectoryReaderProvider),
            deletion_policy: SnapshotDeletionPolicy::new(),
        }
    }

    /// Config over `store` taking its policy from `settings`
    pub fn from_settings(store: Arc<Store>, settings: &EngineSettings) -> Self {
        Self::new(store).with_fail_on_corruption(settings.fail_on_corruption)
    }

    /// Set the corruption policy
    pub fn with_fail_on_corruption(mut self, fail_on_corruption: bool) -> Self {
        self.fail_on_corruption = fail_on_corruption;
        self
    }

    /// Set the failure listener
    pub fn with_listener(mut self, listener: Arc<dyn FailedEngineListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Set the read-view provider
    pub fn with_provider(mut self, provider: Arc<dyn ReadViewProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Share a snapshot deletion policy with the writer of the same index
    pub fn with_deletion_policy(mut self, policy: SnapshotDeletionPolicy) -> Self {
        self.deletion_policy = policy;
        self
    }

    /// Shard served
    pub fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    /// Store handle
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Whether corruption fails the engine
    pub fn fail_on_corruption(&self) -> bool {
        self.fail_on_corruption
    }

    /// Failure listener
    pub fn listener(&self) -> &Arc<dyn FailedEngineListener> {
        &self.listener
    }

    /// Read-view provider
    pub fn provider(&self) -> &Arc<dyn ReadViewProvider> {
        &self.provider
    }

    /// Snapshot deletion policy
    pub fn deletion_policy(&self) -> &SnapshotDeletionPolicy {
        &self.deletion_policy
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("shard_id", &self.shard_id)
            .field("fail_on_corruption", &self.fail_on_corruption)
            .finish()
    }
}
