//! Engine selection driven by `engine.toml`

use crate::common::*;
use shadowdb::CONFIG_FILE_NAME;

#[test]
fn default_settings_file_keeps_replicas_read_write() {
    let index = SharedIndex::new();
    let path = index.scratch(CONFIG_FILE_NAME);
    EngineSettings::write_default_if_missing(&path).unwrap();
    let settings = EngineSettings::from_file(&path).unwrap();
    assert_eq!(settings, EngineSettings::default());

    assert_eq!(EngineKind::select(false, &settings), EngineKind::ReadWrite);
    let err = EngineFactoryRegistry::new()
        .new_engine(false, &settings, index.config(&index.store(0)))
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::UnknownEngineFactory(name) if name == "internal"));
}

#[test]
fn shadow_replicas_from_file() {
    let mut index = SharedIndex::new();
    index.commit_docs(&["a"]);
    let path = index.scratch(CONFIG_FILE_NAME);
    std::fs::write(&path, "shadow_replicas = true\nfail_on_corruption = false\n").unwrap();
    let settings = EngineSettings::from_file(&path).unwrap();
    assert!(settings.shadow_replicas);
    assert_eq!(settings.shadow_engine_factory, "shadow");

    let store = index.store(0);
    let config = EngineConfig::from_settings(store.clone(), &settings);
    assert!(!config.fail_on_corruption());
    let engine = EngineFactoryRegistry::new()
        .new_engine(false, &settings, config)
        .unwrap();
    assert_eq!(engine.kind(), EngineKind::ReadOnlyReplica);
    assert_eq!(visible_ids(engine.as_ref()), vec!["a"]);

    drop(engine);
    assert_eq!(store.ref_count(), 1);
}

#[test]
fn settings_round_trip_through_file() {
    let index = SharedIndex::new();
    let path = index.scratch("custom.toml");
    let settings = EngineSettings {
        shadow_replicas: true,
        shadow_engine_factory: "replica-v2".to_string(),
        ..EngineSettings::default()
    };
    settings.write_to_file(&path).unwrap();
    assert_eq!(EngineSettings::from_file(&path).unwrap(), settings);

    let err = EngineFactoryRegistry::new()
        .new_engine(false, &settings, index.config(&index.store(0)))
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::UnknownEngineFactory(name) if name == "replica-v2"));
}
