use wayfarer::config::WayfarerConfig;

#[test]
fn default_config_values() {
    let config = WayfarerConfig::default();

    assert_eq!(config.orchestrator.max_parallel_tasks, 4);
    assert_eq!(config.orchestrator.max_iterations, 64);

    assert_eq!(config.react.max_steps, 6);
    assert_eq!(config.react.tool_timeout_secs, 60);

    assert_eq!(config.tot.beam_width, 3);
    assert_eq!(config.tot.max_depth, 4);
    assert!((config.tot.score_threshold - 5.0).abs() < f64::EPSILON);

    assert_eq!(config.recovery.max_retries, 3);
    assert_eq!(config.research.max_write_conflicts, 3);

    config.validate().unwrap();
}

#[tokio::test]
async fn save_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = WayfarerConfig::default();
    config.recovery.max_retries = 5;
    config.tot.beam_width = 2;

    config.save(dir.path()).await.unwrap();
    let loaded = WayfarerConfig::load(dir.path()).await.unwrap();

    assert_eq!(loaded.recovery.max_retries, 5);
    assert_eq!(loaded.tot.beam_width, 2);
}

#[tokio::test]
async fn missing_config_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = WayfarerConfig::load(dir.path()).await.unwrap();
    assert_eq!(config.orchestrator.max_parallel_tasks, 4);
}

#[tokio::test]
async fn partial_config_file_keeps_other_defaults() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(
        dir.path().join("config.toml"),
        "[recovery]\nmax_retries = 7\n",
    )
    .await
    .unwrap();

    let config = WayfarerConfig::load(dir.path()).await.unwrap();
    assert_eq!(config.recovery.max_retries, 7);
    assert_eq!(config.tot.beam_width, 3);
}

#[tokio::test]
async fn invalid_values_are_rejected_on_load() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(
        dir.path().join("config.toml"),
        "[tot]\nscore_threshold = 99.0\n",
    )
    .await
    .unwrap();

    assert!(WayfarerConfig::load(dir.path()).await.is_err());
}
