use std::io::Write;

use scheduler_core::config::{AppConfig, LockStoreBackend};
use scheduler_core::models::{RetryStrategy, TaskPriority};

const SAMPLE_CONFIG: &str = r#"
[scheduler]
max_concurrent_tasks = 4
poll_interval_ms = 100

[lock_store]
backend = "redis"
key_prefix = "scheduler:lock:"

[lock_store.redis]
host = "redis.internal"
port = 6380

[observability]
log_level = "debug"
log_format = "json"

[[tasks]]
task_id = "ingest"
func_reference = "shell"
priority = "HIGH"
cron = "*/5 * * * *"
parameters = { command = "echo", args = ["ingest"] }

[[tasks]]
task_id = "report"
task_name = "Nightly report"
func_reference = "http"
dependencies = ["ingest"]

[tasks.retry]
strategy = "FIXED"
max_attempts = 5
initial_delay = 10.0
"#;

#[test]
fn test_default_config_is_valid() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.scheduler.max_concurrent_tasks, 10);
    assert_eq!(config.lock_store.backend, LockStoreBackend::Memory);
    assert_eq!(config.lock_store.key_prefix, "lock:");
    assert!(config.tasks.is_empty());
}

#[test]
fn test_from_toml() {
    let config = AppConfig::from_toml(SAMPLE_CONFIG).unwrap();

    assert_eq!(config.scheduler.max_concurrent_tasks, 4);
    assert_eq!(config.scheduler.poll_interval_ms, 100);
    // 未设置的字段使用默认值
    assert_eq!(config.scheduler.cron_lookahead, 10);
    assert_eq!(config.lock_store.backend, LockStoreBackend::Redis);
    assert_eq!(
        config.lock_store.redis.build_connection_url(),
        "redis://redis.internal:6380/0"
    );
    assert_eq!(config.observability.log_format, "json");

    assert_eq!(config.tasks.len(), 2);
    let ingest = config.tasks[0].to_definition();
    assert_eq!(ingest.priority, TaskPriority::High);
    assert_eq!(ingest.task_name, "ingest");
    assert_eq!(ingest.parameters["command"], "echo");

    let report = config.tasks[1].to_definition();
    assert_eq!(report.task_name, "Nightly report");
    assert_eq!(report.retry_config.strategy, RetryStrategy::Fixed);
    assert_eq!(report.retry_config.max_attempts, 5);
    assert_eq!(report.dependency_ids().collect::<Vec<_>>(), vec!["ingest"]);
}

#[test]
fn test_toml_roundtrip_preserves_tasks() {
    let config = AppConfig::from_toml(SAMPLE_CONFIG).unwrap();
    let serialized = config.to_toml().unwrap();
    let reparsed = AppConfig::from_toml(&serialized).unwrap();
    assert_eq!(reparsed.tasks.len(), 2);
    assert_eq!(reparsed.tasks[0].cron.as_deref(), Some("*/5 * * * *"));
}

#[test]
fn test_validation_errors() {
    let zero_workers = "[scheduler]\nmax_concurrent_tasks = 0\n";
    assert!(AppConfig::from_toml(zero_workers).is_err());

    let bad_format = "[observability]\nlog_format = \"xml\"\n";
    assert!(AppConfig::from_toml(bad_format).is_err());

    let duplicate_tasks = r#"
[[tasks]]
task_id = "a"
func_reference = "noop"

[[tasks]]
task_id = "a"
func_reference = "noop"
"#;
    assert!(AppConfig::from_toml(duplicate_tasks).is_err());

    let self_dependency = r#"
[[tasks]]
task_id = "a"
func_reference = "noop"
dependencies = ["a"]
"#;
    assert!(AppConfig::from_toml(self_dependency).is_err());
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(SAMPLE_CONFIG.as_bytes()).unwrap();

    let path = file.path().to_str().unwrap().to_string();
    let config = AppConfig::load(Some(&path)).unwrap();
    assert_eq!(config.tasks.len(), 2);
    assert_eq!(config.lock_store.key_prefix, "scheduler:lock:");
}

#[test]
fn test_load_missing_file_fails() {
    assert!(AppConfig::load(Some("/definitely/not/here.toml")).is_err());
}
