use conduit_config::{LogFormat, LogLevel, LoggingConfig};
use conduit_logging::{build_env_filter, init_logging_from_config, init_simple_tracing};

#[test]
fn test_logging_config_integration() {
    let yaml_config = r#"
level: debug
format: json
directives:
  - conduit_execution=trace
include_location: true
"#;

    let config: LoggingConfig = serde_yaml::from_str(yaml_config).unwrap();

    assert_eq!(config.level, LogLevel::Debug);
    assert_eq!(config.format, LogFormat::Json);
    assert!(config.include_location);

    let filter = build_env_filter(&config);
    assert!(filter.to_string().contains("conduit_execution=trace"));

    // Initialization is idempotent
    assert!(init_logging_from_config(&config).is_ok());
    assert!(init_logging_from_config(&config).is_ok());
    assert!(init_simple_tracing("info").is_ok());

    tracing::info!(target: "conduit_logging_test", "logging initialised");
}
