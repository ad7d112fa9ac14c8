use loopbench_common::{Config, ConfigError};
use std::collections::HashMap;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_match_documented_values() {
    let config = Config::default();
    assert_eq!(config.server.listen_address(), "0.0.0.0:8080");
    assert_eq!(config.target.payload, "hello bench.\n");
    assert_eq!(config.target.payload.len(), 13);
    assert_eq!(config.client.pool_max_idle_per_host, 100);
    assert_eq!(config.defaults.iterations, 100_000);
    assert_eq!(config.defaults.parallel, 8);
    assert!(config.metrics.enabled);
    assert_eq!(config.metrics.port, 9090);
}

#[test]
fn partial_yaml_keeps_defaults_for_missing_fields() {
    let yaml = r#"
server:
  port: 9000
client:
  request_timeout_ms: 250
"#;
    let config = Config::from_yaml(yaml).expect("partial config parses");
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.server.listen_host, "0.0.0.0");
    assert_eq!(config.client.request_timeout().as_millis(), 250);
    assert_eq!(config.client.pool_max_idle_per_host, 100);
    assert_eq!(config.defaults.parallel, 8);
}

#[test]
fn malformed_yaml_is_rejected() {
    let err = Config::from_yaml("server: [not, a, map]").unwrap_err();
    assert!(matches!(err, ConfigError::Yaml(_)));
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let config = Config::load("does/not/exist/loopbench.yaml").expect("missing file is not an error");
    assert_eq!(config.server.port, 8080);
}

#[test]
fn port_env_overrides_config() {
    let mut config = Config::default();
    config.apply_env(env(&[("PORT", "3000")])).unwrap();
    assert_eq!(config.server.port, 3000);
    assert_eq!(config.server.listen_address(), "0.0.0.0:3000");
}

#[test]
fn empty_port_env_keeps_configured_port() {
    let mut config = Config::default();
    config.server.port = 7000;
    config.apply_env(env(&[("PORT", "")])).unwrap();
    assert_eq!(config.server.port, 7000);

    config.apply_env(env(&[])).unwrap();
    assert_eq!(config.server.port, 7000);
}

#[test]
fn invalid_port_env_is_an_error() {
    let mut config = Config::default();
    let err = config.apply_env(env(&[("PORT", "eighty")])).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidPort(ref v) if v == "eighty"));
}
