use std::io::Write;

use vitalgraph_core::config::EditorConfig;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[history]
depth = 50

[viewport]
zoom_min = 0.5
zoom_max = 3.0

[run]
timeout_secs = 120

[backend]
base_url = "https://reports.internal:9443"
token = "vg_test_token"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = EditorConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.history.depth, 50);
    assert_eq!(config.viewport.zoom_min, 0.5);
    assert_eq!(config.viewport.zoom_max, 3.0);
    assert_eq!(config.run.timeout_secs, 120);
    assert_eq!(config.backend.base_url, "https://reports.internal:9443");
    assert_eq!(config.backend.token, Some("vg_test_token".to_string()));
}

#[test]
fn test_partial_config_uses_defaults() {
    let toml_content = r#"
[backend]
base_url = "http://localhost:3001"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = EditorConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.backend.base_url, "http://localhost:3001");
    assert_eq!(config.backend.token, None);
    assert_eq!(config.history.depth, 100);
    assert_eq!(config.run.timeout_secs, 300);
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("VITALGRAPH_TEST_TOKEN", "expanded-token-value");

    let toml_content = r#"
[backend]
base_url = "http://localhost:3001"
token = "${VITALGRAPH_TEST_TOKEN}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = EditorConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.backend.token, Some("expanded-token-value".to_string()));
}

#[test]
fn test_missing_config_file() {
    let err = EditorConfig::load(std::path::Path::new("/nonexistent/vitalgraph.toml"));
    assert!(err.is_err());
}
