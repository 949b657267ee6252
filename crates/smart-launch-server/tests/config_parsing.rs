use std::{env, fs, time::Duration};

use smart_launch_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    // Create a temporary TOML configuration file
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("smart-launch.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8081
base_url = "https://auth.example.com"

[logging]
level = "debug"

[store]
cleanup_interval = "30s"

[auth]
issuer = "https://auth.example.com"
audience = ["https://fhir.example.com/r4"]

[auth.oauth]
access_token_lifetime = "15m"

[auth.launch]
issuance_enabled = true

[auth.signing]
algorithm = "HS256"
secret = "an-hmac-secret-that-is-long-enough!!"

[[clients]]
client_id = "growth-chart"
redirect_uris = ["https://app.example.com/callback"]
scopes = ["launch", "patient/*.read"]
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.base_url(), "https://auth.example.com");
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.store.cleanup_interval, Duration::from_secs(30));
    assert_eq!(cfg.auth.oauth.access_token_lifetime, Duration::from_secs(900));
    assert_eq!(cfg.auth.oauth.authorization_code_lifetime, Duration::from_secs(300));
    assert!(cfg.auth.launch.issuance_enabled);
    assert_eq!(cfg.clients.len(), 1);
    assert_eq!(cfg.clients[0].client_id, "growth-chart");

    // 2) Env override should win over file
    unsafe {
        env::set_var("SMART_LAUNCH__SERVER__PORT", "9090");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.server.port, 9090);
    unsafe {
        env::remove_var("SMART_LAUNCH__SERVER__PORT");
    }

    // 3) Invalid values are rejected
    let invalid = toml_content.replace("level = \"debug\"", "level = \"loud\"");
    fs::write(&path, invalid).expect("write toml");
    let err = load_config(path.to_str()).unwrap_err();
    assert!(err.contains("logging.level"), "{err}");

    let short_secret = toml_content.replace(
        "an-hmac-secret-that-is-long-enough!!",
        "too-short",
    );
    fs::write(&path, short_secret).expect("write toml");
    let err = load_config(path.to_str()).unwrap_err();
    assert!(err.contains("auth:"), "{err}");
}
