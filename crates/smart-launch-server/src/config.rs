use serde::{Deserialize, Serialize};
use smart_launch_auth::config::AuthConfig;
use smart_launch_auth::http::TrustedHeaders;
use smart_launch_auth::types::{Client, GrantType, hash_client_secret};
use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    /// Authorization server configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Headers carrying the authenticated user from the upstream proxy
    #[serde(default)]
    pub identity: TrustedHeaders,
    /// Registered client applications
    #[serde(default)]
    pub clients: Vec<ClientConfig>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.request_timeout_ms == 0 {
            return Err("server.request_timeout_ms must be > 0".into());
        }
        if let Some(base_url) = &self.server.base_url {
            url::Url::parse(base_url).map_err(|e| format!("server.base_url is invalid: {e}"))?;
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Store validation
        if self.store.cleanup_interval.is_zero() {
            return Err("store.cleanup_interval must be > 0".into());
        }
        // Auth validation
        self.auth.validate().map_err(|e| format!("auth: {e}"))?;
        // Client validations
        let mut seen = std::collections::HashSet::new();
        for client in &self.clients {
            if !seen.insert(client.client_id.as_str()) {
                return Err(format!("duplicate client_id '{}'", client.client_id));
            }
            if client.client_secret.is_some() && client.client_secret_hash.is_some() {
                return Err(format!(
                    "client '{}': set client_secret or client_secret_hash, not both",
                    client.client_id
                ));
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.server.request_timeout_ms))
    }

    /// Public URL used in the discovery document.
    /// If not set, defaults to http://{host}:{port}
    pub fn base_url(&self) -> String {
        self.server
            .base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.server.host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL the server is reachable at from browsers and apps.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u32,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout_ms() -> u32 {
    15_000
}
fn default_body_limit() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: None,
            request_timeout_ms: default_request_timeout_ms(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// How often expired codes, launches and tokens are swept from memory.
    #[serde(default = "default_cleanup_interval", with = "humantime_serde")]
    pub cleanup_interval: Duration,
}
fn default_cleanup_interval() -> Duration {
    Duration::from_secs(60)
}
impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

/// A client registration as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub client_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Plaintext secret, hashed at startup. Prefer injecting it via environment.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Pre-computed Argon2 PHC hash.
    #[serde(default)]
    pub client_secret_hash: Option<String>,
    #[serde(default = "default_grant_types")]
    pub grant_types: Vec<GrantType>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_grant_types() -> Vec<GrantType> {
    vec![GrantType::AuthorizationCode, GrantType::RefreshToken]
}
fn default_true() -> bool {
    true
}

impl ClientConfig {
    /// Builds the registry entry, hashing a plaintext secret if one is set.
    ///
    /// A client with any secret is confidential.
    pub fn into_client(self) -> Result<Client, String> {
        let client_secret_hash = match (self.client_secret, self.client_secret_hash) {
            (Some(secret), _) => Some(
                hash_client_secret(&secret)
                    .map_err(|e| format!("client '{}': {e}", self.client_id))?,
            ),
            (None, hash) => hash,
        };

        Ok(Client {
            name: self.name.unwrap_or_else(|| self.client_id.clone()),
            confidential: client_secret_hash.is_some(),
            client_id: self.client_id,
            client_secret_hash,
            grant_types: self.grant_types,
            redirect_uris: self.redirect_uris,
            scopes: self.scopes,
            active: self.active,
        })
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file name.
    pub const DEFAULT_CONFIG_PATH: &str = "smart-launch.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., SMART_LAUNCH__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("SMART_LAUNCH")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        // Validate
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.base_url(), "http://0.0.0.0:8080");
        assert_eq!(cfg.addr().port(), 8080);
    }

    #[test]
    fn test_duplicate_clients_rejected() {
        let mut cfg = AppConfig::default();
        let client: ClientConfig = toml::from_str(r#"client_id = "app""#).unwrap();
        cfg.clients = vec![client.clone(), client];
        assert!(cfg.validate().unwrap_err().contains("duplicate client_id"));
    }

    #[test]
    fn test_client_with_secret_is_confidential() {
        let client: ClientConfig = toml::from_str(
            r#"
client_id = "backend"
client_secret = "s3cret"
redirect_uris = ["https://backend.example.com/cb"]
scopes = ["user/*.read"]
"#,
        )
        .unwrap();

        let client = client.into_client().unwrap();
        assert!(client.confidential);
        assert!(client.verify_secret("s3cret"));
        assert_eq!(client.name, "backend");
        assert_eq!(
            client.grant_types,
            vec![GrantType::AuthorizationCode, GrantType::RefreshToken]
        );
    }

    #[test]
    fn test_client_without_secret_is_public() {
        let client: ClientConfig = toml::from_str(
            r#"
client_id = "spa"
grant_types = ["authorization_code"]
redirect_uris = ["https://spa.example.com/cb"]
"#,
        )
        .unwrap();

        let client = client.into_client().unwrap();
        assert!(!client.confidential);
        assert!(client.client_secret_hash.is_none());
    }
}
