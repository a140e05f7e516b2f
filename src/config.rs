use serde::Serialize;

/// Deployment environment. Controls log format and verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

/// Server configuration, loaded from environment variables.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub static_dir: String,
    pub env: Environment,
    pub sfu: SfuConfig,
}

/// SFU media-plane parameters, passed through to the voice backend.
#[derive(Debug, Clone, Serialize)]
pub struct SfuConfig {
    pub udp_port_min: u16,
    pub udp_port_max: u16,
    pub stun_server: String,
}

impl Default for SfuConfig {
    fn default() -> Self {
        Self {
            udp_port_min: 5000,
            udp_port_max: 5100,
            stun_server: "stun:stun.l.google.com:19302".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            static_dir: "./web/dist".to_string(),
            env: Environment::Development,
            sfu: SfuConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the environment, falling back to defaults.
    /// Malformed numeric values fall back rather than failing startup.
    pub fn load() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parsed("PORT", defaults.port),
            host: env_or("HOST", &defaults.host),
            static_dir: env_or("STATIC_DIR", &defaults.static_dir),
            env: match std::env::var("ENV").as_deref() {
                Ok("production") => Environment::Production,
                _ => Environment::Development,
            },
            sfu: SfuConfig {
                udp_port_min: env_parsed("SFU_UDP_PORT_MIN", defaults.sfu.udp_port_min),
                udp_port_max: env_parsed("SFU_UDP_PORT_MAX", defaults.sfu.udp_port_max),
                stun_server: env_or("SFU_STUN_SERVER", &defaults.sfu.stun_server),
            },
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_dev(&self) -> bool {
        self.env == Environment::Development
    }
}

fn env_or(key: &str, fallback: &str) -> String {
    match std::env::var(key) {
        Ok(val) if !val.is_empty() => val,
        _ => fallback.to_string(),
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(fallback)
}
