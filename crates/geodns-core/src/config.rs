use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dns: DnsConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub geoip: GeoipConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    #[serde(default = "default_dns_listen")]
    pub listen: String,
    pub soa: SoaConfig,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            listen: default_dns_listen(),
            soa: SoaConfig::default(),
        }
    }
}

/// Global SOA template. Every zone's SOA is synthesized from this plus a
/// daily rotating serial — the database never stores SOA rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoaConfig {
    /// Authoritative nameservers for every zone, also used for NS records at
    /// the zone apex. Must contain at least one entry.
    pub ns: Vec<String>,
    pub mbox: String,
    #[serde(default = "default_refresh")]
    pub refresh: u32,
    #[serde(default = "default_retry")]
    pub retry: u32,
    #[serde(default = "default_expire")]
    pub expire: u32,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

impl Default for SoaConfig {
    fn default() -> Self {
        Self {
            ns: vec!["ns1.example.com.".to_string()],
            mbox: "hostmaster.example.com.".to_string(),
            refresh: default_refresh(),
            retry: default_retry(),
            expire: default_expire(),
            ttl: default_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rest_listen")]
    pub listen: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_rest_listen(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Maxmind GeoLite2/GeoIP2 City database location. Geo-anchored services are
/// unresolvable (see [`crate::error::Error::GeoipDisabled`]) when unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoipConfig {
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_dns_listen() -> String {
    "0.0.0.0:53".to_string()
}
fn default_rest_listen() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("/data/geodns.redb")
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_refresh() -> u32 {
    3600
}
fn default_retry() -> u32 {
    600
}
fn default_expire() -> u32 {
    604800
}
fn default_ttl() -> u32 {
    300
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::Error::Config(format!("failed to read config: {e}")))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::error::Error::Config(format!("failed to parse config: {e}")))?;
        if config.dns.soa.ns.is_empty() {
            return Err(crate::error::Error::Config(
                "dns.soa.ns must list at least one nameserver".to_string(),
            ));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let toml_str = r#"
[dns.soa]
ns = ["ns1.example.com.", "ns2.example.com."]
mbox = "hostmaster.example.com."

[database]
path = "/tmp/test.redb"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.dns.soa.ns.len(), 2);
        assert_eq!(config.dns.soa.refresh, 3600);
        assert_eq!(config.database.path, PathBuf::from("/tmp/test.redb"));
        assert!(config.geoip.db_path.is_none());
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[dns]
listen = "0.0.0.0:5353"

[dns.soa]
ns = ["ns1.example.com."]
mbox = "hostmaster.example.com."
refresh = 7200
retry = 900
expire = 1209600
ttl = 120

[api]
listen = "0.0.0.0:9090"
api_key = "secret"

[database]
path = "/data/geodns.redb"

[geoip]
db_path = "/data/GeoLite2-City.mmdb"

[logging]
level = "debug"
format = "text"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.dns.listen, "0.0.0.0:5353");
        assert_eq!(config.dns.soa.refresh, 7200);
        assert_eq!(config.api.api_key.as_deref(), Some("secret"));
        assert_eq!(
            config.geoip.db_path,
            Some(PathBuf::from("/data/GeoLite2-City.mmdb"))
        );
    }
}
