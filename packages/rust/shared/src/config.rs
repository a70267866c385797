//! Application configuration for meshctx.
//!
//! User config lives at `~/.meshctx/meshctx.toml`.
//! CLI flags override config file values, which override defaults.
//! The configuration is read once at startup and is read-only afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{MeshCtxError, Result};
use crate::types::{MetricDefinition, Workload};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "meshctx.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".meshctx";

/// Default database file name inside the config directory.
const DB_FILE_NAME: &str = "topology.db";

/// Written at the top of the starter config file.
const CONFIG_HEADER: &str = "\
# meshctx configuration
#
# policy = [\"...\"]                 forwarded verbatim into every context definition
# [topology].workloads              source workloads whose outgoing calls are collected
# [topology].time_window_minutes    default look-back when a request names no range
# [[metrics]]                       metric definitions, optional [metrics.health_config]
# [[prometheus_instances]]          first entry is used unless --prometheus selects one

";

// ---------------------------------------------------------------------------
// Config structs (matching meshctx.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Policy statements, forwarded verbatim into every context definition.
    #[serde(default)]
    pub policy: Vec<String>,

    /// Topology collection settings.
    #[serde(default)]
    pub topology: TopologyConfig,

    /// Metric definitions attached to every context definition.
    #[serde(default)]
    pub metrics: Vec<MetricDefinition>,

    /// Metrics backends. The first one is used unless another is selected by name.
    #[serde(default)]
    pub prometheus_instances: Vec<PrometheusInstance>,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Snapshot store settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[topology]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Source workloads whose outgoing traffic is collected.
    #[serde(default)]
    pub workloads: Vec<Workload>,

    /// Default look-back window when a request names no explicit range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window_minutes: Option<u32>,

    /// Sampling step for range queries.
    #[serde(default = "default_step")]
    pub step: String,

    /// Request-flow series carrying the workload labels.
    #[serde(default = "default_metric")]
    pub metric: String,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            workloads: Vec::new(),
            time_window_minutes: None,
            step: default_step(),
            metric: default_metric(),
        }
    }
}

fn default_step() -> String {
    "15s".into()
}
fn default_metric() -> String {
    "istio_requests_total".into()
}

/// `[[prometheus_instances]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusInstance {
    pub name: String,
    pub base_url: String,
    /// Extra headers sent with every query (tenant IDs, auth proxies).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Skip TLS certificate verification.
    #[serde(default)]
    pub disable_ssl: bool,
}

impl PrometheusInstance {
    /// Parse `base_url`, requiring an http(s) scheme.
    pub fn url(&self) -> Result<Url> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            MeshCtxError::config(format!(
                "prometheus instance '{}': invalid base_url '{}': {e}",
                self.name, self.base_url
            ))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(MeshCtxError::config(format!(
                "prometheus instance '{}': unsupported scheme '{other}'",
                self.name
            ))),
        }
    }
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8000
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file. Defaults to `~/.meshctx/topology.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the database path, expanding a leading `~/`.
    pub fn resolved_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => expand_home(path),
            None => Ok(config_dir()?.join(DB_FILE_NAME)),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation and lookup
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.topology.time_window_minutes == Some(0) {
            return Err(MeshCtxError::config(
                "topology.time_window_minutes must be positive",
            ));
        }
        for metric in &self.metrics {
            if let Some(health) = &metric.health_config {
                health.validate().map_err(|e| {
                    MeshCtxError::config(format!("metric '{}': {e}", metric.name))
                })?;
            }
        }
        for instance in &self.prometheus_instances {
            instance.url()?;
        }
        Ok(())
    }

    /// Pick a Prometheus instance by name, or the first one when `name` is `None`.
    pub fn prometheus_instance(&self, name: Option<&str>) -> Result<&PrometheusInstance> {
        match name {
            Some(name) => self
                .prometheus_instances
                .iter()
                .find(|i| i.name == name)
                .ok_or_else(|| {
                    MeshCtxError::config(format!("no Prometheus instance named '{name}'"))
                }),
            None => self
                .prometheus_instances
                .first()
                .ok_or_else(|| MeshCtxError::config("no Prometheus instances configured")),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.meshctx/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| MeshCtxError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.meshctx/meshctx.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load and validate the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| MeshCtxError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        MeshCtxError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;

    tracing::debug!(
        ?path,
        workloads = config.topology.workloads.len(),
        metrics = config.metrics.len(),
        "loaded config"
    );
    Ok(config)
}

/// Create the config directory and write a starter config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MeshCtxError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig {
        prometheus_instances: vec![PrometheusInstance {
            name: "default".into(),
            base_url: "http://localhost:9090".into(),
            headers: BTreeMap::new(),
            disable_ssl: false,
        }],
        ..AppConfig::default()
    };
    let body =
        toml::to_string_pretty(&config).map_err(|e| MeshCtxError::config(e.to_string()))?;
    let content = format!("{CONFIG_HEADER}{body}");

    std::fs::write(&path, content).map_err(|e| MeshCtxError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

fn expand_home(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| MeshCtxError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HealthDirection;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("istio_requests_total"));
        assert!(toml_str.contains("port = 8000"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.topology.step, "15s");
        assert_eq!(parsed.server.port, 8000);
        assert!(parsed.topology.time_window_minutes.is_none());
    }

    #[test]
    fn config_fixture_loads() {
        let config = load_config_from(Path::new("../../../fixtures/config/meshctx.toml"))
            .expect("load fixture config");

        assert_eq!(config.policy.len(), 2);
        assert_eq!(
            config.topology.workloads,
            vec![Workload::from("productpage-v1"), Workload::from("reviews-v2")]
        );
        assert_eq!(config.topology.time_window_minutes, Some(30));
        assert_eq!(config.metrics.len(), 2);

        let latency = &config.metrics[0];
        assert_eq!(latency.kind, "histogram");
        let health = latency.health_config.as_ref().expect("health config");
        assert_eq!(health.direction, HealthDirection::LowerIsBetter);
        assert_eq!(health.critical, Some(500.0));

        let prom = config.prometheus_instance(None).expect("first instance");
        assert_eq!(prom.name, "primary");
        assert_eq!(
            prom.headers.get("X-Scope-OrgID").map(String::as_str),
            Some("mesh")
        );
        assert!(config.prometheus_instance(Some("secondary")).is_ok());
        assert!(config.prometheus_instance(Some("missing")).is_err());
    }

    #[test]
    fn zero_window_is_rejected() {
        let config: AppConfig = toml::from_str(
            r#"
[topology]
workloads = ["a"]
time_window_minutes = 0
"#,
        )
        .expect("parse");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("time_window_minutes"));
    }

    #[test]
    fn bad_base_url_is_rejected() {
        let config: AppConfig = toml::from_str(
            r#"
[[prometheus_instances]]
name = "broken"
base_url = "ftp://prometheus:9090"
"#,
        )
        .expect("parse");
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_instances_reported() {
        let err = AppConfig::default().prometheus_instance(None).unwrap_err();
        assert!(err.to_string().contains("no Prometheus instances"));
    }

    #[test]
    fn storage_path_expands_home() {
        let storage = StorageConfig {
            path: Some(PathBuf::from("~/data/topology.db")),
        };
        let resolved = storage.resolved_path().expect("resolve");
        assert!(!resolved.starts_with("~"));
        assert!(resolved.ends_with("data/topology.db"));

        let absolute = StorageConfig {
            path: Some(PathBuf::from("/var/lib/meshctx/topology.db")),
        };
        assert_eq!(
            absolute.resolved_path().unwrap(),
            PathBuf::from("/var/lib/meshctx/topology.db")
        );
    }
}
