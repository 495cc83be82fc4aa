//! Configuration file loading and the sample-config writer.
//!
//! The file is YAML, looked up at `--config`, `/etc/bmc-toolbox/dora.yaml`
//! and `$HOME/.bmc-toolbox/dora.yaml`, in that order.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

const SAMPLE_CONFIG: &str = r#"---
bmc_user: Priest
bmc_pass: Wololo
# Base URL of the asset database; change callbacks are POSTed
# to {url}/{kind}/{serial}.
url: http://localhost:8000
database_type: postgres
database_options: host=0.0.0.0 user=postgres port=5432 dbname=dora sslmode=disable password=mysecretpassword
http_server_port: 8000
debug: false
dump_invalid_payloads: false
dump_invalid_payload_path: /tmp/dora/dumps
collector:
  concurrency: 20
  default:
    hp:
      username: Administrator
      password: Wololo
    dell:
      username: root
      password: Wololo
    supermicro:
      username: ADMIN
      password: Wololo
  worker:
    server: nats://127.0.0.1:4222
    username: ""
    password: ""
    queue: dora
"#;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub bmc_user: String,
    pub bmc_pass: String,
    /// Asset database callback base URL.
    pub url: String,
    #[serde(default = "default_database_type")]
    pub database_type: String,
    pub database_options: String,
    #[serde(default = "default_http_server_port")]
    pub http_server_port: u16,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub dump_invalid_payloads: bool,
    #[serde(default = "default_dump_path")]
    pub dump_invalid_payload_path: String,
    #[serde(default)]
    pub collector: CollectorConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CollectorConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-vendor fallback credentials, keyed by lowercased vendor name.
    #[serde(default)]
    pub default: HashMap<String, VendorCredentials>,
    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VendorCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub queue: String,
}

fn default_database_type() -> String {
    "postgres".to_string()
}

const fn default_http_server_port() -> u16 {
    8000
}

fn default_dump_path() -> String {
    "/tmp/dora/dumps".to_string()
}

const fn default_concurrency() -> usize {
    20
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.as_ref().display()))?;
        let config: Config =
            serde_yaml::from_str(&content).context("failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Loads from the explicit path, or walks the default locations.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        for candidate in Self::default_paths() {
            if candidate.exists() {
                return Self::from_file(&candidate);
            }
        }

        anyhow::bail!(
            "no configuration found; run `dora config create` or pass --config"
        )
    }

    fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/bmc-toolbox/dora.yaml")];
        if let Ok(home) = std::env::var("HOME") {
            paths.push(PathBuf::from(home).join(".bmc-toolbox/dora.yaml"));
        }
        paths
    }

    fn validate(&self) -> Result<()> {
        if self.bmc_user.is_empty() {
            anyhow::bail!("bmc_user is required");
        }
        if self.bmc_pass.is_empty() {
            anyhow::bail!("bmc_pass is required");
        }
        if self.url.is_empty() {
            anyhow::bail!("url (asset database callback base) is required");
        }
        if self.database_type != "postgres" {
            anyhow::bail!("unsupported database_type {:?}", self.database_type);
        }
        if self.database_options.is_empty() {
            anyhow::bail!("database_options is required");
        }
        if self.collector.concurrency == 0 {
            anyhow::bail!("collector.concurrency must be at least 1");
        }
        Ok(())
    }

    /// Fallback credentials for a vendor, if configured.
    pub fn vendor_default(&self, vendor: &str) -> Option<&VendorCredentials> {
        self.collector.default.get(&vendor.to_lowercase())
    }

    /// Writes the commented sample config to `$HOME/.bmc-toolbox/dora.yaml`
    /// unless a file already exists there.
    pub fn write_sample() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        let dir = PathBuf::from(home).join(".bmc-toolbox");
        let file = dir.join("dora.yaml");
        if file.exists() {
            anyhow::bail!("{} already exists", file.display());
        }
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        fs::write(&file, SAMPLE_CONFIG)
            .with_context(|| format!("failed to write {}", file.display()))?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_config_parses_and_validates() {
        let config: Config = serde_yaml::from_str(SAMPLE_CONFIG).unwrap();
        config.validate().unwrap();
        assert_eq!(config.collector.concurrency, 20);
        assert_eq!(config.http_server_port, 8000);
        assert_eq!(config.collector.worker.queue, "dora");
        let dell = config.vendor_default("Dell").unwrap();
        assert_eq!(dell.username, "root");
    }

    #[test]
    fn missing_required_keys_fail_validation() {
        let config: std::result::Result<Config, _> =
            serde_yaml::from_str("bmc_user: a\nbmc_pass: b\nurl: c\n");
        // database_options has no default, deserialization itself fails
        assert!(config.is_err());
    }

    #[test]
    fn concurrency_zero_is_rejected() {
        let mut config: Config = serde_yaml::from_str(SAMPLE_CONFIG).unwrap();
        config.collector.concurrency = 0;
        assert!(config.validate().is_err());
    }
}
