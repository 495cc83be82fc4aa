//! Vendor HTTP clients. One client per vendor family and form factor, all
//! speaking to self-signed HTTPS endpoints with a per-session cookie jar.
//!
//! Handles are single-session: constructed, logged in, used, logged out,
//! and never shared between workers.

mod c7000;
mod cmc;
mod idrac;
mod ilo;
mod redfish;

pub use c7000::HpC7000Client;
pub use cmc::DellCmcClient;
pub use idrac::IdracClient;
pub use ilo::IloClient;
pub use redfish::{RedfishClient, SupermicroClient};

use crate::error::{Error, Result};
use crate::model::{ServerSnapshot, Vendor};
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

/// Capability set of a server-class BMC (blade or discrete).
#[async_trait]
pub trait Bmc: Send {
    async fn login(&mut self) -> Result<()>;
    /// Best-effort; failures are logged, never propagated.
    async fn logout(&mut self);
    fn update_credentials(&mut self, username: &str, password: &str);
    fn vendor(&self) -> Vendor;
    async fn is_blade(&mut self) -> Result<bool>;
    async fn serial(&mut self) -> Result<String>;
    async fn bmc_type(&mut self) -> Result<String>;
    async fn server_snapshot(&mut self) -> Result<ServerSnapshot>;
}

/// Capability set of a chassis management controller.
#[async_trait]
pub trait BmcChassis: Send {
    async fn login(&mut self) -> Result<()>;
    async fn logout(&mut self);
    fn update_credentials(&mut self, username: &str, password: &str);
    fn vendor(&self) -> Vendor;
    /// Passive controllers serve stale data and must be skipped.
    async fn is_active(&mut self) -> Result<bool>;
    async fn chassis_snapshot(&mut self) -> Result<crate::model::ChassisSnapshot>;
}

/// Permissive HTTPS client: BMCs ship self-signed certificates, answer
/// slowly, and track sessions through cookies.
pub fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .cookie_store(true)
        .timeout(Duration::from_secs(20))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(Error::from)
}

/// Maps the status codes every BMC API misuses the same way.
pub(crate) fn check_status(status: reqwest::StatusCode) -> Result<()> {
    match status.as_u16() {
        401 => Err(Error::LoginFailed),
        404 => Err(Error::PageNotFound),
        500 => Err(Error::RedfishEndpoint500),
        _ => Ok(()),
    }
}

/// Writes raw undecodable payloads under `<dump_path>/<host>/<timestamp>`
/// so unknown or broken messages can be identified later.
#[derive(Debug, Clone, Default)]
pub struct PayloadDumper {
    enabled: bool,
    path: PathBuf,
}

impl PayloadDumper {
    pub fn new(enabled: bool, path: impl Into<PathBuf>) -> Self {
        Self {
            enabled,
            path: path.into(),
        }
    }

    pub fn dump(&self, name: &str, payload: &[u8]) {
        if !self.enabled {
            return;
        }
        info!(operation = "dump invalid payload", name, "dumping invalid payload");

        let dir = self.path.join(name);
        if let Err(err) = std::fs::create_dir_all(&dir) {
            error!(operation = "dump invalid payload", name, error = %err, "creating dump directory");
            return;
        }
        let stamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        if let Err(err) = std::fs::write(dir.join(stamp), payload) {
            error!(operation = "dump invalid payload", name, error = %err, "writing dump file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_dumper_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let dumper = PayloadDumper::new(false, dir.path());
        dumper.dump("10.0.0.1", b"broken");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn dumper_writes_per_host_timestamped_files() {
        let dir = tempfile::tempdir().unwrap();
        let dumper = PayloadDumper::new(true, dir.path());
        dumper.dump("10.0.0.1", b"broken payload");

        let host_dir = dir.path().join("10.0.0.1");
        let entries: Vec<_> = std::fs::read_dir(&host_dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].as_ref().unwrap().file_name();
        let name = name.to_string_lossy();
        assert_eq!(name.len(), 14, "expected yyyymmddhhmmss, got {name}");
        let content = std::fs::read(entries[0].as_ref().unwrap().path()).unwrap();
        assert_eq!(content, b"broken payload");
    }

    #[test]
    fn status_mapping_matches_the_taxonomy() {
        use reqwest::StatusCode;
        assert!(matches!(
            check_status(StatusCode::UNAUTHORIZED),
            Err(Error::LoginFailed)
        ));
        assert!(matches!(
            check_status(StatusCode::NOT_FOUND),
            Err(Error::PageNotFound)
        ));
        assert!(matches!(
            check_status(StatusCode::INTERNAL_SERVER_ERROR),
            Err(Error::RedfishEndpoint500)
        ));
        assert!(check_status(StatusCode::OK).is_ok());
    }
}
