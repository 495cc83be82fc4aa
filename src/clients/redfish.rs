//! Redfish client. All three vendor families expose a Redfish endpoint
//! tree; the root document identifies the vendor and selects the endpoint
//! table. Units are normalized here: MiB to GiB, W to kW.

use super::{build_client, check_status, Bmc, PayloadDumper};
use crate::error::{Error, Result};
use crate::model::{
    normalize_mac, normalize_serial, Discrete, DiscreteSnapshot, Nic, ServerSnapshot, Vendor,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RfEndpoint {
    Entry,
    Power,
    Thermal,
    Cpu,
    CpuEntry,
    Bmc,
    BmcNetwork,
}

fn endpoint(vendor: Vendor, kind: RfEndpoint) -> &'static str {
    match (vendor, kind) {
        (Vendor::Dell, RfEndpoint::Entry) => "redfish/v1/Systems/System.Embedded.1/",
        (Vendor::Dell, RfEndpoint::Power) => "redfish/v1/Chassis/System.Embedded.1/Power",
        (Vendor::Dell, RfEndpoint::Thermal) => "redfish/v1/Chassis/System.Embedded.1/Thermal",
        (Vendor::Dell, RfEndpoint::Cpu) => {
            "redfish/v1/Systems/System.Embedded.1/Processors/CPU.Socket.1"
        }
        (Vendor::Dell, RfEndpoint::CpuEntry) => "redfish/v1/Systems/System.Embedded.1/Processors/",
        (Vendor::Dell, RfEndpoint::Bmc) => "redfish/v1/Managers/iDRAC.Embedded.1/",
        (Vendor::Dell, RfEndpoint::BmcNetwork) => {
            "redfish/v1/Managers/iDRAC.Embedded.1/EthernetInterfaces/iDRAC.Embedded.1%23NIC.1"
        }
        (_, RfEndpoint::Entry) => "redfish/v1/Systems/1/",
        (_, RfEndpoint::Power) => "redfish/v1/Chassis/1/Power/",
        (_, RfEndpoint::Thermal) => "redfish/v1/Chassis/1/Thermal/",
        (_, RfEndpoint::Cpu) => "redfish/v1/Systems/1/Processors/1/",
        (_, RfEndpoint::CpuEntry) => "redfish/v1/Systems/1/Processors/",
        (_, RfEndpoint::Bmc) => "redfish/v1/Managers/1/",
        (_, RfEndpoint::BmcNetwork) => "redfish/v1/Managers/1/EthernetInterfaces/1/",
    }
}

/// Sensor labels differ per vendor; anything else in the arrays is VRM and
/// zone noise.
fn power_label(vendor: Vendor) -> Option<&'static str> {
    match vendor {
        Vendor::Hp => None,
        _ => Some("System Power Control"),
    }
}

fn thermal_label(vendor: Vendor) -> &'static str {
    match vendor {
        Vendor::Hp => "01-Inlet Ambient",
        Vendor::Dell => "System Board Inlet Temp",
        _ => "System Temp",
    }
}

#[derive(Debug, Default, Deserialize)]
struct RedfishEntry {
    #[serde(rename = "BiosVersion", default)]
    bios_version: String,
    #[serde(rename = "HostName", default)]
    host_name: String,
    #[serde(rename = "MemorySummary", default)]
    memory_summary: Option<RedfishMemorySummary>,
    #[serde(rename = "Model", default)]
    model: String,
    #[serde(rename = "ProcessorSummary", default)]
    processor_summary: Option<RedfishProcessorSummary>,
    #[serde(rename = "SerialNumber", default)]
    serial_number: String,
    #[serde(rename = "Status", default)]
    status: Option<RedfishStatus>,
}

#[derive(Debug, Default, Deserialize)]
struct RedfishMemorySummary {
    #[serde(rename = "TotalSystemMemoryGiB", default)]
    total_system_memory_gib: f64,
}

#[derive(Debug, Default, Deserialize)]
struct RedfishProcessorSummary {
    #[serde(rename = "Count", default)]
    count: i32,
    #[serde(rename = "Model", default)]
    model: String,
}

#[derive(Debug, Default, Deserialize)]
struct RedfishStatus {
    #[serde(rename = "Health", default)]
    health: String,
}

#[derive(Debug, Default, Deserialize)]
struct RedfishCpu {
    #[serde(rename = "TotalCores", default)]
    total_cores: i32,
    #[serde(rename = "TotalThreads", default)]
    total_threads: i32,
}

#[derive(Debug, Default, Deserialize)]
struct RedfishCpuEntry {
    #[serde(rename = "Members@odata.count", default)]
    members_count: i32,
}

#[derive(Debug, Default, Deserialize)]
struct RedfishManager {
    #[serde(rename = "FirmwareVersion", default)]
    firmware_version: String,
}

#[derive(Debug, Default, Deserialize)]
struct RedfishPower {
    #[serde(rename = "PowerControl", default)]
    power_control: Vec<RedfishPowerControl>,
}

#[derive(Debug, Default, Deserialize)]
struct RedfishPowerControl {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "PowerConsumedWatts", default)]
    power_consumed_watts: f64,
}

#[derive(Debug, Default, Deserialize)]
struct RedfishThermal {
    #[serde(rename = "Temperatures", default)]
    temperatures: Vec<RedfishTemperature>,
}

#[derive(Debug, Default, Deserialize)]
struct RedfishTemperature {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "ReadingCelsius", default)]
    reading_celsius: i32,
}

#[derive(Debug, Default, Deserialize)]
struct RedfishEthernetInterface {
    #[serde(rename = "MACAddress", default)]
    mac_address: String,
    #[serde(rename = "SpeedMbps", default)]
    speed_mbps: i64,
}

pub struct RedfishClient {
    host: String,
    username: String,
    password: String,
    client: reqwest::Client,
    vendor: Vendor,
    dumper: PayloadDumper,
}

impl RedfishClient {
    /// Connects and identifies the vendor from the Redfish root. A 404 on
    /// the root means the BMC predates Redfish.
    pub async fn connect(
        host: &str,
        username: &str,
        password: &str,
        dumper: PayloadDumper,
    ) -> Result<Self> {
        let mut reader = Self {
            host: host.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            client: build_client()?,
            vendor: Vendor::Unknown,
            dumper,
        };
        reader.detect_vendor().await?;
        Ok(reader)
    }

    async fn detect_vendor(&mut self) -> Result<()> {
        let payload = match self.get("redfish/v1/").await {
            Ok(payload) => payload,
            Err(Error::PageNotFound) => return Err(Error::RedfishNotSupported),
            Err(err) => return Err(err),
        };
        let root = String::from_utf8_lossy(&payload);

        if root.contains("iLO") {
            self.vendor = Vendor::Hp;
            return Ok(());
        }
        if root.contains("iDRAC") {
            self.vendor = Vendor::Dell;
            return Ok(());
        }

        // Supermicro keeps its marker out of the root document.
        let payload = self
            .get(endpoint(Vendor::Supermicro, RfEndpoint::Entry))
            .await?;
        if String::from_utf8_lossy(&payload).contains("Supermicro") {
            self.vendor = Vendor::Supermicro;
            return Ok(());
        }

        Err(Error::VendorUnknown)
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    pub fn set_credentials(&mut self, username: &str, password: &str) {
        self.username = username.to_string();
        self.password = password.to_string();
    }

    async fn get(&self, endpoint: &str) -> Result<Vec<u8>> {
        debug!(step = "redfish connection", ip = %self.host, endpoint, "retrieving data via redfish");
        let response = self
            .client
            .get(format!("https://{}/{}", self.host, endpoint))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        check_status(response.status())?;
        Ok(response.bytes().await?.to_vec())
    }

    fn decode<T: DeserializeOwned>(&self, kind: &'static str, payload: &[u8]) -> Result<T> {
        serde_json::from_slice(payload).map_err(|err| {
            self.dumper.dump(&self.host, payload);
            Error::decode(kind, err)
        })
    }

    async fn entry(&self) -> Result<RedfishEntry> {
        let payload = self.get(endpoint(self.vendor, RfEndpoint::Entry)).await?;
        self.decode("redfish entry", &payload)
    }

    pub async fn serial(&self) -> Result<String> {
        normalize_serial(&self.entry().await?.serial_number)
    }

    pub async fn model(&self) -> Result<String> {
        Ok(self.entry().await?.model)
    }

    pub async fn name(&self) -> Result<String> {
        Ok(self.entry().await?.host_name)
    }

    pub async fn status(&self) -> Result<String> {
        Ok(self
            .entry()
            .await?
            .status
            .map(|status| status.health)
            .unwrap_or_default())
    }

    pub async fn bios_version(&self) -> Result<String> {
        Ok(self.entry().await?.bios_version)
    }

    /// Memory is already reported in GiB by Redfish.
    pub async fn memory_gb(&self) -> Result<i32> {
        Ok(self
            .entry()
            .await?
            .memory_summary
            .map(|memory| memory.total_system_memory_gib as i32)
            .unwrap_or_default())
    }

    pub async fn cpu(&self) -> Result<(String, i32, i32, i32)> {
        let entry = self.entry().await?;
        let summary = entry.processor_summary.unwrap_or_default();

        let payload = self.get(endpoint(self.vendor, RfEndpoint::Cpu)).await?;
        let cpu: RedfishCpu = self.decode("redfish cpu", &payload)?;

        // Supermicro reports threads as the processor count, so the real
        // socket count comes from the processors collection.
        let count = if self.vendor == Vendor::Supermicro {
            let payload = self.get(endpoint(self.vendor, RfEndpoint::CpuEntry)).await?;
            let cpus: RedfishCpuEntry = self.decode("redfish cpu entry", &payload)?;
            cpus.members_count
        } else {
            summary.count
        };

        Ok((summary.model, count, cpu.total_cores, cpu.total_threads))
    }

    pub async fn bmc_type(&self) -> Result<String> {
        match self.vendor {
            Vendor::Dell => Ok("iDRAC".to_string()),
            Vendor::Hp => {
                // Only iLO4 and iLO5 speak Redfish; the firmware string
                // disambiguates.
                let version = self.bmc_version().await?;
                if version.contains("iLO 5") {
                    Ok("iLO5".to_string())
                } else {
                    Ok("iLO4".to_string())
                }
            }
            Vendor::Supermicro => Ok("Supermicro".to_string()),
            Vendor::Unknown => Ok(String::new()),
        }
    }

    pub async fn bmc_version(&self) -> Result<String> {
        let payload = self.get(endpoint(self.vendor, RfEndpoint::Bmc)).await?;
        let manager: RedfishManager = self.decode("redfish manager", &payload)?;
        Ok(manager.firmware_version)
    }

    /// Power in kW, selected by the vendor's control label.
    pub async fn power_kw(&self) -> Result<f64> {
        let payload = self.get(endpoint(self.vendor, RfEndpoint::Power)).await?;
        let power: RedfishPower = self.decode("redfish power", &payload)?;

        let mut kw = 0.0;
        for control in &power.power_control {
            match power_label(self.vendor) {
                None => kw = control.power_consumed_watts / 1000.0,
                Some(label) if control.name == label => {
                    kw = control.power_consumed_watts / 1000.0
                }
                Some(_) => {}
            }
        }
        Ok(kw)
    }

    pub async fn temp_c(&self) -> Result<i32> {
        let payload = self.get(endpoint(self.vendor, RfEndpoint::Thermal)).await?;
        let thermal: RedfishThermal = self.decode("redfish thermal", &payload)?;
        Ok(thermal
            .temperatures
            .iter()
            .find(|entry| entry.name == thermal_label(self.vendor))
            .map(|entry| entry.reading_celsius)
            .unwrap_or_default())
    }

    /// The BMC's own network interface.
    pub async fn bmc_nic(&self) -> Result<Option<Nic>> {
        let payload = self
            .get(endpoint(self.vendor, RfEndpoint::BmcNetwork))
            .await?;
        let interface: RedfishEthernetInterface = self.decode("redfish bmc network", &payload)?;
        if interface.mac_address.is_empty() {
            return Ok(None);
        }
        Ok(Some(Nic {
            mac_address: normalize_mac(&interface.mac_address),
            name: "bmc".to_string(),
            speed: if interface.speed_mbps > 0 {
                format!("{}Mbps", interface.speed_mbps)
            } else {
                String::new()
            },
            ..Nic::default()
        }))
    }
}

/// Supermicro discrete server: the web session handles login/logout, the
/// inventory itself comes over Redfish.
pub struct SupermicroClient {
    host: String,
    username: String,
    password: String,
    client: reqwest::Client,
    redfish: Option<RedfishClient>,
    dumper: PayloadDumper,
}

impl SupermicroClient {
    pub fn new(host: &str, username: &str, password: &str, dumper: PayloadDumper) -> Result<Self> {
        Ok(Self {
            host: host.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            client: build_client()?,
            redfish: None,
            dumper,
        })
    }

    async fn redfish(&mut self) -> Result<&RedfishClient> {
        if self.redfish.is_none() {
            let reader = RedfishClient::connect(
                &self.host,
                &self.username,
                &self.password,
                self.dumper.clone(),
            )
            .await?;
            self.redfish = Some(reader);
        }
        Ok(self.redfish.as_ref().expect("redfish reader just connected"))
    }
}

#[async_trait]
impl Bmc for SupermicroClient {
    async fn login(&mut self) -> Result<()> {
        debug!(step = "bmc connection", vendor = "Supermicro", ip = %self.host, "connecting to bmc");
        let response = self
            .client
            .post(format!("https://{}/cgi/login.cgi", self.host))
            .form(&[("name", self.username.as_str()), ("pwd", self.password.as_str())])
            .send()
            .await?;
        if response.status().as_u16() == 404 {
            return Err(Error::PageNotFound);
        }
        let payload = response.text().await?;
        if !payload.contains("../cgi/url_redirect.cgi?url_name=mainmenu") {
            return Err(Error::LoginFailed);
        }
        Ok(())
    }

    async fn logout(&mut self) {
        debug!(step = "bmc connection", vendor = "Supermicro", ip = %self.host, "logout from bmc");
        if let Err(err) = self
            .client
            .post(format!("https://{}/cgi/logout.cgi", self.host))
            .send()
            .await
        {
            warn!(ip = %self.host, error = %err, "supermicro logout failed");
        }
    }

    fn update_credentials(&mut self, username: &str, password: &str) {
        self.username = username.to_string();
        self.password = password.to_string();
        if let Some(redfish) = &mut self.redfish {
            redfish.set_credentials(username, password);
        }
    }

    fn vendor(&self) -> Vendor {
        Vendor::Supermicro
    }

    async fn is_blade(&mut self) -> Result<bool> {
        Ok(false)
    }

    async fn serial(&mut self) -> Result<String> {
        self.redfish().await?.serial().await
    }

    async fn bmc_type(&mut self) -> Result<String> {
        self.redfish().await?.bmc_type().await
    }

    async fn server_snapshot(&mut self) -> Result<ServerSnapshot> {
        let host = self.host.clone();
        let redfish = self.redfish().await?;

        let serial = redfish.serial().await?;
        let mut discrete = Discrete {
            serial,
            vendor: Vendor::Supermicro.as_str().to_string(),
            bmc_address: host.clone(),
            ..Discrete::default()
        };

        match redfish.entry().await {
            Ok(entry) => {
                discrete.name = entry.host_name;
                discrete.model = entry.model;
                discrete.bios_version = entry.bios_version;
                discrete.status = entry
                    .status
                    .map(|status| status.health)
                    .unwrap_or_default();
                discrete.memory_gb = entry
                    .memory_summary
                    .map(|memory| memory.total_system_memory_gib as i32)
                    .unwrap_or_default();
            }
            Err(err) => warn!(ip = %host, error = %err, "reading redfish entry"),
        }

        match redfish.cpu().await {
            Ok((processor, count, cores, threads)) => {
                discrete.processor = processor;
                discrete.processor_count = count;
                discrete.processor_core_count = cores;
                discrete.processor_thread_count = threads;
            }
            Err(err) => warn!(ip = %host, error = %err, "reading cpu data"),
        }

        discrete.bmc_type = redfish.bmc_type().await.unwrap_or_else(|err| {
            warn!(ip = %host, error = %err, "reading bmc type");
            String::new()
        });
        discrete.bmc_version = redfish.bmc_version().await.unwrap_or_else(|err| {
            warn!(ip = %host, error = %err, "reading bmc version");
            String::new()
        });
        discrete.power_kw = redfish.power_kw().await.unwrap_or_else(|err| {
            warn!(ip = %host, error = %err, "reading power data");
            0.0
        });
        discrete.temp_c = redfish.temp_c().await.unwrap_or_else(|err| {
            warn!(ip = %host, error = %err, "reading thermal data");
            0
        });

        let nics = match redfish.bmc_nic().await {
            Ok(Some(nic)) => vec![nic],
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(ip = %host, error = %err, "reading bmc network data");
                Vec::new()
            }
        };

        Ok(ServerSnapshot::Discrete(DiscreteSnapshot {
            discrete,
            nics,
            disks: Vec::new(),
            psus: Vec::new(),
            fans: Vec::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_endpoint_tables_diverge_only_for_dell() {
        assert_eq!(
            endpoint(Vendor::Dell, RfEndpoint::Entry),
            "redfish/v1/Systems/System.Embedded.1/"
        );
        assert_eq!(
            endpoint(Vendor::Hp, RfEndpoint::Entry),
            "redfish/v1/Systems/1/"
        );
        assert_eq!(
            endpoint(Vendor::Supermicro, RfEndpoint::Entry),
            "redfish/v1/Systems/1/"
        );
    }

    #[test]
    fn entry_decodes_and_normalizes_units() {
        let payload = r#"{
            "BiosVersion": "P89 v2.60",
            "HostName": "web-01",
            "Manufacturer": "HPE",
            "MemorySummary": { "TotalSystemMemoryGiB": 256.0 },
            "Model": "ProLiant DL380 Gen9",
            "ProcessorSummary": { "Count": 2, "Model": "Intel Xeon" },
            "SerialNumber": "MX1234ABCD",
            "Status": { "Health": "OK" }
        }"#;
        let entry: RedfishEntry = serde_json::from_str(payload).unwrap();
        assert_eq!(entry.memory_summary.unwrap().total_system_memory_gib as i32, 256);
        assert_eq!(entry.processor_summary.unwrap().count, 2);
        assert_eq!(entry.serial_number, "MX1234ABCD");
    }

    #[test]
    fn power_decodes_watts() {
        let payload = r#"{
            "PowerControl": [
                { "Name": "System Power Control", "PowerConsumedWatts": 340.0 }
            ]
        }"#;
        let power: RedfishPower = serde_json::from_str(payload).unwrap();
        assert_eq!(power.power_control[0].power_consumed_watts, 340.0);
    }
}
