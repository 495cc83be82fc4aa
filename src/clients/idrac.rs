//! Dell iDRAC client (iDRAC7/8 generation). The session API is XML, the
//! 2012-era sysmgmt endpoints are JSON behind the `X_SYSMGMT_OPTIMIZE`
//! header, and the hardware inventory is XML again.

use super::{build_client, Bmc, PayloadDumper};
use crate::error::{Error, Result};
use crate::model::{
    normalize_mac, normalize_serial, Blade, BladeSnapshot, Discrete, DiscreteSnapshot, Nic,
    ServerSnapshot, Vendor,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Default, Deserialize)]
struct IdracAuth {
    #[serde(rename = "authResult", default)]
    auth_result: i32,
    #[serde(rename = "forwardUrl", default)]
    forward_url: String,
}

/// `data?get=...` answers with one element per requested attribute.
#[derive(Debug, Default, Deserialize)]
struct IdracRoot {
    #[serde(rename = "svcTag", default)]
    svc_tag: String,
    #[serde(rename = "sysDesc", default)]
    sys_desc: String,
    #[serde(rename = "biosVer", default)]
    bios_ver: String,
    #[serde(rename = "fwVersion", default)]
    fw_version: String,
    #[serde(rename = "powermonitordata", default)]
    powermonitordata: Option<IdracPowerMonitor>,
}

#[derive(Debug, Default, Deserialize)]
struct IdracPowerMonitor {
    #[serde(rename = "presentReading", default)]
    present_reading: Option<IdracPresentReading>,
}

#[derive(Debug, Default, Deserialize)]
struct IdracPresentReading {
    #[serde(rename = "reading", default)]
    reading: Option<IdracReading>,
}

#[derive(Debug, Default, Deserialize)]
struct IdracReading {
    #[serde(rename = "reading", default)]
    reading: String,
}

#[derive(Debug, Default, Deserialize)]
struct DellMemoryEndpoint {
    #[serde(rename = "Memory", default)]
    memory: Option<DellMemory>,
}

#[derive(Debug, Default, Deserialize)]
struct DellMemory {
    #[serde(default)]
    capacity: i32,
}

#[derive(Debug, Default, Deserialize)]
struct DellProcessorEndpoint {
    #[serde(rename = "Processor", default)]
    processors: std::collections::HashMap<String, DellProcessor>,
}

#[derive(Debug, Default, Deserialize)]
struct DellProcessor {
    #[serde(default)]
    brand: String,
    #[serde(default)]
    core_count: i32,
    #[serde(rename = "hyperThreading", default)]
    hyper_threading: Vec<DellHyperThreading>,
}

#[derive(Debug, Default, Deserialize)]
struct DellHyperThreading {
    #[serde(default)]
    enabled: i32,
}

#[derive(Debug, Default, Deserialize)]
struct IdracTemp {
    #[serde(rename = "Temperatures", default)]
    temperatures: Option<IdracTemperatures>,
}

#[derive(Debug, Default, Deserialize)]
struct IdracTemperatures {
    #[serde(rename = "iDRAC.Embedded.1#SystemBoardInletTemp", default)]
    inlet: Option<IdracInletTemp>,
}

#[derive(Debug, Default, Deserialize)]
struct IdracInletTemp {
    #[serde(default)]
    reading: i32,
}

#[derive(Debug, Default, Deserialize)]
struct IdracLicenseEndpoint {
    #[serde(rename = "License", default)]
    license: Option<IdracLicense>,
}

#[derive(Debug, Default, Deserialize)]
struct IdracLicense {
    #[serde(rename = "VCONSOLE", default)]
    vconsole: i32,
}

#[derive(Debug, Default, Deserialize)]
struct IdracInventory {
    #[serde(rename = "Component", default)]
    components: Vec<IdracComponent>,
}

#[derive(Debug, Default, Deserialize)]
struct IdracComponent {
    #[serde(rename = "@Classname", default)]
    classname: String,
    #[serde(rename = "PROPERTY", default)]
    properties: Vec<IdracProperty>,
}

#[derive(Debug, Default, Deserialize)]
struct IdracProperty {
    #[serde(rename = "@NAME", default)]
    name: String,
    #[serde(rename = "VALUE", default)]
    value: String,
}

pub struct IdracClient {
    host: String,
    username: String,
    password: String,
    client: reqwest::Client,
    st2: String,
    root: Option<IdracRoot>,
    dumper: PayloadDumper,
}

impl IdracClient {
    pub fn new(host: &str, username: &str, password: &str, dumper: PayloadDumper) -> Result<Self> {
        Ok(Self {
            host: host.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            client: build_client()?,
            st2: String::new(),
            root: None,
            dumper,
        })
    }

    fn decode_xml<T: DeserializeOwned>(&self, kind: &'static str, payload: &str) -> Result<T> {
        quick_xml::de::from_str(payload).map_err(|err| {
            self.dumper.dump(&self.host, payload.as_bytes());
            Error::decode(kind, err)
        })
    }

    fn decode_json<T: DeserializeOwned>(&self, kind: &'static str, payload: &[u8]) -> Result<T> {
        serde_json::from_slice(payload).map_err(|err| {
            self.dumper.dump(&self.host, payload);
            Error::decode(kind, err)
        })
    }

    async fn get(&self, endpoint: &str) -> Result<Vec<u8>> {
        debug!(step = "iDRAC connection", ip = %self.host, endpoint, "retrieving data from iDRAC");
        let response = self
            .client
            .get(format!("https://{}/{}", self.host, endpoint))
            .header("ST2", &self.st2)
            .header("X_SYSMGMT_OPTIMIZE", "true")
            .send()
            .await?;
        match response.status().as_u16() {
            401 => return Err(Error::LoginFailed),
            404 => return Err(Error::PageNotFound),
            _ => {}
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// The basic identity attributes, fetched once per session.
    async fn root(&mut self) -> Result<&IdracRoot> {
        if self.root.is_none() {
            let payload = self
                .get("data?get=svcTag,sysDesc,biosVer,fwVersion,powermonitordata")
                .await?;
            let text = String::from_utf8_lossy(&payload).into_owned();
            let root: IdracRoot = self.decode_xml("iDRAC root", &text)?;
            self.root = Some(root);
        }
        Ok(self.root.as_ref().expect("root just cached"))
    }

    pub(crate) async fn memory_gb(&self) -> Result<i32> {
        let payload = self.get("sysmgmt/2012/server/memory").await?;
        let memory: DellMemoryEndpoint = self.decode_json("iDRAC memory", &payload)?;
        Ok(memory
            .memory
            .map(|memory| memory.capacity / 1024)
            .unwrap_or_default())
    }

    pub(crate) async fn cpu(&self) -> Result<(String, i32, i32, i32)> {
        let payload = self.get("sysmgmt/2012/server/processor").await?;
        let endpoint: DellProcessorEndpoint = self.decode_json("iDRAC processor", &payload)?;

        let count = endpoint.processors.len() as i32;
        match endpoint.processors.values().next() {
            Some(proc) => {
                let threads = if proc.hyper_threading.iter().any(|ht| ht.enabled == 1) {
                    proc.core_count * 2
                } else {
                    proc.core_count
                };
                Ok((proc.brand.trim().to_string(), count, proc.core_count, threads))
            }
            None => Ok((String::new(), 0, 0, 0)),
        }
    }

    async fn temp_c(&self) -> Result<i32> {
        let payload = self.get("sysmgmt/2012/server/temperature").await?;
        let temp: IdracTemp = self.decode_json("iDRAC temperature", &payload)?;
        Ok(temp
            .temperatures
            .and_then(|temps| temps.inlet)
            .map(|inlet| inlet.reading)
            .unwrap_or_default())
    }

    pub(crate) async fn license(&self) -> Result<(String, String)> {
        let payload = self.get("sysmgmt/2012/server/license").await?;
        let license: IdracLicenseEndpoint = self.decode_json("iDRAC license", &payload)?;
        match license.license {
            Some(license) if license.vconsole == 1 => {
                Ok(("Enterprise".to_string(), "Licensed".to_string()))
            }
            Some(_) => Ok(("Express".to_string(), "Licensed".to_string())),
            None => Ok((String::new(), String::new())),
        }
    }

    /// Permanent MACs out of the hardware inventory.
    pub(crate) async fn nics(&self) -> Result<Vec<Nic>> {
        let payload = self.get("sysmgmt/2012/server/inventory/hardware").await?;
        let text = String::from_utf8_lossy(&payload).into_owned();
        let inventory: IdracInventory = self.decode_xml("iDRAC inventory", &text)?;

        let mut nics = Vec::new();
        for component in &inventory.components {
            if component.classname != "DCIM_NICView" {
                continue;
            }
            let mac = component
                .properties
                .iter()
                .find(|p| p.name == "PermanentMACAddress")
                .map(|p| p.value.as_str())
                .unwrap_or_default();
            if mac.is_empty() {
                continue;
            }
            let name = component
                .properties
                .iter()
                .find(|p| p.name == "ProductName")
                .map(|p| p.value.clone())
                .unwrap_or_default();
            nics.push(Nic {
                mac_address: normalize_mac(mac),
                name,
                ..Nic::default()
            });
        }
        Ok(nics)
    }

    fn power_kw_from_root(root: &IdracRoot) -> f64 {
        root.powermonitordata
            .as_ref()
            .and_then(|monitor| monitor.present_reading.as_ref())
            .and_then(|present| present.reading.as_ref())
            .and_then(|reading| reading.reading.trim().parse::<f64>().ok())
            .map(|watts| watts / 1000.0)
            .unwrap_or_default()
    }
}

#[async_trait]
impl Bmc for IdracClient {
    async fn login(&mut self) -> Result<()> {
        debug!(step = "iDRAC connection", ip = %self.host, "connecting to iDRAC");
        let response = self
            .client
            .post(format!("https://{}/data/login", self.host))
            .form(&[
                ("user", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await?;
        if response.status().as_u16() == 404 {
            return Err(Error::PageNotFound);
        }
        let payload = response.text().await?;
        let auth: IdracAuth = self.decode_xml("iDRAC auth", &payload)?;
        if auth.auth_result != 0 {
            return Err(Error::LoginFailed);
        }

        // The ST2 token from the forward URL authorizes the data endpoints.
        self.st2 = auth
            .forward_url
            .split("ST2=")
            .nth(1)
            .unwrap_or_default()
            .to_string();
        Ok(())
    }

    async fn logout(&mut self) {
        debug!(step = "iDRAC connection", ip = %self.host, "logout from iDRAC");
        if let Err(err) = self
            .client
            .get(format!("https://{}/data/logout", self.host))
            .send()
            .await
        {
            warn!(ip = %self.host, error = %err, "iDRAC logout failed");
        }
    }

    fn update_credentials(&mut self, username: &str, password: &str) {
        self.username = username.to_string();
        self.password = password.to_string();
    }

    fn vendor(&self) -> Vendor {
        Vendor::Dell
    }

    /// Blade-class PowerEdge models carry an M (modular) prefix.
    async fn is_blade(&mut self) -> Result<bool> {
        let root = self.root().await?;
        Ok(root.sys_desc.contains("PowerEdge M"))
    }

    async fn serial(&mut self) -> Result<String> {
        let root = self.root().await?;
        normalize_serial(&root.svc_tag)
    }

    async fn bmc_type(&mut self) -> Result<String> {
        Ok("iDRAC".to_string())
    }

    async fn server_snapshot(&mut self) -> Result<ServerSnapshot> {
        let host = self.host.clone();
        let root = self.root().await?;
        let serial = normalize_serial(&root.svc_tag)?;
        let model = root.sys_desc.clone();
        let bios_version = root.bios_ver.clone();
        let bmc_version = root.fw_version.clone();
        let power_kw = Self::power_kw_from_root(root);
        let is_blade = root.sys_desc.contains("PowerEdge M");

        let memory_gb = self.memory_gb().await.unwrap_or_else(|err| {
            warn!(ip = %host, error = %err, "reading memory data");
            0
        });
        let (processor, processor_count, core_count, thread_count) =
            self.cpu().await.unwrap_or_else(|err| {
                warn!(ip = %host, error = %err, "reading cpu data");
                Default::default()
            });
        let temp_c = self.temp_c().await.unwrap_or_else(|err| {
            warn!(ip = %host, error = %err, "reading thermal data");
            0
        });
        let (license_type, license_status) = self.license().await.unwrap_or_else(|err| {
            warn!(ip = %host, error = %err, "reading license data");
            Default::default()
        });
        let nics = self.nics().await.unwrap_or_else(|err| {
            warn!(ip = %host, error = %err, "reading nic inventory");
            Vec::new()
        });

        if is_blade {
            let blade = Blade {
                serial,
                model,
                vendor: Vendor::Dell.as_str().to_string(),
                bios_version,
                bmc_type: "iDRAC".to_string(),
                bmc_address: host.clone(),
                bmc_version,
                bmc_license_type: license_type,
                bmc_license_status: license_status,
                processor,
                processor_count,
                processor_core_count: core_count,
                processor_thread_count: thread_count,
                memory_gb,
                power_kw,
                temp_c,
                ..Blade::default()
            };
            Ok(ServerSnapshot::Blade(BladeSnapshot {
                blade,
                nics,
                disks: Vec::new(),
            }))
        } else {
            let discrete = Discrete {
                serial,
                model,
                vendor: Vendor::Dell.as_str().to_string(),
                bios_version,
                bmc_type: "iDRAC".to_string(),
                bmc_address: host.clone(),
                bmc_version,
                bmc_license_type: license_type,
                bmc_license_status: license_status,
                processor,
                processor_count,
                processor_core_count: core_count,
                processor_thread_count: thread_count,
                memory_gb,
                power_kw,
                temp_c,
                ..Discrete::default()
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failure_is_detected_from_the_result_code() {
        let payload = r#"<root>
            <status>ok</status>
            <authResult>1</authResult>
            <forwardUrl>login.html</forwardUrl>
        </root>"#;
        let auth: IdracAuth = quick_xml::de::from_str(payload).unwrap();
        assert_eq!(auth.auth_result, 1);
    }

    #[test]
    fn st2_token_is_read_from_the_forward_url() {
        let payload = r#"<root>
            <authResult>0</authResult>
            <forwardUrl>index.html?ST1=abc123,ST2=def456</forwardUrl>
        </root>"#;
        let auth: IdracAuth = quick_xml::de::from_str(payload).unwrap();
        assert_eq!(auth.forward_url.split("ST2=").nth(1), Some("def456"));
    }

    #[test]
    fn root_attributes_decode() {
        let payload = r#"<root>
            <svcTag>ABC1234</svcTag>
            <sysDesc>PowerEdge M630</sysDesc>
            <biosVer>2.4.2</biosVer>
            <fwVersion>2.41.40.40</fwVersion>
            <powermonitordata>
                <presentReading>
                    <reading>
                        <probeName>System Board Pwr Consumption</probeName>
                        <reading>112</reading>
                    </reading>
                </presentReading>
            </powermonitordata>
        </root>"#;
        let root: IdracRoot = quick_xml::de::from_str(payload).unwrap();
        assert_eq!(root.svc_tag, "ABC1234");
        assert!(root.sys_desc.contains("PowerEdge M"));
        assert_eq!(IdracClient::power_kw_from_root(&root), 0.112);
    }

    #[test]
    fn nic_inventory_extracts_permanent_macs() {
        let payload = r#"<Inventory version="1.0">
            <Component Classname="DCIM_NICView" Key="NIC.Integrated.1-1-1">
                <PROPERTY NAME="PermanentMACAddress" TYPE="string">
                    <VALUE>AA:BB:CC:DD:EE:10</VALUE>
                </PROPERTY>
                <PROPERTY NAME="ProductName" TYPE="string">
                    <VALUE>Broadcom Gigabit Ethernet</VALUE>
                </PROPERTY>
            </Component>
            <Component Classname="DCIM_SystemView" Key="System.Embedded.1">
                <PROPERTY NAME="Model" TYPE="string"><VALUE>PowerEdge M630</VALUE></PROPERTY>
            </Component>
        </Inventory>"#;
        let inventory: IdracInventory = quick_xml::de::from_str(payload).unwrap();
        assert_eq!(inventory.components.len(), 2);
        assert_eq!(inventory.components[0].classname, "DCIM_NICView");
        assert_eq!(
            inventory.components[0].properties[0].value,
            "AA:BB:CC:DD:EE:10"
        );
    }

    #[test]
    fn processor_endpoint_decodes_the_keyed_map() {
        let payload = r#"{
            "Processor": {
                "CPU.Socket.1": {
                    "brand": " Intel(R) Xeon(R) CPU E5-2680 v4 ",
                    "core_count": 14,
                    "current_speed": 2400,
                    "device_description": "CPU 1",
                    "hyperThreading": [ { "capable": 1, "enabled": 1 } ]
                },
                "CPU.Socket.2": {
                    "brand": "Intel(R) Xeon(R) CPU E5-2680 v4",
                    "core_count": 14,
                    "current_speed": 2400,
                    "device_description": "CPU 2",
                    "hyperThreading": [ { "capable": 1, "enabled": 1 } ]
                }
            }
        }"#;
        let endpoint: DellProcessorEndpoint = serde_json::from_str(payload).unwrap();
        assert_eq!(endpoint.processors.len(), 2);
        let proc = &endpoint.processors["CPU.Socket.1"];
        assert_eq!(proc.core_count, 14);
        assert_eq!(proc.hyper_threading[0].enabled, 1);
    }
}
