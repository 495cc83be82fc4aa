//! HP iLO client (iLO3/iLO4 generation, JSON endpoints plus the RIMP
//! bootstrap document).

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

/// `/xmldata?item=all` on a server iLO.
#[derive(Debug, Default, Deserialize)]
pub struct RimpBlade {
    #[serde(rename = "HSI", default)]
    pub hsi: Option<Hsi>,
    #[serde(rename = "MP", default)]
    pub mp: Option<Mp>,
    #[serde(rename = "BLADESYSTEM", default)]
    pub bladesystem: Option<BladeSystem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Hsi {
    #[serde(rename = "SBSN", default)]
    pub sbsn: String,
    #[serde(rename = "SPN", default)]
    pub spn: String,
    #[serde(rename = "NICS", default)]
    pub nics: Option<HpNics>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HpNics {
    #[serde(rename = "NIC", default)]
    pub nic: Vec<HpNic>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HpNic {
    #[serde(rename = "MACADDR", default)]
    pub macaddr: String,
    #[serde(rename = "DESCRIPTION", default)]
    pub description: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Mp {
    #[serde(rename = "PN", default)]
    pub pn: String,
    #[serde(rename = "FWRI", default)]
    pub fwri: String,
}

/// Present only when the server sits in a chassis bay.
#[derive(Debug, Default, Deserialize)]
pub struct BladeSystem {
    #[serde(rename = "BAY", default)]
    pub bay: i32,
}

#[derive(Debug, Default, Deserialize)]
struct HpOverview {
    #[serde(default)]
    server_name: String,
    #[serde(default)]
    system_rom: String,
    #[serde(default)]
    system_health: String,
}

#[derive(Debug, Default, Deserialize)]
struct HpMem {
    #[serde(default)]
    mem_total_mem_size: i32,
    #[serde(default)]
    memory: Vec<HpMemSlot>,
}

#[derive(Debug, Default, Deserialize)]
struct HpMemSlot {
    #[serde(default)]
    mem_size: i32,
}

#[derive(Debug, Default, Deserialize)]
struct HpProcs {
    #[serde(default)]
    processors: Vec<HpProc>,
}

#[derive(Debug, Default, Deserialize)]
struct HpProc {
    #[serde(default)]
    proc_name: String,
    #[serde(default)]
    proc_num_cores: i32,
    #[serde(default)]
    proc_num_threads: i32,
}

#[derive(Debug, Default, Deserialize)]
struct HpPowerSummary {
    #[serde(default)]
    power_supply_input_power: f64,
}

#[derive(Debug, Default, Deserialize)]
struct HpHealthTemperature {
    #[serde(default)]
    temperature: Vec<HpTemperature>,
}

#[derive(Debug, Default, Deserialize)]
struct HpTemperature {
    #[serde(default)]
    location: String,
    #[serde(default)]
    currentreading: i32,
}

#[derive(Debug, Default, Deserialize)]
struct HpIloLicense {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    license_type: String,
}

pub struct IloClient {
    host: String,
    username: String,
    password: String,
    client: reqwest::Client,
    rimp: RimpBlade,
    dumper: PayloadDumper,
}

impl IloClient {
    /// `xmldata` is the RIMP document the dispatcher already fetched from
    /// `/xmldata?item=all` while classifying the host.
    pub fn new(
        host: &str,
        username: &str,
        password: &str,
        xmldata: &str,
        dumper: PayloadDumper,
    ) -> Result<Self> {
        let rimp: RimpBlade = quick_xml::de::from_str(xmldata).map_err(|err| {
            dumper.dump(host, xmldata.as_bytes());
            Error::decode("iLO xmldata", err)
        })?;

        Ok(Self {
            host: host.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            client: build_client()?,
            rimp,
            dumper,
        })
    }

    async fn get(&self, endpoint: &str) -> Result<Vec<u8>> {
        debug!(step = "iLO connection", ip = %self.host, endpoint, "retrieving data from iLO");
        let response = self
            .client
            .get(format!("https://{}/{}", self.host, endpoint))
            .send()
            .await?;
        if response.status().as_u16() == 404 {
            return Err(Error::PageNotFound);
        }
        Ok(response.bytes().await?.to_vec())
    }

    fn decode<T: DeserializeOwned>(&self, kind: &'static str, payload: &[u8]) -> Result<T> {
        serde_json::from_slice(payload).map_err(|err| {
            self.dumper.dump(&self.host, payload);
            Error::decode(kind, err)
        })
    }

    async fn overview(&self) -> Result<HpOverview> {
        let payload = self.get("json/overview").await?;
        self.decode("iLO overview", &payload)
    }

    pub(crate) async fn bios_version(&self) -> Result<String> {
        Ok(self.overview().await?.system_rom)
    }

    /// Total memory in GiB; the per-slot sum when the total is missing.
    pub(crate) async fn memory_gb(&self) -> Result<i32> {
        let payload = self.get("json/mem_info").await?;
        let mem: HpMem = self.decode("iLO mem_info", &payload)?;
        if mem.mem_total_mem_size != 0 {
            return Ok(mem.mem_total_mem_size / 1024);
        }
        Ok(mem.memory.iter().map(|slot| slot.mem_size).sum::<i32>() / 1024)
    }

    pub(crate) async fn cpu(&self) -> Result<(String, i32, i32, i32)> {
        let payload = self.get("json/proc_info").await?;
        let procs: HpProcs = self.decode("iLO proc_info", &payload)?;
        match procs.processors.first() {
            Some(proc) => Ok((
                proc.proc_name.trim().to_string(),
                procs.processors.len() as i32,
                proc.proc_num_cores,
                proc.proc_num_threads,
            )),
            None => Ok((String::new(), 0, 0, 0)),
        }
    }

    async fn power_kw(&self) -> Result<f64> {
        let payload = self.get("json/power_summary").await?;
        let power: HpPowerSummary = self.decode("iLO power_summary", &payload)?;
        Ok(power.power_supply_input_power / 1000.0)
    }

    async fn temp_c(&self) -> Result<i32> {
        let payload = self.get("json/health_temperature").await?;
        let thermal: HpHealthTemperature = self.decode("iLO health_temperature", &payload)?;
        Ok(thermal
            .temperature
            .iter()
            .find(|item| item.location == "Ambient")
            .map(|item| item.currentreading)
            .unwrap_or_default())
    }

    pub(crate) async fn license(&self) -> Result<(String, String)> {
        let payload = self.get("json/license").await?;
        let license: HpIloLicense = self.decode("iLO license", &payload)?;
        Ok((license.name, license.license_type))
    }

    pub(crate) fn nics(&self) -> Vec<Nic> {
        let mut nics = Vec::new();
        if let Some(hp_nics) = self.rimp.hsi.as_ref().and_then(|hsi| hsi.nics.as_ref()) {
            for nic in &hp_nics.nic {
                if nic.macaddr.is_empty() {
                    continue;
                }
                let name = if nic.description.starts_with("iLO") {
                    "bmc".to_string()
                } else {
                    nic.description.clone()
                };
                nics.push(Nic {
                    mac_address: normalize_mac(&nic.macaddr),
                    name,
                    ..Nic::default()
                });
            }
        }
        nics
    }

    fn raw_serial(&self) -> String {
        self.rimp
            .hsi
            .as_ref()
            .map(|hsi| hsi.sbsn.clone())
            .unwrap_or_default()
    }

    pub(crate) fn bmc_type_name(&self) -> String {
        let pn = self.rimp.mp.as_ref().map(|mp| mp.pn.as_str()).unwrap_or("");
        match pn {
            "Integrated Lights-Out 4 (iLO 4)" => "iLO4".to_string(),
            "Integrated Lights-Out 3 (iLO 3)" => "iLO3".to_string(),
            other => other.to_string(),
        }
    }
}

#[async_trait]
impl Bmc for IloClient {
    async fn login(&mut self) -> Result<()> {
        debug!(step = "iLO connection", ip = %self.host, "connecting to iLO");
        let body = serde_json::json!({
            "method": "login",
            "user_login": self.username,
            "password": self.password,
        });
        let response = self
            .client
            .post(format!("https://{}/json/login_session", self.host))
            .json(&body)
            .send()
            .await?;
        if response.status().as_u16() == 404 {
            return Err(Error::PageNotFound);
        }
        let payload = response.text().await?;
        if payload.contains("Invalid login attempt") {
            return Err(Error::LoginFailed);
        }
        Ok(())
    }

    async fn logout(&mut self) {
        debug!(step = "iLO connection", ip = %self.host, "logout from iLO");
        let body = serde_json::json!({ "method": "logout" });
        if let Err(err) = self
            .client
            .post(format!("https://{}/json/login_session", self.host))
            .json(&body)
            .send()
            .await
        {
            warn!(ip = %self.host, error = %err, "iLO logout failed");
        }
    }

    fn update_credentials(&mut self, username: &str, password: &str) {
        self.username = username.to_string();
        self.password = password.to_string();
    }

    fn vendor(&self) -> Vendor {
        Vendor::Hp
    }

    async fn is_blade(&mut self) -> Result<bool> {
        Ok(self.rimp.bladesystem.is_some())
    }

    async fn serial(&mut self) -> Result<String> {
        normalize_serial(&self.raw_serial())
    }

    async fn bmc_type(&mut self) -> Result<String> {
        Ok(self.bmc_type_name())
    }

    async fn server_snapshot(&mut self) -> Result<ServerSnapshot> {
        let serial = normalize_serial(&self.raw_serial())?;
        let model = self
            .rimp
            .hsi
            .as_ref()
            .map(|hsi| hsi.spn.clone())
            .unwrap_or_default();
        let bmc_version = self
            .rimp
            .mp
            .as_ref()
            .map(|mp| mp.fwri.clone())
            .unwrap_or_default();

        let mut name = String::new();
        let mut bios_version = String::new();
        let mut status = String::new();
        match self.overview().await {
            Ok(overview) => {
                name = overview.server_name;
                bios_version = overview.system_rom;
                status = if overview.system_health == "OP_STATUS_OK" {
                    "OK".to_string()
                } else {
                    overview.system_health
                };
            }
            Err(err) => {
                warn!(ip = %self.host, error = %err, "reading iLO overview")
            }
        }

        let memory_gb = self.memory_gb().await.unwrap_or_else(|err| {
            warn!(ip = %self.host, error = %err, "reading memory data");
            0
        });
        let (processor, processor_count, core_count, thread_count) =
            self.cpu().await.unwrap_or_else(|err| {
                warn!(ip = %self.host, error = %err, "reading cpu data");
                Default::default()
            });
        let power_kw = self.power_kw().await.unwrap_or_else(|err| {
            warn!(ip = %self.host, error = %err, "reading power data");
            0.0
        });
        let temp_c = self.temp_c().await.unwrap_or_else(|err| {
            warn!(ip = %self.host, error = %err, "reading thermal data");
            0
        });
        let (license_type, license_status) = self.license().await.unwrap_or_else(|err| {
            warn!(ip = %self.host, error = %err, "reading license data");
            Default::default()
        });

        let nics = self.nics();

        if let Some(bladesystem) = &self.rimp.bladesystem {
            let blade = Blade {
                serial,
                name,
                model,
                vendor: Vendor::Hp.as_str().to_string(),
                bios_version,
                bmc_type: self.bmc_type_name(),
                bmc_address: self.host.clone(),
                bmc_version,
                bmc_license_type: license_type,
                bmc_license_status: license_status,
                processor,
                processor_count,
                processor_core_count: core_count,
                processor_thread_count: thread_count,
                memory_gb,
                status,
                power_kw,
                temp_c,
                blade_position: bladesystem.bay,
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
                name,
                model,
                vendor: Vendor::Hp.as_str().to_string(),
                bios_version,
                bmc_type: self.bmc_type_name(),
                bmc_address: self.host.clone(),
                bmc_version,
                bmc_license_type: license_type,
                bmc_license_status: license_status,
                processor,
                processor_count,
                processor_core_count: core_count,
                processor_thread_count: thread_count,
                memory_gb,
                status,
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

    const BLADE_RIMP: &str = r#"<RIMP>
        <HSI>
            <SBSN> CZ3432KDA </SBSN>
            <SPN>ProLiant BL460c Gen9</SPN>
            <NICS>
                <NIC><PORT>1</PORT><MACADDR>AA:BB:CC:DD:EE:01</MACADDR><DESCRIPTION>FlexFabric Adapter</DESCRIPTION></NIC>
                <NIC><PORT>2</PORT><MACADDR>AA:BB:CC:DD:EE:02</MACADDR><DESCRIPTION>iLO 4</DESCRIPTION></NIC>
            </NICS>
        </HSI>
        <MP>
            <PN>Integrated Lights-Out 4 (iLO 4)</PN>
            <FWRI>2.55</FWRI>
        </MP>
        <BLADESYSTEM>
            <BAY>7</BAY>
        </BLADESYSTEM>
    </RIMP>"#;

    const DISCRETE_RIMP: &str = r#"<RIMP>
        <HSI><SBSN>MX1234ABCD</SBSN><SPN>ProLiant DL380 Gen9</SPN></HSI>
        <MP><PN>Integrated Lights-Out 4 (iLO 4)</PN><FWRI>2.55</FWRI></MP>
    </RIMP>"#;

    fn client(xmldata: &str) -> IloClient {
        IloClient::new(
            "10.0.0.1",
            "user",
            "pass",
            xmldata,
            PayloadDumper::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn blade_rimp_identifies_a_blade() {
        let mut ilo = client(BLADE_RIMP);
        assert!(ilo.is_blade().await.unwrap());
        assert_eq!(ilo.serial().await.unwrap(), "cz3432kda");
        assert_eq!(ilo.bmc_type().await.unwrap(), "iLO4");
    }

    #[tokio::test]
    async fn discrete_rimp_identifies_a_discrete() {
        let mut ilo = client(DISCRETE_RIMP);
        assert!(!ilo.is_blade().await.unwrap());
        assert_eq!(ilo.serial().await.unwrap(), "mx1234abcd");
    }

    #[test]
    fn ilo_management_nic_is_renamed_bmc() {
        let ilo = client(BLADE_RIMP);
        let nics = ilo.nics();
        assert_eq!(nics.len(), 2);
        assert_eq!(nics[0].mac_address, "aa:bb:cc:dd:ee:01");
        assert_eq!(nics[0].name, "FlexFabric Adapter");
        assert_eq!(nics[1].name, "bmc");
    }

    #[test]
    fn broken_rimp_is_a_decode_error() {
        let result = IloClient::new(
            "10.0.0.1",
            "user",
            "pass",
            "not xml at all",
            PayloadDumper::default(),
        );
        assert!(matches!(result, Err(Error::Decode { .. })));
    }
}
