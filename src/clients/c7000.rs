//! HP c7000 Onboard Administrator client. One RIMP document from
//! `/xmldata?item=all` describes the whole enclosure; blades are enriched
//! through secondary iLO sessions.

use super::{build_client, Bmc, BmcChassis, IloClient, PayloadDumper};
use crate::error::{Error, Result};
use crate::model::{
    normalize_serial, Blade, BladeSnapshot, Chassis, ChassisSnapshot, Fan, Psu, StorageBlade,
    Vendor,
};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error, warn};

/// `/xmldata?item=all` on an Onboard Administrator.
#[derive(Debug, Default, Deserialize)]
pub struct RimpChassis {
    #[serde(rename = "INFRA2", default)]
    pub infra2: Option<Infra2>,
    #[serde(rename = "MP", default)]
    pub mp: Option<OaMp>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OaMp {
    #[serde(rename = "PN", default)]
    pub pn: String,
    #[serde(rename = "FWRI", default)]
    pub fwri: String,
    #[serde(rename = "ROLE", default)]
    pub role: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Infra2 {
    #[serde(rename = "ENCL", default)]
    pub encl: String,
    #[serde(rename = "ENCL_SN", default)]
    pub encl_sn: String,
    #[serde(rename = "PN", default)]
    pub pn: String,
    #[serde(rename = "STATUS", default)]
    pub status: String,
    #[serde(rename = "POWER", default)]
    pub power: Option<OaPower>,
    #[serde(rename = "TEMPS", default)]
    pub temps: Option<OaTemps>,
    #[serde(rename = "BLADES", default)]
    pub blades: Option<OaBlades>,
    #[serde(rename = "SWITCHES", default)]
    pub switches: Option<OaSwitches>,
    #[serde(rename = "FANS", default)]
    pub fans: Option<OaFans>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OaPower {
    #[serde(rename = "POWER_CONSUMED", default)]
    pub power_consumed: f64,
    #[serde(rename = "POWERSUPPLY", default)]
    pub powersupply: Vec<OaPowersupply>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OaPowersupply {
    #[serde(rename = "SN", default)]
    pub sn: String,
    #[serde(rename = "PN", default)]
    pub pn: String,
    #[serde(rename = "STATUS", default)]
    pub status: String,
    #[serde(rename = "CAPACITY", default)]
    pub capacity: f64,
    #[serde(rename = "ACTUALOUTPUT", default)]
    pub actual_output: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct OaTemps {
    #[serde(rename = "TEMP", default)]
    pub temp: Option<OaTemp>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OaTemp {
    #[serde(rename = "C", default)]
    pub c: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct OaBlades {
    #[serde(rename = "BLADE", default)]
    pub blade: Vec<OaBlade>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OaBlade {
    #[serde(rename = "BAY", default)]
    pub bay: Option<OaBay>,
    #[serde(rename = "BSN", default)]
    pub bsn: String,
    #[serde(rename = "SPN", default)]
    pub spn: String,
    #[serde(rename = "NAME", default)]
    pub name: String,
    #[serde(rename = "MGMTIPADDR", default)]
    pub mgmt_ip_addr: String,
    #[serde(rename = "MGMTFWVERSION", default)]
    pub mgmt_fw_version: String,
    #[serde(rename = "STATUS", default)]
    pub status: String,
    #[serde(rename = "POWER", default)]
    pub power: Option<OaBladePower>,
    #[serde(rename = "TEMPS", default)]
    pub temps: Option<OaTemps>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OaBay {
    #[serde(rename = "CONNECTION", default)]
    pub connection: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct OaBladePower {
    #[serde(rename = "POWER_CONSUMED", default)]
    pub power_consumed: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct OaSwitches {
    #[serde(rename = "SWITCH", default)]
    pub switch: Vec<OaSwitch>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OaSwitch {
    #[serde(rename = "SPN", default)]
    pub spn: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct OaFans {
    #[serde(rename = "FAN", default)]
    pub fan: Vec<OaFan>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OaFan {
    #[serde(rename = "BAY", default)]
    pub bay: Option<OaBay>,
    #[serde(rename = "PRODUCTNAME", default)]
    pub product_name: String,
    #[serde(rename = "STATUS", default)]
    pub status: String,
}

pub struct HpC7000Client {
    host: String,
    username: String,
    password: String,
    client: reqwest::Client,
    rimp: Option<RimpChassis>,
    dumper: PayloadDumper,
}

impl HpC7000Client {
    pub fn new(host: &str, username: &str, password: &str, dumper: PayloadDumper) -> Result<Self> {
        Ok(Self {
            host: host.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            client: build_client()?,
            rimp: None,
            dumper,
        })
    }

    async fn rimp(&mut self) -> Result<&RimpChassis> {
        if self.rimp.is_none() {
            let response = self
                .client
                .get(format!("https://{}/xmldata?item=all", self.host))
                .basic_auth(&self.username, Some(&self.password))
                .send()
                .await?;
            if response.status().as_u16() == 404 {
                return Err(Error::PageNotFound);
            }
            let payload = response.text().await?;
            let rimp: RimpChassis = quick_xml::de::from_str(&payload).map_err(|err| {
                self.dumper.dump(&self.host, payload.as_bytes());
                Error::decode("OA xmldata", err)
            })?;
            self.rimp = Some(rimp);
        }
        Ok(self.rimp.as_ref().expect("rimp just cached"))
    }

    /// Fetches the blade's own RIMP document and opens an iLO session for
    /// the fields the enclosure does not expose. Failures are warnings.
    async fn enrich_blade(&self, snapshot: &mut BladeSnapshot) {
        let address = snapshot.blade.bmc_address.clone();
        if address.is_empty() {
            return;
        }

        let xmldata = match self
            .client
            .get(format!("https://{}/xmldata?item=all", address))
            .send()
            .await
        {
            Ok(response) => match response.text().await {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(operation = "connection", ip = %address, serial = %snapshot.blade.serial, error = %err, "auditing blade");
                    return;
                }
            },
            Err(err) => {
                warn!(operation = "connection", ip = %address, serial = %snapshot.blade.serial, error = %err, "auditing blade");
                return;
            }
        };

        let mut ilo = match IloClient::new(
            &address,
            &self.username,
            &self.password,
            &xmldata,
            self.dumper.clone(),
        ) {
            Ok(ilo) => ilo,
            Err(err) => {
                warn!(operation = "create ilo connection", ip = %address, serial = %snapshot.blade.serial, error = %err, "auditing blade");
                return;
            }
        };

        snapshot.blade.bmc_type = ilo.bmc_type_name();
        let nics = ilo.nics();
        if !nics.is_empty() {
            snapshot.nics = nics;
        }

        if let Err(err) = ilo.login().await {
            warn!(operation = "opening ilo connection", ip = %address, serial = %snapshot.blade.serial, error = %err, "auditing blade");
            return;
        }
        snapshot.blade.bmc_auth = true;

        match ilo.bios_version().await {
            Ok(version) => snapshot.blade.bios_version = version,
            Err(err) => {
                warn!(operation = "read bios version", ip = %address, serial = %snapshot.blade.serial, error = %err, "auditing blade")
            }
        }
        match ilo.cpu().await {
            Ok((processor, count, cores, threads)) => {
                snapshot.blade.processor = processor;
                snapshot.blade.processor_count = count;
                snapshot.blade.processor_core_count = cores;
                snapshot.blade.processor_thread_count = threads;
            }
            Err(err) => {
                warn!(operation = "read cpu data", ip = %address, serial = %snapshot.blade.serial, error = %err, "auditing blade")
            }
        }
        match ilo.memory_gb().await {
            Ok(memory) => snapshot.blade.memory_gb = memory,
            Err(err) => {
                warn!(operation = "read memory data", ip = %address, serial = %snapshot.blade.serial, error = %err, "auditing blade")
            }
        }
        match ilo.license().await {
            Ok((license_type, license_status)) => {
                snapshot.blade.bmc_license_type = license_type;
                snapshot.blade.bmc_license_status = license_status;
            }
            Err(err) => {
                warn!(operation = "read license data", ip = %address, serial = %snapshot.blade.serial, error = %err, "auditing blade")
            }
        }

        ilo.logout().await;
    }
}

#[async_trait]
impl BmcChassis for HpC7000Client {
    /// The OA serves its inventory document to authenticated basic-auth
    /// requests; fetching it is the session handshake.
    async fn login(&mut self) -> Result<()> {
        debug!(step = "chassis connection HP", host = %self.host, "connecting to OA");
        self.rimp().await.map(|_| ())
    }

    async fn logout(&mut self) {
        // The RIMP endpoint is sessionless.
        self.rimp = None;
    }

    fn update_credentials(&mut self, username: &str, password: &str) {
        self.username = username.to_string();
        self.password = password.to_string();
        self.rimp = None;
    }

    fn vendor(&self) -> Vendor {
        Vendor::Hp
    }

    /// A standby OA advertises its role in the management-processor block.
    async fn is_active(&mut self) -> Result<bool> {
        let rimp = self.rimp().await?;
        let role = rimp
            .mp
            .as_ref()
            .map(|mp| mp.role.as_str())
            .unwrap_or_default();
        // Older firmware omits the element entirely; only an explicit
        // standby role disqualifies the controller.
        Ok(!role.eq_ignore_ascii_case("standby"))
    }

    async fn chassis_snapshot(&mut self) -> Result<ChassisSnapshot> {
        let host = self.host.clone();
        self.rimp().await?;
        let rimp = self.rimp.take().expect("rimp just cached");

        let infra2 = rimp.infra2.unwrap_or_default();
        let serial = normalize_serial(&infra2.encl_sn)?;

        let mut chassis = Chassis {
            serial: serial.clone(),
            name: infra2.encl.clone(),
            model: infra2.pn.clone(),
            vendor: Vendor::Hp.as_str().to_string(),
            status: infra2.status.clone(),
            fw_version: rimp
                .mp
                .as_ref()
                .map(|mp| mp.fwri.clone())
                .unwrap_or_default(),
            bmc_auth: true,
            ..Chassis::default()
        };

        let mut psus = Vec::new();
        if let Some(power) = &infra2.power {
            chassis.power_kw = power.power_consumed / 1000.0;
            chassis.power_supply_count = power.powersupply.len() as i32;
            for supply in &power.powersupply {
                if supply.sn.is_empty() {
                    continue;
                }
                psus.push(Psu {
                    serial: supply.sn.to_lowercase(),
                    capacity_kw: supply.capacity / 1000.0,
                    power_kw: supply.actual_output / 1000.0,
                    status: supply.status.clone(),
                    part_number: supply.pn.clone(),
                    ..Psu::default()
                });
            }
        }
        chassis.temp_c = infra2
            .temps
            .as_ref()
            .and_then(|temps| temps.temp.as_ref())
            .map(|temp| temp.c)
            .unwrap_or_default();

        // The interconnect model tells 1G from 10G pass-through fabrics.
        if let Some(switches) = &infra2.switches {
            if let Some(switch) = switches.switch.first() {
                chassis.pass_thru = if switch.spn.contains("10G") { "10G" } else { "1G" }.to_string();
            }
        }

        let mut fans = Vec::new();
        if let Some(oa_fans) = &infra2.fans {
            for fan in &oa_fans.fan {
                let bay = fan.bay.as_ref().map(|bay| bay.connection).unwrap_or_default();
                fans.push(Fan {
                    serial: format!("{}_fan_{}", serial, bay),
                    status: fan.status.clone(),
                    position: bay,
                    model: fan.product_name.clone(),
                    ..Fan::default()
                });
            }
        }

        let mut blades = Vec::new();
        let mut storage_blades = Vec::new();
        if let Some(oa_blades) = &infra2.blades {
            for oa_blade in &oa_blades.blade {
                let position = oa_blade
                    .bay
                    .as_ref()
                    .map(|bay| bay.connection)
                    .unwrap_or_default();
                let serial = match normalize_serial(&oa_blade.bsn) {
                    Ok(serial) => serial,
                    Err(err) => {
                        error!(operation = "connection", ip = %host, position, error = %err,
                            "the chassis identifies this blade as connected, but there is no data");
                        continue;
                    }
                };

                if oa_blade.spn.contains("Storage") {
                    storage_blades.push(StorageBlade {
                        serial: serial.clone(),
                        name: serial,
                        model: oa_blade.spn.clone(),
                        vendor: Vendor::Hp.as_str().to_string(),
                        status: oa_blade.status.clone(),
                        power_kw: oa_blade
                            .power
                            .as_ref()
                            .map(|power| power.power_consumed / 1000.0)
                            .unwrap_or_default(),
                        temp_c: oa_blade
                            .temps
                            .as_ref()
                            .and_then(|temps| temps.temp.as_ref())
                            .map(|temp| temp.c)
                            .unwrap_or_default(),
                        blade_position: position,
                        ..StorageBlade::default()
                    });
                    continue;
                }

                let blade = Blade {
                    serial,
                    name: oa_blade.name.clone(),
                    model: oa_blade.spn.clone(),
                    vendor: Vendor::Hp.as_str().to_string(),
                    bmc_address: oa_blade.mgmt_ip_addr.clone(),
                    bmc_version: oa_blade.mgmt_fw_version.clone(),
                    status: oa_blade.status.clone(),
                    power_kw: oa_blade
                        .power
                        .as_ref()
                        .map(|power| power.power_consumed / 1000.0)
                        .unwrap_or_default(),
                    temp_c: oa_blade
                        .temps
                        .as_ref()
                        .and_then(|temps| temps.temp.as_ref())
                        .map(|temp| temp.c)
                        .unwrap_or_default(),
                    blade_position: position,
                    ..Blade::default()
                };

                let mut snapshot = BladeSnapshot {
                    blade,
                    nics: Vec::new(),
                    disks: Vec::new(),
                };
                self.enrich_blade(&mut snapshot).await;
                blades.push(snapshot);
            }
        }
        blades.sort_by_key(|b| b.blade.blade_position);

        Ok(ChassisSnapshot {
            chassis,
            blades,
            storage_blades,
            nics: Vec::new(),
            psus,
            fans,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OA_RIMP: &str = r#"<RIMP>
        <MP>
            <PN>BladeSystem c7000 DDR2 Onboard Administrator with KVM</PN>
            <FWRI>4.85</FWRI>
            <ROLE>ACTIVE</ROLE>
        </MP>
        <INFRA2>
            <ENCL>rack-42-encl</ENCL>
            <ENCL_SN>CZ35230HotL</ENCL_SN>
            <PN>BladeSystem c7000 Enclosure G2</PN>
            <STATUS>OK</STATUS>
            <POWER>
                <POWER_CONSUMED>4230</POWER_CONSUMED>
                <POWERSUPPLY><SN>5BGXA0A4DWW1RF</SN><PN>499253-B21</PN><STATUS>OK</STATUS><CAPACITY>2450</CAPACITY><ACTUALOUTPUT>705</ACTUALOUTPUT></POWERSUPPLY>
                <POWERSUPPLY><SN>5BGXA0A4DWW1S2</SN><PN>499253-B21</PN><STATUS>OK</STATUS><CAPACITY>2450</CAPACITY><ACTUALOUTPUT>705</ACTUALOUTPUT></POWERSUPPLY>
            </POWER>
            <TEMPS><TEMP><C>24</C></TEMP></TEMPS>
            <SWITCHES><SWITCH><SPN>HP 10GbE Pass-Thru Module</SPN></SWITCH></SWITCHES>
            <FANS>
                <FAN><BAY><CONNECTION>1</CONNECTION></BAY><PRODUCTNAME>Active Cool 200 Fan</PRODUCTNAME><STATUS>OK</STATUS></FAN>
            </FANS>
            <BLADES>
                <BLADE>
                    <BAY><CONNECTION>3</CONNECTION></BAY>
                    <BSN>ALPHA123 </BSN>
                    <SPN>ProLiant BL460c Gen9</SPN>
                    <NAME>web-03</NAME>
                    <MGMTIPADDR>10.0.1.13</MGMTIPADDR>
                    <MGMTFWVERSION>2.55</MGMTFWVERSION>
                    <STATUS>OK</STATUS>
                    <POWER><POWER_CONSUMED>280</POWER_CONSUMED></POWER>
                    <TEMPS><TEMP><C>19</C></TEMP></TEMPS>
                </BLADE>
                <BLADE>
                    <BAY><CONNECTION>4</CONNECTION></BAY>
                    <BSN>[Unknown]</BSN>
                    <SPN>ProLiant BL460c Gen9</SPN>
                </BLADE>
                <BLADE>
                    <BAY><CONNECTION>5</CONNECTION></BAY>
                    <BSN>GAMMA77</BSN>
                    <SPN>HP D2220sb Storage Blade</SPN>
                    <STATUS>OK</STATUS>
                </BLADE>
            </BLADES>
        </INFRA2>
    </RIMP>"#;

    #[test]
    fn oa_rimp_decodes_the_enclosure() {
        let rimp: RimpChassis = quick_xml::de::from_str(OA_RIMP).unwrap();
        let infra2 = rimp.infra2.unwrap();
        assert_eq!(infra2.encl_sn, "CZ35230HotL");
        assert_eq!(infra2.power.as_ref().unwrap().powersupply.len(), 2);
        assert_eq!(infra2.blades.as_ref().unwrap().blade.len(), 3);
        assert_eq!(rimp.mp.unwrap().role, "ACTIVE");
    }

    #[test]
    fn blade_bays_and_storage_markers_decode() {
        let rimp: RimpChassis = quick_xml::de::from_str(OA_RIMP).unwrap();
        let infra2 = rimp.infra2.unwrap();
        let blades = &infra2.blades.unwrap().blade;
        assert_eq!(blades[0].bay.as_ref().unwrap().connection, 3);
        assert_eq!(blades[0].mgmt_ip_addr, "10.0.1.13");
        assert!(blades[2].spn.contains("Storage"));
    }
}
