//! Vendor dispatcher: probe a host, classify vendor and form factor, hand
//! back a connected-but-not-yet-logged-in handle.

use crate::clients::{
    build_client, Bmc, BmcChassis, DellCmcClient, HpC7000Client, IdracClient, IloClient,
    PayloadDumper, SupermicroClient,
};
use crate::error::{Error, Result};
use tracing::debug;

/// What the probe found: a server-class BMC or a chassis controller.
pub enum Probe {
    Server(Box<dyn Bmc>),
    Enclosure(Box<dyn BmcChassis>),
}

/// Classifies a host by probing one or two vendor-stable endpoints and
/// inspecting the response bodies. Hosts matching no family return
/// `VendorUnknown` and are skipped, not errored.
pub async fn scan_and_connect(
    host: &str,
    username: &str,
    password: &str,
    dumper: PayloadDumper,
) -> Result<Probe> {
    let client = build_client()?;

    // HP hardware, server and enclosure alike, serves a RIMP document.
    if let Some(body) = fetch(&client, host, "xmldata?item=all").await {
        if body.contains("RIMP") {
            if body.contains("<INFRA2>") {
                debug!(ip = host, vendor = "HP", "classified as chassis");
                return Ok(Probe::Enclosure(Box::new(HpC7000Client::new(
                    host, username, password, dumper,
                )?)));
            }
            debug!(ip = host, vendor = "HP", "classified as server");
            return Ok(Probe::Server(Box::new(IloClient::new(
                host, username, password, &body, dumper,
            )?)));
        }
    }

    // The Redfish root names the BMC family for Dell and Supermicro.
    if let Some(body) = fetch(&client, host, "redfish/v1/").await {
        if body.contains("iDRAC") {
            debug!(ip = host, vendor = "Dell", "classified as server");
            return Ok(Probe::Server(Box::new(IdracClient::new(
                host, username, password, dumper,
            )?)));
        }
        if body.contains("Supermicro") {
            debug!(ip = host, vendor = "Supermicro", "classified as server");
            return Ok(Probe::Server(Box::new(SupermicroClient::new(
                host, username, password, dumper,
            )?)));
        }
        if let Some(entry) = fetch(&client, host, "redfish/v1/Systems/1/").await {
            if entry.contains("Supermicro") {
                debug!(ip = host, vendor = "Supermicro", "classified as server");
                return Ok(Probe::Server(Box::new(SupermicroClient::new(
                    host, username, password, dumper,
                )?)));
            }
        }
    }

    // Dell M1000e controllers only speak webcgi.
    if let Some(body) = fetch(&client, host, "cgi-bin/webcgi/login").await {
        if body.contains("Chassis Management Controller") || body.contains("CMC") {
            debug!(ip = host, vendor = "Dell", "classified as chassis");
            return Ok(Probe::Enclosure(Box::new(DellCmcClient::new(
                host, username, password, dumper,
            )?)));
        }
    }

    Err(Error::VendorUnknown)
}

async fn fetch(client: &reqwest::Client, host: &str, endpoint: &str) -> Option<String> {
    let response = client
        .get(format!("https://{host}/{endpoint}"))
        .send()
        .await
        .ok()?;
    if !response.status().is_success() {
        return None;
    }
    response.text().await.ok()
}
