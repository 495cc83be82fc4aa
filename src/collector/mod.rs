//! The collector pipeline: a bounded input channel of host strings, a
//! fixed pool of workers each owning one host end-to-end, and a single
//! notifier task that outlives them all.

mod dispatcher;
mod notify;

pub use dispatcher::{scan_and_connect, Probe};
pub use notify::spawn_notifier;

use crate::clients::{Bmc, BmcChassis, PayloadDumper};
use crate::config::Config;
use crate::db::PgPool;
use crate::error::{Error, Result};
use crate::model::{Blade, Chassis, Discrete, ServerSnapshot, StorageBlade};
use crate::storage::{
    BladeStorage, ChassisStorage, DiscreteStorage, ScannedPortStorage, StorageBladeStorage,
};
use futures::FutureExt;
use std::collections::HashMap;
use std::net::IpAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Where the host list came from. Blades are skipped unless the operator
/// forced direct collection, because the chassis walk covers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cli,
    CliWithForce,
    Service,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Cli => "cli",
            Source::CliWithForce => "cli-with-force",
            Source::Service => "service",
        }
    }
}

struct WorkerContext {
    config: Arc<Config>,
    source: Source,
    chassis: ChassisStorage,
    blades: BladeStorage,
    discretes: DiscreteStorage,
    storage_blades: StorageBladeStorage,
    scanned_ports: ScannedPortStorage,
    notify: mpsc::UnboundedSender<String>,
    dumper: PayloadDumper,
}

impl WorkerContext {
    fn notify_change(&self, kind: &str, serial: &str) {
        let callback = format!("{}/{}/{}", self.config.url, kind, serial);
        let _ = self.notify.send(callback);
    }
}

/// A running collection pipeline. Send hosts into `input`, then call
/// `finish` to drain and tear everything down in order: input first,
/// workers next, the notifier last.
pub struct Pipeline {
    pub input: mpsc::Sender<String>,
    workers: Vec<JoinHandle<()>>,
    notifier: JoinHandle<()>,
}

impl Pipeline {
    pub fn start(config: Arc<Config>, pool: PgPool, source: Source) -> Result<Pipeline> {
        let concurrency = config.collector.concurrency;
        let (input, rx) = mpsc::channel::<String>(concurrency);
        let rx = Arc::new(Mutex::new(rx));
        let (notify_tx, notifier) = spawn_notifier()?;
        let dumper = PayloadDumper::new(
            config.dump_invalid_payloads,
            config.dump_invalid_payload_path.clone(),
        );

        let mut workers = Vec::with_capacity(concurrency);
        for _ in 0..concurrency {
            let ctx = WorkerContext {
                config: Arc::clone(&config),
                source,
                chassis: ChassisStorage::new(pool.clone()),
                blades: BladeStorage::new(pool.clone()),
                discretes: DiscreteStorage::new(pool.clone()),
                storage_blades: StorageBladeStorage::new(pool.clone()),
                scanned_ports: ScannedPortStorage::new(pool.clone()),
                notify: notify_tx.clone(),
                dumper: dumper.clone(),
            };
            let rx = Arc::clone(&rx);
            workers.push(tokio::spawn(worker(ctx, rx)));
        }

        Ok(Pipeline {
            input,
            workers,
            notifier,
        })
    }

    pub async fn finish(self) {
        drop(self.input);
        for handle in self.workers {
            let _ = handle.await;
        }
        // All producers are gone; the notifier drains what is left.
        let _ = self.notifier.await;
    }
}

async fn worker(ctx: WorkerContext, rx: Arc<Mutex<mpsc::Receiver<String>>>) {
    loop {
        let host = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(host) = host else {
            return;
        };

        // One broken decoder must not take the worker down with it.
        let outcome = AssertUnwindSafe(collect_host(&ctx, &host))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(Error::VendorUnknown)) => {
                debug!(operation = "connection", ip = %host, "unknown vendor, skipping host");
            }
            Ok(Err(err)) => {
                error!(operation = "connection", ip = %host, error = %err, "collecting data");
            }
            Err(_) => {
                error!(operation = "connection", ip = %host, "panic while collecting host");
            }
        }
    }
}

async fn collect_host(ctx: &WorkerContext, host: &str) -> Result<()> {
    let probe = scan_and_connect(
        host,
        &ctx.config.bmc_user,
        &ctx.config.bmc_pass,
        ctx.dumper.clone(),
    )
    .await?;

    match probe {
        Probe::Server(mut bmc) => {
            let result = collect_server(ctx, host, bmc.as_mut()).await;
            bmc.logout().await;
            result
        }
        Probe::Enclosure(mut chassis) => {
            let result = collect_chassis(ctx, host, chassis.as_mut()).await;
            chassis.logout().await;
            result
        }
    }
}

/// Login, retrying exactly once with the vendor-default credentials.
async fn login_server(ctx: &WorkerContext, bmc: &mut dyn Bmc) -> Result<()> {
    match bmc.login().await {
        Err(Error::LoginFailed) => {
            let vendor = bmc.vendor();
            let Some(fallback) = ctx.config.vendor_default(vendor.key()) else {
                return Err(Error::LoginFailed);
            };
            info!(vendor = %vendor, "retrying login with vendor default credentials");
            bmc.update_credentials(&fallback.username, &fallback.password);
            bmc.login().await
        }
        other => other,
    }
}

async fn login_chassis(ctx: &WorkerContext, chassis: &mut dyn BmcChassis) -> Result<()> {
    match chassis.login().await {
        Err(Error::LoginFailed) => {
            let vendor = chassis.vendor();
            let Some(fallback) = ctx.config.vendor_default(vendor.key()) else {
                return Err(Error::LoginFailed);
            };
            info!(vendor = %vendor, "retrying login with vendor default credentials");
            chassis.update_credentials(&fallback.username, &fallback.password);
            chassis.login().await
        }
        other => other,
    }
}

async fn collect_server(ctx: &WorkerContext, host: &str, bmc: &mut dyn Bmc) -> Result<()> {
    login_server(ctx, bmc).await?;

    let serial = bmc.serial().await?;
    if bmc.is_blade().await? && ctx.source != Source::CliWithForce {
        debug!(operation = "connection", ip = %host, serial = %serial,
            "blades are collected through their chassis, skipping");
        return Ok(());
    }

    match bmc.server_snapshot().await? {
        ServerSnapshot::Blade(mut snapshot) => {
            snapshot.blade.bmc_auth = true;
            let flags = ctx
                .scanned_ports
                .reachability(&snapshot.blade.bmc_address)
                .await
                .unwrap_or_default();
            snapshot.blade.bmc_web_reachable = flags.web;
            snapshot.blade.bmc_ssh_reachable = flags.ssh;
            snapshot.blade.bmc_ipmi_reachable = flags.ipmi;

            let existing = match ctx.blades.get_one(&snapshot.blade.serial).await {
                Ok(previous) => previous.blade,
                Err(err) if err.is_not_found() => Blade::default(),
                Err(err) => return Err(err),
            };
            snapshot.blade.merge_enrichment(&existing);

            ctx.blades.update_or_create(&snapshot).await?;
            if !snapshot.blade.diff(&existing).is_empty() {
                ctx.notify_change("blades", &snapshot.blade.serial);
            }

            let (count, macs) = ctx.blades.remove_old_nics_refs(&snapshot).await?;
            if count > 0 {
                info!(operation = "cleanup", serial = %snapshot.blade.serial, ?macs, "nics removed from blade");
                ctx.notify_change("blades", &snapshot.blade.serial);
            }
            let (count, serials) = ctx.blades.remove_old_disks_refs(&snapshot).await?;
            if count > 0 {
                info!(operation = "cleanup", serial = %snapshot.blade.serial, ?serials, "disks removed from blade");
                ctx.notify_change("blades", &snapshot.blade.serial);
            }
        }
        ServerSnapshot::Discrete(mut snapshot) => {
            snapshot.discrete.bmc_auth = true;
            let flags = ctx
                .scanned_ports
                .reachability(&snapshot.discrete.bmc_address)
                .await
                .unwrap_or_default();
            snapshot.discrete.bmc_web_reachable = flags.web;
            snapshot.discrete.bmc_ssh_reachable = flags.ssh;
            snapshot.discrete.bmc_ipmi_reachable = flags.ipmi;

            let existing = match ctx.discretes.get_one(&snapshot.discrete.serial).await {
                Ok(previous) => previous.discrete,
                Err(err) if err.is_not_found() => Discrete::default(),
                Err(err) => return Err(err),
            };
            snapshot.discrete.merge_enrichment(&existing);

            ctx.discretes.update_or_create(&snapshot).await?;
            if !snapshot.discrete.diff(&existing).is_empty() {
                ctx.notify_change("discretes", &snapshot.discrete.serial);
            }

            let serial = snapshot.discrete.serial.clone();
            let (count, macs) = ctx.discretes.remove_old_nics_refs(&snapshot).await?;
            if count > 0 {
                info!(operation = "cleanup", serial = %serial, ?macs, "nics removed from discrete");
                ctx.notify_change("discretes", &serial);
            }
            let (count, disks) = ctx.discretes.remove_old_disks_refs(&snapshot).await?;
            if count > 0 {
                info!(operation = "cleanup", serial = %serial, ?disks, "disks removed from discrete");
                ctx.notify_change("discretes", &serial);
            }
            let (count, psus) = ctx.discretes.remove_old_psus_refs(&snapshot).await?;
            if count > 0 {
                info!(operation = "cleanup", serial = %serial, ?psus, "psus removed from discrete");
                ctx.notify_change("discretes", &serial);
            }
            let (count, fans) = ctx.discretes.remove_old_fans_refs(&snapshot).await?;
            if count > 0 {
                info!(operation = "cleanup", serial = %serial, ?fans, "fans removed from discrete");
                ctx.notify_change("discretes", &serial);
            }
        }
    }

    Ok(())
}

async fn collect_chassis(
    ctx: &WorkerContext,
    host: &str,
    chassis: &mut dyn BmcChassis,
) -> Result<()> {
    login_chassis(ctx, chassis).await?;

    if !chassis.is_active().await? {
        info!(operation = "connection", ip = %host, "passive chassis controller, skipping");
        return Ok(());
    }

    let mut snapshot = chassis.chassis_snapshot().await?;
    let serial = snapshot.chassis.serial.clone();

    let flags = ctx.scanned_ports.reachability(host).await.unwrap_or_default();
    snapshot.chassis.bmc_web_reachable = flags.web;
    snapshot.chassis.bmc_ssh_reachable = flags.ssh;

    // Previous state is captured before the upsert so the change
    // notifications compare against what was actually persisted.
    let existing_chassis = match ctx.chassis.get_one(&serial).await {
        Ok(previous) => previous.chassis,
        Err(err) if err.is_not_found() => Chassis::default(),
        Err(err) => return Err(err),
    };

    let mut existing_blades: HashMap<String, Blade> = HashMap::new();
    for member in &mut snapshot.blades {
        let flags = ctx
            .scanned_ports
            .reachability(&member.blade.bmc_address)
            .await
            .unwrap_or_default();
        member.blade.bmc_web_reachable = flags.web;
        member.blade.bmc_ssh_reachable = flags.ssh;
        member.blade.bmc_ipmi_reachable = flags.ipmi;

        match ctx.blades.get_one(&member.blade.serial).await {
            Ok(previous) => {
                member.blade.merge_enrichment(&previous.blade);
                existing_blades.insert(member.blade.serial.clone(), previous.blade);
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => {
                error!(operation = "connection", ip = %host, serial = %member.blade.serial, error = %err, "collecting data");
            }
        }
    }

    let mut existing_storage_blades: HashMap<String, StorageBlade> = HashMap::new();
    for member in &snapshot.storage_blades {
        match ctx.storage_blades.get_one(&member.serial).await {
            Ok(previous) => {
                existing_storage_blades.insert(member.serial.clone(), previous);
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => {
                error!(operation = "connection", ip = %host, serial = %member.serial, error = %err, "collecting data");
            }
        }
    }

    ctx.chassis.update_or_create(&snapshot).await?;

    if !snapshot.chassis.diff(&existing_chassis).is_empty() {
        ctx.notify_change("chassis", &serial);
    }
    for member in &snapshot.blades {
        let previous = existing_blades
            .remove(&member.blade.serial)
            .unwrap_or_default();
        if !member.blade.diff(&previous).is_empty() {
            ctx.notify_change("blades", &member.blade.serial);
        }
    }
    for member in &snapshot.storage_blades {
        let previous = existing_storage_blades
            .remove(&member.serial)
            .unwrap_or_default();
        if !member.diff(&previous).is_empty() {
            ctx.notify_change("storage_blades", &member.serial);
        }
    }

    let (count, serials) = ctx.chassis.remove_old_blades_refs(&snapshot).await?;
    if count > 0 {
        for removed in &serials {
            info!(operation = "cleanup", chassis = %serial, serial = %removed, "blade has been removed from chassis");
        }
        ctx.notify_change("chassis", &serial);
    }
    let (count, serials) = ctx.chassis.remove_old_storage_blades_refs(&snapshot).await?;
    if count > 0 {
        for removed in &serials {
            info!(operation = "cleanup", chassis = %serial, serial = %removed, "storage blade has been removed from chassis");
        }
        ctx.notify_change("chassis", &serial);
    }
    let (count, macs) = ctx.chassis.remove_old_nics_refs(&snapshot).await?;
    if count > 0 {
        info!(operation = "cleanup", chassis = %serial, ?macs, "nics removed from chassis");
        ctx.notify_change("chassis", &serial);
    }
    let (count, psus) = ctx.chassis.remove_old_psus_refs(&snapshot).await?;
    if count > 0 {
        info!(operation = "cleanup", chassis = %serial, ?psus, "psus removed from chassis");
        ctx.notify_change("chassis", &serial);
    }
    let (count, fans) = ctx.chassis.remove_old_fans_refs(&snapshot).await?;
    if count > 0 {
        info!(operation = "cleanup", chassis = %serial, ?fans, "fans removed from chassis");
        ctx.notify_change("chassis", &serial);
    }

    Ok(())
}

/// Collects the given hosts and blocks until every worker has drained.
/// `all` expands to every host with 443/tcp open in the port-scan table;
/// hostnames resolve to their first A record.
pub async fn data_collection(
    ips: &[String],
    source: Source,
    config: Arc<Config>,
    pool: PgPool,
) -> anyhow::Result<()> {
    let scanned = ScannedPortStorage::new(pool.clone());
    let pipeline = Pipeline::start(config, pool, source)?;

    if ips.first().map(String::as_str) == Some("all") {
        match scanned.open_https_hosts().await {
            Ok(hosts) => {
                for host in hosts {
                    if pipeline.input.send(host).await.is_err() {
                        break;
                    }
                }
            }
            Err(err) => {
                error!(operation = "connection", ip = "all", error = %err, "retrieving scanned hosts");
            }
        }
    } else {
        for ip in ips {
            let resolved = match resolve(ip).await {
                Some(address) => address,
                None => {
                    error!(operation = "connection", ip = %ip, "could not resolve host");
                    continue;
                }
            };
            match scanned.has_open_https(&resolved).await {
                Ok(true) => {
                    if pipeline.input.send(resolved).await.is_err() {
                        break;
                    }
                }
                Ok(false) => {
                    error!(operation = "connection", ip = %resolved, "host has no open https port in the scan table");
                }
                Err(err) => {
                    error!(operation = "connection", ip = %resolved, error = %err, "retrieving scanned hosts");
                }
            }
        }
    }

    pipeline.finish().await;
    Ok(())
}

pub(crate) async fn resolve(host: &str) -> Option<String> {
    if host.parse::<IpAddr>().is_ok() {
        return Some(host.to_string());
    }
    let mut addresses = tokio::net::lookup_host((host, 443)).await.ok()?;
    addresses.next().map(|addr| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_sentinels_match_the_wire_protocol() {
        assert_eq!(Source::Cli.as_str(), "cli");
        assert_eq!(Source::CliWithForce.as_str(), "cli-with-force");
        assert_eq!(Source::Service.as_str(), "service");
    }

    #[tokio::test]
    async fn literal_addresses_resolve_to_themselves() {
        assert_eq!(resolve("10.1.2.3").await.as_deref(), Some("10.1.2.3"));
    }
}
