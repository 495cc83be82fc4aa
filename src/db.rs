//! PostgreSQL connection pooling for the collector and the web tier.

use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bb8::{ManageConnection, Pool};
use diesel_async::{AsyncPgConnection, SimpleAsyncConnection};
use tokio_postgres::{Config as PgConfig, NoTls};
use tracing::{error, info};

pub type PgPool = Pool<PgConnectionManager>;

/// Idempotent DDL run at startup. Foreign-serial columns are indexed to
/// back the join-based relation selectors.
const SCHEMA_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS chassis (
    serial TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    model TEXT NOT NULL DEFAULT '',
    vendor TEXT NOT NULL DEFAULT '',
    fw_version TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT '',
    power_kw DOUBLE PRECISION NOT NULL DEFAULT 0,
    temp_c INTEGER NOT NULL DEFAULT 0,
    power_supply_count INTEGER NOT NULL DEFAULT 0,
    pass_thru TEXT NOT NULL DEFAULT '',
    bmc_auth BOOLEAN NOT NULL DEFAULT FALSE,
    bmc_web_reachable BOOLEAN NOT NULL DEFAULT FALSE,
    bmc_ssh_reachable BOOLEAN NOT NULL DEFAULT FALSE,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE TABLE IF NOT EXISTS blade (
    serial TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    model TEXT NOT NULL DEFAULT '',
    vendor TEXT NOT NULL DEFAULT '',
    bios_version TEXT NOT NULL DEFAULT '',
    bmc_type TEXT NOT NULL DEFAULT '',
    bmc_address TEXT NOT NULL DEFAULT '',
    bmc_version TEXT NOT NULL DEFAULT '',
    bmc_license_type TEXT NOT NULL DEFAULT '',
    bmc_license_status TEXT NOT NULL DEFAULT '',
    processor TEXT NOT NULL DEFAULT '',
    processor_count INTEGER NOT NULL DEFAULT 0,
    processor_core_count INTEGER NOT NULL DEFAULT 0,
    processor_thread_count INTEGER NOT NULL DEFAULT 0,
    memory_gb INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT '',
    power_kw DOUBLE PRECISION NOT NULL DEFAULT 0,
    temp_c INTEGER NOT NULL DEFAULT 0,
    blade_position INTEGER NOT NULL DEFAULT 0,
    chassis_serial TEXT,
    bmc_auth BOOLEAN NOT NULL DEFAULT FALSE,
    bmc_web_reachable BOOLEAN NOT NULL DEFAULT FALSE,
    bmc_ssh_reachable BOOLEAN NOT NULL DEFAULT FALSE,
    bmc_ipmi_reachable BOOLEAN NOT NULL DEFAULT FALSE,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_blade_chassis_serial ON blade (chassis_serial);
CREATE TABLE IF NOT EXISTS discrete (
    serial TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    model TEXT NOT NULL DEFAULT '',
    vendor TEXT NOT NULL DEFAULT '',
    bios_version TEXT NOT NULL DEFAULT '',
    bmc_type TEXT NOT NULL DEFAULT '',
    bmc_address TEXT NOT NULL DEFAULT '',
    bmc_version TEXT NOT NULL DEFAULT '',
    bmc_license_type TEXT NOT NULL DEFAULT '',
    bmc_license_status TEXT NOT NULL DEFAULT '',
    processor TEXT NOT NULL DEFAULT '',
    processor_count INTEGER NOT NULL DEFAULT 0,
    processor_core_count INTEGER NOT NULL DEFAULT 0,
    processor_thread_count INTEGER NOT NULL DEFAULT 0,
    memory_gb INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT '',
    power_kw DOUBLE PRECISION NOT NULL DEFAULT 0,
    temp_c INTEGER NOT NULL DEFAULT 0,
    bmc_auth BOOLEAN NOT NULL DEFAULT FALSE,
    bmc_web_reachable BOOLEAN NOT NULL DEFAULT FALSE,
    bmc_ssh_reachable BOOLEAN NOT NULL DEFAULT FALSE,
    bmc_ipmi_reachable BOOLEAN NOT NULL DEFAULT FALSE,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE TABLE IF NOT EXISTS nic (
    mac_address TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    speed TEXT NOT NULL DEFAULT '',
    up BOOLEAN NOT NULL DEFAULT FALSE,
    blade_serial TEXT,
    chassis_serial TEXT,
    discrete_serial TEXT,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_nic_blade_serial ON nic (blade_serial);
CREATE INDEX IF NOT EXISTS idx_nic_chassis_serial ON nic (chassis_serial);
CREATE INDEX IF NOT EXISTS idx_nic_discrete_serial ON nic (discrete_serial);
CREATE TABLE IF NOT EXISTS disk (
    serial TEXT PRIMARY KEY,
    disk_type TEXT NOT NULL DEFAULT '',
    size TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT '',
    model TEXT NOT NULL DEFAULT '',
    fw_version TEXT NOT NULL DEFAULT '',
    location TEXT NOT NULL DEFAULT '',
    blade_serial TEXT,
    discrete_serial TEXT,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_disk_blade_serial ON disk (blade_serial);
CREATE INDEX IF NOT EXISTS idx_disk_discrete_serial ON disk (discrete_serial);
CREATE TABLE IF NOT EXISTS psu (
    serial TEXT PRIMARY KEY,
    capacity_kw DOUBLE PRECISION NOT NULL DEFAULT 0,
    power_kw DOUBLE PRECISION NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT '',
    part_number TEXT NOT NULL DEFAULT '',
    chassis_serial TEXT,
    discrete_serial TEXT,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_psu_chassis_serial ON psu (chassis_serial);
CREATE INDEX IF NOT EXISTS idx_psu_discrete_serial ON psu (discrete_serial);
CREATE TABLE IF NOT EXISTS fan (
    serial TEXT PRIMARY KEY,
    status TEXT NOT NULL DEFAULT '',
    position INTEGER NOT NULL DEFAULT 0,
    model TEXT NOT NULL DEFAULT '',
    chassis_serial TEXT,
    discrete_serial TEXT,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_fan_chassis_serial ON fan (chassis_serial);
CREATE INDEX IF NOT EXISTS idx_fan_discrete_serial ON fan (discrete_serial);
CREATE TABLE IF NOT EXISTS storage_blade (
    serial TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    model TEXT NOT NULL DEFAULT '',
    vendor TEXT NOT NULL DEFAULT '',
    fw_version TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT '',
    power_kw DOUBLE PRECISION NOT NULL DEFAULT 0,
    temp_c INTEGER NOT NULL DEFAULT 0,
    blade_position INTEGER NOT NULL DEFAULT 0,
    blade_serial TEXT,
    chassis_serial TEXT,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_storage_blade_chassis_serial ON storage_blade (chassis_serial);
CREATE TABLE IF NOT EXISTS scanned_port (
    ip TEXT NOT NULL,
    port INTEGER NOT NULL,
    protocol TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT '',
    scanned_by TEXT NOT NULL DEFAULT '',
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (ip, port, protocol)
);
"#;

pub async fn connect_pool(config: &Config) -> Result<PgPool> {
    let manager = PgConnectionManager::new(&config.database_options)?;
    let pool = Pool::builder()
        // enough connections for every worker plus the web tier
        .max_size((config.collector.concurrency + 4) as u32)
        .build(manager)
        .await
        .context("failed to build PostgreSQL connection pool")?;

    // One-time connectivity check and schema setup; fail fast if the
    // credentials are wrong.
    match pool.get().await {
        Ok(mut conn) => {
            conn.batch_execute(SCHEMA_DDL)
                .await
                .context("failed to ensure database schema")?;
            info!("database connectivity check succeeded");
        }
        Err(err) => error!(error = ?err, "initial database connectivity check failed"),
    }

    Ok(pool)
}

#[derive(Clone)]
pub struct PgConnectionManager {
    config: PgConfig,
}

impl PgConnectionManager {
    fn new(database_options: &str) -> Result<Self> {
        let config = database_options
            .parse::<PgConfig>()
            .context("invalid database_options")?;
        Ok(Self { config })
    }
}

#[async_trait]
impl ManageConnection for PgConnectionManager {
    type Connection = AsyncPgConnection;
    type Error = anyhow::Error;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let (client, connection) = self.config.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!(%err, "postgres connection error");
            }
        });
        AsyncPgConnection::try_from(client)
            .await
            .map_err(|err| anyhow::anyhow!(err))
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.batch_execute("SELECT 1").await?;
        Ok(())
    }

    fn has_broken(&self, _: &mut Self::Connection) -> bool {
        false
    }
}
