use crate::db::PgPool;
use crate::error::{Error, Result};
use crate::filter::{Filters, Page};
use crate::model::ScannedPort;
use crate::schema::scanned_port;
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::Bool;
use diesel_async::RunQueryDsl;

/// Reachability flags derived from the port-scan table for one BMC address.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reachability {
    pub web: bool,
    pub ssh: bool,
    pub ipmi: bool,
}

pub struct ScannedPortStorage {
    pool: PgPool,
}

impl ScannedPortStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn count(&self, filters: &Filters) -> Result<i64> {
        let clause = filters.build_clause(ScannedPort::FILTERABLE);
        let mut conn = self.pool.get().await?;
        let mut query = scanned_port::table.into_boxed();
        if !clause.is_empty() {
            query = query.filter(sql::<Bool>(&clause));
        }
        Ok(query.count().get_result(&mut *conn).await?)
    }

    pub async fn get_all(&self, page: Page) -> Result<(i64, Vec<ScannedPort>)> {
        let mut conn = self.pool.get().await?;
        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = scanned_port::table
                .order((
                    scanned_port::ip.asc(),
                    scanned_port::port.asc(),
                    scanned_port::protocol.asc(),
                ))
                .offset(offset)
                .limit(limit)
                .select(ScannedPort::as_select())
                .load(&mut *conn)
                .await?;
            let count = scanned_port::table.count().get_result(&mut *conn).await?;
            Ok((count, rows))
        } else {
            let rows = scanned_port::table
                .order((
                    scanned_port::ip.asc(),
                    scanned_port::port.asc(),
                    scanned_port::protocol.asc(),
                ))
                .select(ScannedPort::as_select())
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    pub async fn get_all_by_filters(
        &self,
        page: Page,
        filters: &Filters,
    ) -> Result<(i64, Vec<ScannedPort>)> {
        let clause = filters.build_clause(ScannedPort::FILTERABLE);
        let mut conn = self.pool.get().await?;

        let mut query = scanned_port::table
            .into_boxed()
            .order((scanned_port::ip.asc(), scanned_port::port.asc()));
        if !clause.is_empty() {
            query = query.filter(sql::<Bool>(&clause));
        }

        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = query
                .offset(offset)
                .limit(limit)
                .select(ScannedPort::as_select())
                .load(&mut *conn)
                .await?;

            let mut count_query = scanned_port::table.into_boxed();
            if !clause.is_empty() {
                count_query = count_query.filter(sql::<Bool>(&clause));
            }
            let count = count_query.count().get_result(&mut *conn).await?;
            Ok((count, rows))
        } else {
            let rows = query
                .select(ScannedPort::as_select())
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    /// Key format `ip-port-protocol`, as emitted in the JSON:API ids.
    pub async fn get_one(&self, id: &str) -> Result<ScannedPort> {
        let mut parts = id.rsplitn(3, '-');
        let protocol = parts.next().unwrap_or_default().to_string();
        let port: i32 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or(Error::RecordNotFound)?;
        let ip = parts.next().unwrap_or_default().to_string();

        let mut conn = self.pool.get().await?;
        scanned_port::table
            .find((ip, port, protocol))
            .select(ScannedPort::as_select())
            .first(&mut *conn)
            .await
            .map_err(|err| match err {
                diesel::result::Error::NotFound => Error::RecordNotFound,
                other => Error::Storage(other),
            })
    }

    /// Every host with 443/tcp open: the candidate set for the `all`
    /// collection sentinel.
    pub async fn open_https_hosts(&self) -> Result<Vec<String>> {
        let mut conn = self.pool.get().await?;
        Ok(scanned_port::table
            .filter(scanned_port::port.eq(443))
            .filter(scanned_port::protocol.eq("tcp"))
            .filter(scanned_port::state.eq("open"))
            .order(scanned_port::ip.asc())
            .select(scanned_port::ip)
            .load(&mut *conn)
            .await?)
    }

    pub async fn has_open_https(&self, ip: &str) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let count: i64 = scanned_port::table
            .filter(scanned_port::ip.eq(ip))
            .filter(scanned_port::port.eq(443))
            .filter(scanned_port::protocol.eq("tcp"))
            .filter(scanned_port::state.eq("open"))
            .count()
            .get_result(&mut *conn)
            .await?;
        Ok(count > 0)
    }

    /// Reachability flags for a BMC address: 443/tcp (web), 22/tcp (ssh)
    /// and 623/ipmi.
    pub async fn reachability(&self, ip: &str) -> Result<Reachability> {
        let mut conn = self.pool.get().await?;
        let open: Vec<(i32, String)> = scanned_port::table
            .filter(scanned_port::ip.eq(ip))
            .filter(scanned_port::state.eq("open"))
            .select((scanned_port::port, scanned_port::protocol))
            .load(&mut *conn)
            .await?;

        let mut flags = Reachability::default();
        for (port, protocol) in open {
            match (port, protocol.as_str()) {
                (443, "tcp") => flags.web = true,
                (22, "tcp") => flags.ssh = true,
                (623, "ipmi") | (623, "udp") => flags.ipmi = true,
                _ => {}
            }
        }
        Ok(flags)
    }
}
