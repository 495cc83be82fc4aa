use crate::db::PgPool;
use crate::error::{Error, Result};
use crate::filter::{Filters, Page};
use crate::model::{Discrete, DiscreteSnapshot, Disk, Fan, Nic, Psu};
use crate::schema::{discrete, disk, fan, nic, psu};
use chrono::Utc;
use diesel::dsl::{count_distinct, sql};
use diesel::prelude::*;
use diesel::sql_types::Bool;
use diesel_async::RunQueryDsl;

const INCLUDES: &[&str] = &["nics", "disks", "psus", "fans"];

pub struct DiscreteStorage {
    pool: PgPool,
}

impl DiscreteStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn count(&self, filters: &Filters) -> Result<i64> {
        let clause = filters.build_clause(Discrete::FILTERABLE);
        let mut conn = self.pool.get().await?;
        let mut query = discrete::table.into_boxed();
        if !clause.is_empty() {
            query = query.filter(sql::<Bool>(&clause));
        }
        Ok(query.count().get_result(&mut *conn).await?)
    }

    pub async fn get_all(&self, page: Page) -> Result<(i64, Vec<Discrete>)> {
        let mut conn = self.pool.get().await?;
        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = discrete::table
                .order(discrete::serial.asc())
                .offset(offset)
                .limit(limit)
                .select(Discrete::as_select())
                .load(&mut *conn)
                .await?;
            let count = discrete::table.count().get_result(&mut *conn).await?;
            Ok((count, rows))
        } else {
            let rows = discrete::table
                .order(discrete::serial.asc())
                .select(Discrete::as_select())
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    pub async fn get_all_by_filters(
        &self,
        page: Page,
        filters: &Filters,
    ) -> Result<(i64, Vec<Discrete>)> {
        let clause = filters.build_clause(Discrete::FILTERABLE);
        let mut conn = self.pool.get().await?;

        let mut query = discrete::table.into_boxed().order(discrete::serial.asc());
        if !clause.is_empty() {
            query = query.filter(sql::<Bool>(&clause));
        }

        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = query
                .offset(offset)
                .limit(limit)
                .select(Discrete::as_select())
                .load(&mut *conn)
                .await?;

            let mut count_query = discrete::table.into_boxed();
            if !clause.is_empty() {
                count_query = count_query.filter(sql::<Bool>(&clause));
            }
            let count = count_query.count().get_result(&mut *conn).await?;
            Ok((count, rows))
        } else {
            let rows = query.select(Discrete::as_select()).load(&mut *conn).await?;
            Ok((0, rows))
        }
    }

    pub async fn get_all_with_associations(
        &self,
        page: Page,
        include: &[String],
    ) -> Result<(i64, Vec<DiscreteSnapshot>)> {
        for relation in include {
            if !INCLUDES.contains(&relation.as_str()) {
                return Err(Error::InvalidInclude(relation.clone()));
            }
        }

        let (count, parents) = self.get_all(page).await?;
        let serials: Vec<Option<&str>> =
            parents.iter().map(|d| Some(d.serial.as_str())).collect();
        let wants = |name: &str| include.iter().any(|r| r == name);

        let mut conn = self.pool.get().await?;
        let nics: Vec<Nic> = if wants("nics") {
            nic::table
                .filter(nic::discrete_serial.eq_any(serials.clone()))
                .order(nic::mac_address.asc())
                .select(Nic::as_select())
                .load(&mut *conn)
                .await?
        } else {
            Vec::new()
        };
        let disks: Vec<Disk> = if wants("disks") {
            disk::table
                .filter(disk::discrete_serial.eq_any(serials.clone()))
                .order(disk::serial.asc())
                .select(Disk::as_select())
                .load(&mut *conn)
                .await?
        } else {
            Vec::new()
        };
        let psus: Vec<Psu> = if wants("psus") {
            psu::table
                .filter(psu::discrete_serial.eq_any(serials.clone()))
                .order(psu::serial.asc())
                .select(Psu::as_select())
                .load(&mut *conn)
                .await?
        } else {
            Vec::new()
        };
        let fans: Vec<Fan> = if wants("fans") {
            fan::table
                .filter(fan::discrete_serial.eq_any(serials))
                .order(fan::serial.asc())
                .select(Fan::as_select())
                .load(&mut *conn)
                .await?
        } else {
            Vec::new()
        };

        let snapshots = parents
            .into_iter()
            .map(|d| {
                let owner = Some(d.serial.clone());
                DiscreteSnapshot {
                    nics: nics
                        .iter()
                        .filter(|n| n.discrete_serial == owner)
                        .cloned()
                        .collect(),
                    disks: disks
                        .iter()
                        .filter(|x| x.discrete_serial == owner)
                        .cloned()
                        .collect(),
                    psus: psus
                        .iter()
                        .filter(|p| p.discrete_serial == owner)
                        .cloned()
                        .collect(),
                    fans: fans
                        .iter()
                        .filter(|f| f.discrete_serial == owner)
                        .cloned()
                        .collect(),
                    discrete: d,
                }
            })
            .collect();

        Ok((count, snapshots))
    }

    pub async fn get_all_by_nics_id(
        &self,
        page: Page,
        mac_addresses: &[String],
    ) -> Result<(i64, Vec<Discrete>)> {
        let mut conn = self.pool.get().await?;
        let join = nic::table.on(nic::discrete_serial.eq(discrete::serial.nullable()));

        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = discrete::table
                .inner_join(join)
                .filter(nic::mac_address.eq_any(mac_addresses))
                .order(discrete::serial.asc())
                .offset(offset)
                .limit(limit)
                .select(Discrete::as_select())
                .distinct()
                .load(&mut *conn)
                .await?;
            let count = discrete::table
                .inner_join(join)
                .filter(nic::mac_address.eq_any(mac_addresses))
                .select(count_distinct(discrete::serial))
                .get_result(&mut *conn)
                .await?;
            Ok((count, rows))
        } else {
            let rows = discrete::table
                .inner_join(join)
                .filter(nic::mac_address.eq_any(mac_addresses))
                .order(discrete::serial.asc())
                .select(Discrete::as_select())
                .distinct()
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    pub async fn get_all_by_disks_id(
        &self,
        page: Page,
        serials: &[String],
    ) -> Result<(i64, Vec<Discrete>)> {
        let mut conn = self.pool.get().await?;
        let join = disk::table.on(disk::discrete_serial.eq(discrete::serial.nullable()));

        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = discrete::table
                .inner_join(join)
                .filter(disk::serial.eq_any(serials))
                .order(discrete::serial.asc())
                .offset(offset)
                .limit(limit)
                .select(Discrete::as_select())
                .distinct()
                .load(&mut *conn)
                .await?;
            let count = discrete::table
                .inner_join(join)
                .filter(disk::serial.eq_any(serials))
                .select(count_distinct(discrete::serial))
                .get_result(&mut *conn)
                .await?;
            Ok((count, rows))
        } else {
            let rows = discrete::table
                .inner_join(join)
                .filter(disk::serial.eq_any(serials))
                .order(discrete::serial.asc())
                .select(Discrete::as_select())
                .distinct()
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    pub async fn get_one(&self, serial: &str) -> Result<DiscreteSnapshot> {
        let mut conn = self.pool.get().await?;
        let row: Discrete = discrete::table
            .find(serial)
            .select(Discrete::as_select())
            .first(&mut *conn)
            .await
            .map_err(|err| match err {
                diesel::result::Error::NotFound => Error::RecordNotFound,
                other => Error::Storage(other),
            })?;

        let nics = nic::table
            .filter(nic::discrete_serial.eq(Some(serial)))
            .order(nic::mac_address.asc())
            .select(Nic::as_select())
            .load(&mut *conn)
            .await?;
        let disks = disk::table
            .filter(disk::discrete_serial.eq(Some(serial)))
            .order(disk::serial.asc())
            .select(Disk::as_select())
            .load(&mut *conn)
            .await?;
        let psus = psu::table
            .filter(psu::discrete_serial.eq(Some(serial)))
            .order(psu::serial.asc())
            .select(Psu::as_select())
            .load(&mut *conn)
            .await?;
        let fans = fan::table
            .filter(fan::discrete_serial.eq(Some(serial)))
            .order(fan::serial.asc())
            .select(Fan::as_select())
            .load(&mut *conn)
            .await?;

        Ok(DiscreteSnapshot {
            discrete: row,
            nics,
            disks,
            psus,
            fans,
        })
    }

    pub async fn update_or_create(&self, snapshot: &DiscreteSnapshot) -> Result<String> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now();
        let serial = snapshot.discrete.serial.clone();

        let mut row = snapshot.discrete.clone();
        row.updated_at = now;
        diesel::insert_into(discrete::table)
            .values(&row)
            .on_conflict(discrete::serial)
            .do_update()
            .set(&row)
            .execute(&mut *conn)
            .await?;

        for item in &snapshot.nics {
            let mut n = item.clone();
            n.discrete_serial = Some(serial.clone());
            n.blade_serial = None;
            n.chassis_serial = None;
            n.updated_at = now;
            diesel::insert_into(nic::table)
                .values(&n)
                .on_conflict(nic::mac_address)
                .do_update()
                .set(&n)
                .execute(&mut *conn)
                .await?;
        }
        for item in &snapshot.disks {
            let mut d = item.clone();
            d.discrete_serial = Some(serial.clone());
            d.blade_serial = None;
            d.updated_at = now;
            diesel::insert_into(disk::table)
                .values(&d)
                .on_conflict(disk::serial)
                .do_update()
                .set(&d)
                .execute(&mut *conn)
                .await?;
        }
        for item in &snapshot.psus {
            let mut p = item.clone();
            p.discrete_serial = Some(serial.clone());
            p.chassis_serial = None;
            p.updated_at = now;
            diesel::insert_into(psu::table)
                .values(&p)
                .on_conflict(psu::serial)
                .do_update()
                .set(&p)
                .execute(&mut *conn)
                .await?;
        }
        for item in &snapshot.fans {
            let mut f = item.clone();
            f.discrete_serial = Some(serial.clone());
            f.chassis_serial = None;
            f.updated_at = now;
            diesel::insert_into(fan::table)
                .values(&f)
                .on_conflict(fan::serial)
                .do_update()
                .set(&f)
                .execute(&mut *conn)
                .await?;
        }

        Ok(serial)
    }

    pub async fn remove_old_nics_refs(
        &self,
        snapshot: &DiscreteSnapshot,
    ) -> Result<(usize, Vec<String>)> {
        let connected: Vec<String> =
            snapshot.nics.iter().map(|n| n.mac_address.clone()).collect();
        let serial = snapshot.discrete.serial.as_str();
        let mut conn = self.pool.get().await?;

        let stale: Vec<String> = nic::table
            .filter(nic::discrete_serial.eq(Some(serial)))
            .filter(nic::mac_address.ne_all(connected))
            .select(nic::mac_address)
            .load(&mut *conn)
            .await?;

        if !stale.is_empty() {
            diesel::delete(
                nic::table
                    .filter(nic::discrete_serial.eq(Some(serial)))
                    .filter(nic::mac_address.eq_any(&stale[..])),
            )
            .execute(&mut *conn)
            .await?;
        }

        Ok((stale.len(), stale))
    }

    pub async fn remove_old_disks_refs(
        &self,
        snapshot: &DiscreteSnapshot,
    ) -> Result<(usize, Vec<String>)> {
        let connected: Vec<String> = snapshot.disks.iter().map(|d| d.serial.clone()).collect();
        let serial = snapshot.discrete.serial.as_str();
        let mut conn = self.pool.get().await?;

        let stale: Vec<String> = disk::table
            .filter(disk::discrete_serial.eq(Some(serial)))
            .filter(disk::serial.ne_all(connected))
            .select(disk::serial)
            .load(&mut *conn)
            .await?;

        if !stale.is_empty() {
            diesel::delete(
                disk::table
                    .filter(disk::discrete_serial.eq(Some(serial)))
                    .filter(disk::serial.eq_any(&stale[..])),
            )
            .execute(&mut *conn)
            .await?;
        }

        Ok((stale.len(), stale))
    }

    pub async fn remove_old_psus_refs(
        &self,
        snapshot: &DiscreteSnapshot,
    ) -> Result<(usize, Vec<String>)> {
        let connected: Vec<String> = snapshot.psus.iter().map(|p| p.serial.clone()).collect();
        let serial = snapshot.discrete.serial.as_str();
        let mut conn = self.pool.get().await?;

        let stale: Vec<String> = psu::table
            .filter(psu::discrete_serial.eq(Some(serial)))
            .filter(psu::serial.ne_all(connected))
            .select(psu::serial)
            .load(&mut *conn)
            .await?;

        if !stale.is_empty() {
            diesel::delete(
                psu::table
                    .filter(psu::discrete_serial.eq(Some(serial)))
                    .filter(psu::serial.eq_any(&stale[..])),
            )
            .execute(&mut *conn)
            .await?;
        }

        Ok((stale.len(), stale))
    }

    pub async fn remove_old_fans_refs(
        &self,
        snapshot: &DiscreteSnapshot,
    ) -> Result<(usize, Vec<String>)> {
        let connected: Vec<String> = snapshot.fans.iter().map(|f| f.serial.clone()).collect();
        let serial = snapshot.discrete.serial.as_str();
        let mut conn = self.pool.get().await?;

        let stale: Vec<String> = fan::table
            .filter(fan::discrete_serial.eq(Some(serial)))
            .filter(fan::serial.ne_all(connected))
            .select(fan::serial)
            .load(&mut *conn)
            .await?;

        if !stale.is_empty() {
            diesel::delete(
                fan::table
                    .filter(fan::discrete_serial.eq(Some(serial)))
                    .filter(fan::serial.eq_any(&stale[..])),
            )
            .execute(&mut *conn)
            .await?;
        }

        Ok((stale.len(), stale))
    }
}
