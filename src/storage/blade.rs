use crate::db::PgPool;
use crate::error::{Error, Result};
use crate::filter::{Filters, Page};
use crate::model::{Blade, BladeSnapshot, Disk, Nic};
use crate::schema::{blade, disk, nic, storage_blade};
use chrono::Utc;
use diesel::dsl::{count_distinct, sql};
use diesel::prelude::*;
use diesel::sql_types::Bool;
use diesel_async::RunQueryDsl;

const INCLUDES: &[&str] = &["nics", "disks"];

pub struct BladeStorage {
    pool: PgPool,
}

impl BladeStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn count(&self, filters: &Filters) -> Result<i64> {
        let clause = filters.build_clause(Blade::FILTERABLE);
        let mut conn = self.pool.get().await?;
        let mut query = blade::table.into_boxed();
        if !clause.is_empty() {
            query = query.filter(sql::<Bool>(&clause));
        }
        Ok(query.count().get_result(&mut *conn).await?)
    }

    pub async fn get_all(&self, page: Page) -> Result<(i64, Vec<Blade>)> {
        let mut conn = self.pool.get().await?;
        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = blade::table
                .order(blade::serial.asc())
                .offset(offset)
                .limit(limit)
                .select(Blade::as_select())
                .load(&mut *conn)
                .await?;
            let count = blade::table.count().get_result(&mut *conn).await?;
            Ok((count, rows))
        } else {
            let rows = blade::table
                .order(blade::serial.asc())
                .select(Blade::as_select())
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    pub async fn get_all_by_filters(
        &self,
        page: Page,
        filters: &Filters,
    ) -> Result<(i64, Vec<Blade>)> {
        let clause = filters.build_clause(Blade::FILTERABLE);
        let mut conn = self.pool.get().await?;

        let mut query = blade::table.into_boxed().order(blade::serial.asc());
        if !clause.is_empty() {
            query = query.filter(sql::<Bool>(&clause));
        }

        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = query
                .offset(offset)
                .limit(limit)
                .select(Blade::as_select())
                .load(&mut *conn)
                .await?;

            let mut count_query = blade::table.into_boxed();
            if !clause.is_empty() {
                count_query = count_query.filter(sql::<Bool>(&clause));
            }
            let count = count_query.count().get_result(&mut *conn).await?;
            Ok((count, rows))
        } else {
            let rows = query.select(Blade::as_select()).load(&mut *conn).await?;
            Ok((0, rows))
        }
    }

    /// Eager-loads the named relations for every blade in the page.
    pub async fn get_all_with_associations(
        &self,
        page: Page,
        include: &[String],
    ) -> Result<(i64, Vec<BladeSnapshot>)> {
        for relation in include {
            if !INCLUDES.contains(&relation.as_str()) {
                return Err(Error::InvalidInclude(relation.clone()));
            }
        }

        let (count, blades) = self.get_all(page).await?;
        let serials: Vec<Option<&str>> =
            blades.iter().map(|b| Some(b.serial.as_str())).collect();

        let mut conn = self.pool.get().await?;
        let nics: Vec<Nic> = if include.iter().any(|r| r == "nics") {
            nic::table
                .filter(nic::blade_serial.eq_any(serials.clone()))
                .order(nic::mac_address.asc())
                .select(Nic::as_select())
                .load(&mut *conn)
                .await?
        } else {
            Vec::new()
        };
        let disks: Vec<Disk> = if include.iter().any(|r| r == "disks") {
            disk::table
                .filter(disk::blade_serial.eq_any(serials))
                .order(disk::serial.asc())
                .select(Disk::as_select())
                .load(&mut *conn)
                .await?
        } else {
            Vec::new()
        };

        let snapshots = blades
            .into_iter()
            .map(|b| {
                let owner = Some(b.serial.clone());
                BladeSnapshot {
                    nics: nics
                        .iter()
                        .filter(|n| n.blade_serial == owner)
                        .cloned()
                        .collect(),
                    disks: disks
                        .iter()
                        .filter(|d| d.blade_serial == owner)
                        .cloned()
                        .collect(),
                    blade: b,
                }
            })
            .collect();

        Ok((count, snapshots))
    }

    pub async fn get_all_by_chassis_id(
        &self,
        page: Page,
        serials: &[String],
    ) -> Result<(i64, Vec<Blade>)> {
        let owners: Vec<Option<&str>> = serials.iter().map(|s| Some(s.as_str())).collect();
        let mut conn = self.pool.get().await?;

        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = blade::table
                .filter(blade::chassis_serial.eq_any(owners.clone()))
                .order(blade::serial.asc())
                .offset(offset)
                .limit(limit)
                .select(Blade::as_select())
                .load(&mut *conn)
                .await?;
            let count = blade::table
                .filter(blade::chassis_serial.eq_any(owners))
                .count()
                .get_result(&mut *conn)
                .await?;
            Ok((count, rows))
        } else {
            let rows = blade::table
                .filter(blade::chassis_serial.eq_any(owners))
                .order(blade::serial.asc())
                .select(Blade::as_select())
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    pub async fn get_all_by_nics_id(
        &self,
        page: Page,
        mac_addresses: &[String],
    ) -> Result<(i64, Vec<Blade>)> {
        let mut conn = self.pool.get().await?;
        let join = nic::table.on(nic::blade_serial.eq(blade::serial.nullable()));

        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = blade::table
                .inner_join(join)
                .filter(nic::mac_address.eq_any(mac_addresses))
                .order(blade::serial.asc())
                .offset(offset)
                .limit(limit)
                .select(Blade::as_select())
                .distinct()
                .load(&mut *conn)
                .await?;
            let count = blade::table
                .inner_join(join)
                .filter(nic::mac_address.eq_any(mac_addresses))
                .select(count_distinct(blade::serial))
                .get_result(&mut *conn)
                .await?;
            Ok((count, rows))
        } else {
            let rows = blade::table
                .inner_join(join)
                .filter(nic::mac_address.eq_any(mac_addresses))
                .order(blade::serial.asc())
                .select(Blade::as_select())
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
    ) -> Result<(i64, Vec<Blade>)> {
        let mut conn = self.pool.get().await?;
        let join = disk::table.on(disk::blade_serial.eq(blade::serial.nullable()));

        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = blade::table
                .inner_join(join)
                .filter(disk::serial.eq_any(serials))
                .order(blade::serial.asc())
                .offset(offset)
                .limit(limit)
                .select(Blade::as_select())
                .distinct()
                .load(&mut *conn)
                .await?;
            let count = blade::table
                .inner_join(join)
                .filter(disk::serial.eq_any(serials))
                .select(count_distinct(blade::serial))
                .get_result(&mut *conn)
                .await?;
            Ok((count, rows))
        } else {
            let rows = blade::table
                .inner_join(join)
                .filter(disk::serial.eq_any(serials))
                .order(blade::serial.asc())
                .select(Blade::as_select())
                .distinct()
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    pub async fn get_all_by_storage_blades_id(
        &self,
        page: Page,
        serials: &[String],
    ) -> Result<(i64, Vec<Blade>)> {
        let mut conn = self.pool.get().await?;
        let join =
            storage_blade::table.on(storage_blade::blade_serial.eq(blade::serial.nullable()));

        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = blade::table
                .inner_join(join)
                .filter(storage_blade::serial.eq_any(serials))
                .order(blade::serial.asc())
                .offset(offset)
                .limit(limit)
                .select(Blade::as_select())
                .distinct()
                .load(&mut *conn)
                .await?;
            let count = blade::table
                .inner_join(join)
                .filter(storage_blade::serial.eq_any(serials))
                .select(count_distinct(blade::serial))
                .get_result(&mut *conn)
                .await?;
            Ok((count, rows))
        } else {
            let rows = blade::table
                .inner_join(join)
                .filter(storage_blade::serial.eq_any(serials))
                .order(blade::serial.asc())
                .select(Blade::as_select())
                .distinct()
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    /// One blade with its direct children eager-loaded.
    pub async fn get_one(&self, serial: &str) -> Result<BladeSnapshot> {
        let mut conn = self.pool.get().await?;
        let row: Blade = blade::table
            .find(serial)
            .select(Blade::as_select())
            .first(&mut *conn)
            .await
            .map_err(|err| match err {
                diesel::result::Error::NotFound => Error::RecordNotFound,
                other => Error::Storage(other),
            })?;

        let nics = nic::table
            .filter(nic::blade_serial.eq(Some(serial)))
            .order(nic::mac_address.asc())
            .select(Nic::as_select())
            .load(&mut *conn)
            .await?;
        let disks = disk::table
            .filter(disk::blade_serial.eq(Some(serial)))
            .order(disk::serial.asc())
            .select(Disk::as_select())
            .load(&mut *conn)
            .await?;

        Ok(BladeSnapshot {
            blade: row,
            nics,
            disks,
        })
    }

    /// Upserts the blade and every child in the snapshot, stamping children
    /// with the owner serial.
    pub async fn update_or_create(&self, snapshot: &BladeSnapshot) -> Result<String> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now();

        let mut row = snapshot.blade.clone();
        row.updated_at = now;
        diesel::insert_into(blade::table)
            .values(&row)
            .on_conflict(blade::serial)
            .do_update()
            .set(&row)
            .execute(&mut *conn)
            .await?;

        for item in &snapshot.nics {
            let mut child = item.clone();
            child.blade_serial = Some(row.serial.clone());
            child.chassis_serial = None;
            child.discrete_serial = None;
            child.updated_at = now;
            diesel::insert_into(nic::table)
                .values(&child)
                .on_conflict(nic::mac_address)
                .do_update()
                .set(&child)
                .execute(&mut *conn)
                .await?;
        }

        for item in &snapshot.disks {
            let mut child = item.clone();
            child.blade_serial = Some(row.serial.clone());
            child.discrete_serial = None;
            child.updated_at = now;
            diesel::insert_into(disk::table)
                .values(&child)
                .on_conflict(disk::serial)
                .do_update()
                .set(&child)
                .execute(&mut *conn)
                .await?;
        }

        Ok(row.serial)
    }

    /// Deletes persisted nics the fresh snapshot no longer lists.
    pub async fn remove_old_nics_refs(
        &self,
        snapshot: &BladeSnapshot,
    ) -> Result<(usize, Vec<String>)> {
        let connected: Vec<String> =
            snapshot.nics.iter().map(|n| n.mac_address.clone()).collect();
        let serial = snapshot.blade.serial.as_str();
        let mut conn = self.pool.get().await?;

        let stale: Vec<String> = nic::table
            .filter(nic::blade_serial.eq(Some(serial)))
            .filter(nic::mac_address.ne_all(connected))
            .select(nic::mac_address)
            .load(&mut *conn)
            .await?;

        if !stale.is_empty() {
            diesel::delete(
                nic::table
                    .filter(nic::blade_serial.eq(Some(serial)))
                    .filter(nic::mac_address.eq_any(&stale[..])),
            )
            .execute(&mut *conn)
            .await?;
        }

        Ok((stale.len(), stale))
    }

    /// Deletes persisted disks the fresh snapshot no longer lists.
    pub async fn remove_old_disks_refs(
        &self,
        snapshot: &BladeSnapshot,
    ) -> Result<(usize, Vec<String>)> {
        let connected: Vec<String> = snapshot.disks.iter().map(|d| d.serial.clone()).collect();
        let serial = snapshot.blade.serial.as_str();
        let mut conn = self.pool.get().await?;

        let stale: Vec<String> = disk::table
            .filter(disk::blade_serial.eq(Some(serial)))
            .filter(disk::serial.ne_all(connected))
            .select(disk::serial)
            .load(&mut *conn)
            .await?;

        if !stale.is_empty() {
            diesel::delete(
                disk::table
                    .filter(disk::blade_serial.eq(Some(serial)))
                    .filter(disk::serial.eq_any(&stale[..])),
            )
            .execute(&mut *conn)
            .await?;
        }

        Ok((stale.len(), stale))
    }
}
