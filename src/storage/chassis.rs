use crate::db::PgPool;
use crate::error::{Error, Result};
use crate::filter::{Filters, Page};
use crate::model::{
    Blade, BladeSnapshot, Chassis, ChassisSnapshot, Fan, Nic, Psu, StorageBlade,
};
use crate::schema::{blade, chassis, disk, fan, nic, psu, storage_blade};
use chrono::Utc;
use diesel::dsl::{count_distinct, sql};
use diesel::prelude::*;
use diesel::sql_types::Bool;
use diesel_async::RunQueryDsl;

const INCLUDES: &[&str] = &["blades", "storage_blades", "nics", "psus", "fans"];

pub struct ChassisStorage {
    pool: PgPool,
}

impl ChassisStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn count(&self, filters: &Filters) -> Result<i64> {
        let clause = filters.build_clause(Chassis::FILTERABLE);
        let mut conn = self.pool.get().await?;
        let mut query = chassis::table.into_boxed();
        if !clause.is_empty() {
            query = query.filter(sql::<Bool>(&clause));
        }
        Ok(query.count().get_result(&mut *conn).await?)
    }

    pub async fn get_all(&self, page: Page) -> Result<(i64, Vec<Chassis>)> {
        let mut conn = self.pool.get().await?;
        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = chassis::table
                .order(chassis::serial.asc())
                .offset(offset)
                .limit(limit)
                .select(Chassis::as_select())
                .load(&mut *conn)
                .await?;
            let count = chassis::table.count().get_result(&mut *conn).await?;
            Ok((count, rows))
        } else {
            let rows = chassis::table
                .order(chassis::serial.asc())
                .select(Chassis::as_select())
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    pub async fn get_all_by_filters(
        &self,
        page: Page,
        filters: &Filters,
    ) -> Result<(i64, Vec<Chassis>)> {
        let clause = filters.build_clause(Chassis::FILTERABLE);
        let mut conn = self.pool.get().await?;

        let mut query = chassis::table.into_boxed().order(chassis::serial.asc());
        if !clause.is_empty() {
            query = query.filter(sql::<Bool>(&clause));
        }

        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = query
                .offset(offset)
                .limit(limit)
                .select(Chassis::as_select())
                .load(&mut *conn)
                .await?;

            let mut count_query = chassis::table.into_boxed();
            if !clause.is_empty() {
                count_query = count_query.filter(sql::<Bool>(&clause));
            }
            let count = count_query.count().get_result(&mut *conn).await?;
            Ok((count, rows))
        } else {
            let rows = query.select(Chassis::as_select()).load(&mut *conn).await?;
            Ok((0, rows))
        }
    }

    /// Eager-loads the named relations for every chassis in the page.
    pub async fn get_all_with_associations(
        &self,
        page: Page,
        include: &[String],
    ) -> Result<(i64, Vec<ChassisSnapshot>)> {
        for relation in include {
            if !INCLUDES.contains(&relation.as_str()) {
                return Err(Error::InvalidInclude(relation.clone()));
            }
        }

        let (count, parents) = self.get_all(page).await?;
        let serials: Vec<Option<&str>> =
            parents.iter().map(|c| Some(c.serial.as_str())).collect();
        let wants = |name: &str| include.iter().any(|r| r == name);

        let mut conn = self.pool.get().await?;
        let blades: Vec<Blade> = if wants("blades") {
            blade::table
                .filter(blade::chassis_serial.eq_any(serials.clone()))
                .order(blade::blade_position.asc())
                .select(Blade::as_select())
                .load(&mut *conn)
                .await?
        } else {
            Vec::new()
        };
        let storage_blades: Vec<StorageBlade> = if wants("storage_blades") {
            storage_blade::table
                .filter(storage_blade::chassis_serial.eq_any(serials.clone()))
                .order(storage_blade::serial.asc())
                .select(StorageBlade::as_select())
                .load(&mut *conn)
                .await?
        } else {
            Vec::new()
        };
        let nics: Vec<Nic> = if wants("nics") {
            nic::table
                .filter(nic::chassis_serial.eq_any(serials.clone()))
                .order(nic::mac_address.asc())
                .select(Nic::as_select())
                .load(&mut *conn)
                .await?
        } else {
            Vec::new()
        };
        let psus: Vec<Psu> = if wants("psus") {
            psu::table
                .filter(psu::chassis_serial.eq_any(serials.clone()))
                .order(psu::serial.asc())
                .select(Psu::as_select())
                .load(&mut *conn)
                .await?
        } else {
            Vec::new()
        };
        let fans: Vec<Fan> = if wants("fans") {
            fan::table
                .filter(fan::chassis_serial.eq_any(serials))
                .order(fan::serial.asc())
                .select(Fan::as_select())
                .load(&mut *conn)
                .await?
        } else {
            Vec::new()
        };

        let snapshots = parents
            .into_iter()
            .map(|c| {
                let owner = Some(c.serial.clone());
                ChassisSnapshot {
                    blades: blades
                        .iter()
                        .filter(|b| b.chassis_serial == owner)
                        .cloned()
                        .map(|b| BladeSnapshot {
                            blade: b,
                            ..BladeSnapshot::default()
                        })
                        .collect(),
                    storage_blades: storage_blades
                        .iter()
                        .filter(|s| s.chassis_serial == owner)
                        .cloned()
                        .collect(),
                    nics: nics
                        .iter()
                        .filter(|n| n.chassis_serial == owner)
                        .cloned()
                        .collect(),
                    psus: psus
                        .iter()
                        .filter(|p| p.chassis_serial == owner)
                        .cloned()
                        .collect(),
                    fans: fans
                        .iter()
                        .filter(|f| f.chassis_serial == owner)
                        .cloned()
                        .collect(),
                    chassis: c,
                }
            })
            .collect();

        Ok((count, snapshots))
    }

    pub async fn get_all_by_blades_id(
        &self,
        page: Page,
        serials: &[String],
    ) -> Result<(i64, Vec<Chassis>)> {
        let mut conn = self.pool.get().await?;
        let join = blade::table.on(blade::chassis_serial.eq(chassis::serial.nullable()));

        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = chassis::table
                .inner_join(join)
                .filter(blade::serial.eq_any(serials))
                .order(chassis::serial.asc())
                .offset(offset)
                .limit(limit)
                .select(Chassis::as_select())
                .distinct()
                .load(&mut *conn)
                .await?;
            let count = chassis::table
                .inner_join(join)
                .filter(blade::serial.eq_any(serials))
                .select(count_distinct(chassis::serial))
                .get_result(&mut *conn)
                .await?;
            Ok((count, rows))
        } else {
            let rows = chassis::table
                .inner_join(join)
                .filter(blade::serial.eq_any(serials))
                .order(chassis::serial.asc())
                .select(Chassis::as_select())
                .distinct()
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    /// One chassis with every direct one-to-many child eager-loaded.
    pub async fn get_one(&self, serial: &str) -> Result<ChassisSnapshot> {
        let mut conn = self.pool.get().await?;
        let row: Chassis = chassis::table
            .find(serial)
            .select(Chassis::as_select())
            .first(&mut *conn)
            .await
            .map_err(|err| match err {
                diesel::result::Error::NotFound => Error::RecordNotFound,
                other => Error::Storage(other),
            })?;

        let blades = blade::table
            .filter(blade::chassis_serial.eq(Some(serial)))
            .order(blade::blade_position.asc())
            .select(Blade::as_select())
            .load(&mut *conn)
            .await?;
        let storage_blades = storage_blade::table
            .filter(storage_blade::chassis_serial.eq(Some(serial)))
            .order(storage_blade::serial.asc())
            .select(StorageBlade::as_select())
            .load(&mut *conn)
            .await?;
        let nics = nic::table
            .filter(nic::chassis_serial.eq(Some(serial)))
            .order(nic::mac_address.asc())
            .select(Nic::as_select())
            .load(&mut *conn)
            .await?;
        let psus = psu::table
            .filter(psu::chassis_serial.eq(Some(serial)))
            .order(psu::serial.asc())
            .select(Psu::as_select())
            .load(&mut *conn)
            .await?;
        let fans = fan::table
            .filter(fan::chassis_serial.eq(Some(serial)))
            .order(fan::serial.asc())
            .select(Fan::as_select())
            .load(&mut *conn)
            .await?;

        Ok(ChassisSnapshot {
            chassis: row,
            blades: blades
                .into_iter()
                .map(|b| BladeSnapshot {
                    blade: b,
                    ..BladeSnapshot::default()
                })
                .collect(),
            storage_blades,
            nics,
            psus,
            fans,
        })
    }

    /// Upserts the chassis and its whole child graph: blades (with their
    /// nics and disks), storage blades, chassis nics, psus and fans. Every
    /// child is stamped with the owner serial before the write.
    pub async fn update_or_create(&self, snapshot: &ChassisSnapshot) -> Result<String> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now();
        let serial = snapshot.chassis.serial.clone();

        let mut row = snapshot.chassis.clone();
        row.updated_at = now;
        diesel::insert_into(chassis::table)
            .values(&row)
            .on_conflict(chassis::serial)
            .do_update()
            .set(&row)
            .execute(&mut *conn)
            .await?;

        for member in &snapshot.blades {
            let mut child = member.blade.clone();
            child.chassis_serial = Some(serial.clone());
            child.updated_at = now;
            diesel::insert_into(blade::table)
                .values(&child)
                .on_conflict(blade::serial)
                .do_update()
                .set(&child)
                .execute(&mut *conn)
                .await?;

            for item in &member.nics {
                let mut n = item.clone();
                n.blade_serial = Some(child.serial.clone());
                n.chassis_serial = None;
                n.discrete_serial = None;
                n.updated_at = now;
                diesel::insert_into(nic::table)
                    .values(&n)
                    .on_conflict(nic::mac_address)
                    .do_update()
                    .set(&n)
                    .execute(&mut *conn)
                    .await?;
            }
            for item in &member.disks {
                let mut d = item.clone();
                d.blade_serial = Some(child.serial.clone());
                d.discrete_serial = None;
                d.updated_at = now;
                diesel::insert_into(disk::table)
                    .values(&d)
                    .on_conflict(disk::serial)
                    .do_update()
                    .set(&d)
                    .execute(&mut *conn)
                    .await?;
            }
        }

        for item in &snapshot.storage_blades {
            let mut s = item.clone();
            s.chassis_serial = Some(serial.clone());
            s.updated_at = now;
            diesel::insert_into(storage_blade::table)
                .values(&s)
                .on_conflict(storage_blade::serial)
                .do_update()
                .set(&s)
                .execute(&mut *conn)
                .await?;
        }

        for item in &snapshot.nics {
            let mut n = item.clone();
            n.chassis_serial = Some(serial.clone());
            n.blade_serial = None;
            n.discrete_serial = None;
            n.updated_at = now;
            diesel::insert_into(nic::table)
                .values(&n)
                .on_conflict(nic::mac_address)
                .do_update()
                .set(&n)
                .execute(&mut *conn)
                .await?;
        }

        for item in &snapshot.psus {
            let mut p = item.clone();
            p.chassis_serial = Some(serial.clone());
            p.discrete_serial = None;
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
            f.chassis_serial = Some(serial.clone());
            f.discrete_serial = None;
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

    /// Deletes blades this chassis no longer hosts.
    pub async fn remove_old_blades_refs(
        &self,
        snapshot: &ChassisSnapshot,
    ) -> Result<(usize, Vec<String>)> {
        let connected: Vec<String> = snapshot
            .blades
            .iter()
            .map(|b| b.blade.serial.clone())
            .collect();
        let serial = snapshot.chassis.serial.as_str();
        let mut conn = self.pool.get().await?;

        let stale: Vec<String> = blade::table
            .filter(blade::chassis_serial.eq(Some(serial)))
            .filter(blade::serial.ne_all(connected))
            .select(blade::serial)
            .load(&mut *conn)
            .await?;

        if !stale.is_empty() {
            diesel::delete(
                blade::table
                    .filter(blade::chassis_serial.eq(Some(serial)))
                    .filter(blade::serial.eq_any(&stale[..])),
            )
            .execute(&mut *conn)
            .await?;
        }

        Ok((stale.len(), stale))
    }

    pub async fn remove_old_storage_blades_refs(
        &self,
        snapshot: &ChassisSnapshot,
    ) -> Result<(usize, Vec<String>)> {
        let connected: Vec<String> = snapshot
            .storage_blades
            .iter()
            .map(|s| s.serial.clone())
            .collect();
        let serial = snapshot.chassis.serial.as_str();
        let mut conn = self.pool.get().await?;

        let stale: Vec<String> = storage_blade::table
            .filter(storage_blade::chassis_serial.eq(Some(serial)))
            .filter(storage_blade::serial.ne_all(connected))
            .select(storage_blade::serial)
            .load(&mut *conn)
            .await?;

        if !stale.is_empty() {
            diesel::delete(
                storage_blade::table
                    .filter(storage_blade::chassis_serial.eq(Some(serial)))
                    .filter(storage_blade::serial.eq_any(&stale[..])),
            )
            .execute(&mut *conn)
            .await?;
        }

        Ok((stale.len(), stale))
    }

    pub async fn remove_old_nics_refs(
        &self,
        snapshot: &ChassisSnapshot,
    ) -> Result<(usize, Vec<String>)> {
        let connected: Vec<String> =
            snapshot.nics.iter().map(|n| n.mac_address.clone()).collect();
        let serial = snapshot.chassis.serial.as_str();
        let mut conn = self.pool.get().await?;

        let stale: Vec<String> = nic::table
            .filter(nic::chassis_serial.eq(Some(serial)))
            .filter(nic::mac_address.ne_all(connected))
            .select(nic::mac_address)
            .load(&mut *conn)
            .await?;

        if !stale.is_empty() {
            diesel::delete(
                nic::table
                    .filter(nic::chassis_serial.eq(Some(serial)))
                    .filter(nic::mac_address.eq_any(&stale[..])),
            )
            .execute(&mut *conn)
            .await?;
        }

        Ok((stale.len(), stale))
    }

    /// Compares PSU serials against the snapshot's PSU serial set.
    pub async fn remove_old_psus_refs(
        &self,
        snapshot: &ChassisSnapshot,
    ) -> Result<(usize, Vec<String>)> {
        let connected: Vec<String> = snapshot.psus.iter().map(|p| p.serial.clone()).collect();
        let serial = snapshot.chassis.serial.as_str();
        let mut conn = self.pool.get().await?;

        let stale: Vec<String> = psu::table
            .filter(psu::chassis_serial.eq(Some(serial)))
            .filter(psu::serial.ne_all(connected))
            .select(psu::serial)
            .load(&mut *conn)
            .await?;

        if !stale.is_empty() {
            diesel::delete(
                psu::table
                    .filter(psu::chassis_serial.eq(Some(serial)))
                    .filter(psu::serial.eq_any(&stale[..])),
            )
            .execute(&mut *conn)
            .await?;
        }

        Ok((stale.len(), stale))
    }

    pub async fn remove_old_fans_refs(
        &self,
        snapshot: &ChassisSnapshot,
    ) -> Result<(usize, Vec<String>)> {
        let connected: Vec<String> = snapshot.fans.iter().map(|f| f.serial.clone()).collect();
        let serial = snapshot.chassis.serial.as_str();
        let mut conn = self.pool.get().await?;

        let stale: Vec<String> = fan::table
            .filter(fan::chassis_serial.eq(Some(serial)))
            .filter(fan::serial.ne_all(connected))
            .select(fan::serial)
            .load(&mut *conn)
            .await?;

        if !stale.is_empty() {
            diesel::delete(
                fan::table
                    .filter(fan::chassis_serial.eq(Some(serial)))
                    .filter(fan::serial.eq_any(&stale[..])),
            )
            .execute(&mut *conn)
            .await?;
        }

        Ok((stale.len(), stale))
    }
}
