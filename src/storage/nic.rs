use crate::db::PgPool;
use crate::error::{Error, Result};
use crate::filter::{Filters, Page};
use crate::model::Nic;
use crate::schema::nic;
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::Bool;
use diesel_async::RunQueryDsl;

pub struct NicStorage {
    pool: PgPool,
}

impl NicStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn count(&self, filters: &Filters) -> Result<i64> {
        let clause = filters.build_clause(Nic::FILTERABLE);
        let mut conn = self.pool.get().await?;
        let mut query = nic::table.into_boxed();
        if !clause.is_empty() {
            query = query.filter(sql::<Bool>(&clause));
        }
        Ok(query.count().get_result(&mut *conn).await?)
    }

    pub async fn get_all(&self, page: Page) -> Result<(i64, Vec<Nic>)> {
        let mut conn = self.pool.get().await?;
        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = nic::table
                .order(nic::mac_address.asc())
                .offset(offset)
                .limit(limit)
                .select(Nic::as_select())
                .load(&mut *conn)
                .await?;
            let count = nic::table.count().get_result(&mut *conn).await?;
            Ok((count, rows))
        } else {
            let rows = nic::table
                .order(nic::mac_address.asc())
                .select(Nic::as_select())
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    pub async fn get_all_by_filters(
        &self,
        page: Page,
        filters: &Filters,
    ) -> Result<(i64, Vec<Nic>)> {
        let clause = filters.build_clause(Nic::FILTERABLE);
        let mut conn = self.pool.get().await?;

        let mut query = nic::table.into_boxed().order(nic::mac_address.asc());
        if !clause.is_empty() {
            query = query.filter(sql::<Bool>(&clause));
        }

        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = query
                .offset(offset)
                .limit(limit)
                .select(Nic::as_select())
                .load(&mut *conn)
                .await?;

            let mut count_query = nic::table.into_boxed();
            if !clause.is_empty() {
                count_query = count_query.filter(sql::<Bool>(&clause));
            }
            let count = count_query.count().get_result(&mut *conn).await?;
            Ok((count, rows))
        } else {
            let rows = query.select(Nic::as_select()).load(&mut *conn).await?;
            Ok((0, rows))
        }
    }

    pub async fn get_all_by_blade_id(
        &self,
        page: Page,
        serials: &[String],
    ) -> Result<(i64, Vec<Nic>)> {
        let owners: Vec<Option<&str>> = serials.iter().map(|s| Some(s.as_str())).collect();
        let mut conn = self.pool.get().await?;

        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = nic::table
                .filter(nic::blade_serial.eq_any(owners.clone()))
                .order(nic::mac_address.asc())
                .offset(offset)
                .limit(limit)
                .select(Nic::as_select())
                .load(&mut *conn)
                .await?;
            let count = nic::table
                .filter(nic::blade_serial.eq_any(owners))
                .count()
                .get_result(&mut *conn)
                .await?;
            Ok((count, rows))
        } else {
            let rows = nic::table
                .filter(nic::blade_serial.eq_any(owners))
                .order(nic::mac_address.asc())
                .select(Nic::as_select())
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    pub async fn get_all_by_chassis_id(
        &self,
        page: Page,
        serials: &[String],
    ) -> Result<(i64, Vec<Nic>)> {
        let owners: Vec<Option<&str>> = serials.iter().map(|s| Some(s.as_str())).collect();
        let mut conn = self.pool.get().await?;

        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = nic::table
                .filter(nic::chassis_serial.eq_any(owners.clone()))
                .order(nic::mac_address.asc())
                .offset(offset)
                .limit(limit)
                .select(Nic::as_select())
                .load(&mut *conn)
                .await?;
            let count = nic::table
                .filter(nic::chassis_serial.eq_any(owners))
                .count()
                .get_result(&mut *conn)
                .await?;
            Ok((count, rows))
        } else {
            let rows = nic::table
                .filter(nic::chassis_serial.eq_any(owners))
                .order(nic::mac_address.asc())
                .select(Nic::as_select())
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    pub async fn get_all_by_discrete_id(
        &self,
        page: Page,
        serials: &[String],
    ) -> Result<(i64, Vec<Nic>)> {
        let owners: Vec<Option<&str>> = serials.iter().map(|s| Some(s.as_str())).collect();
        let mut conn = self.pool.get().await?;

        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = nic::table
                .filter(nic::discrete_serial.eq_any(owners.clone()))
                .order(nic::mac_address.asc())
                .offset(offset)
                .limit(limit)
                .select(Nic::as_select())
                .load(&mut *conn)
                .await?;
            let count = nic::table
                .filter(nic::discrete_serial.eq_any(owners))
                .count()
                .get_result(&mut *conn)
                .await?;
            Ok((count, rows))
        } else {
            let rows = nic::table
                .filter(nic::discrete_serial.eq_any(owners))
                .order(nic::mac_address.asc())
                .select(Nic::as_select())
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    pub async fn get_one(&self, mac_address: &str) -> Result<Nic> {
        let mut conn = self.pool.get().await?;
        nic::table
            .find(mac_address)
            .select(Nic::as_select())
            .first(&mut *conn)
            .await
            .map_err(|err| match err {
                diesel::result::Error::NotFound => Error::RecordNotFound,
                other => Error::Storage(other),
            })
    }
}
