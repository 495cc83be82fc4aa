use crate::db::PgPool;
use crate::error::{Error, Result};
use crate::filter::{Filters, Page};
use crate::model::Psu;
use crate::schema::psu;
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::Bool;
use diesel_async::RunQueryDsl;

pub struct PsuStorage {
    pool: PgPool,
}

impl PsuStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn count(&self, filters: &Filters) -> Result<i64> {
        let clause = filters.build_clause(Psu::FILTERABLE);
        let mut conn = self.pool.get().await?;
        let mut query = psu::table.into_boxed();
        if !clause.is_empty() {
            query = query.filter(sql::<Bool>(&clause));
        }
        Ok(query.count().get_result(&mut *conn).await?)
    }

    pub async fn get_all(&self, page: Page) -> Result<(i64, Vec<Psu>)> {
        let mut conn = self.pool.get().await?;
        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = psu::table
                .order(psu::serial.asc())
                .offset(offset)
                .limit(limit)
                .select(Psu::as_select())
                .load(&mut *conn)
                .await?;
            let count = psu::table.count().get_result(&mut *conn).await?;
            Ok((count, rows))
        } else {
            let rows = psu::table
                .order(psu::serial.asc())
                .select(Psu::as_select())
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    pub async fn get_all_by_filters(
        &self,
        page: Page,
        filters: &Filters,
    ) -> Result<(i64, Vec<Psu>)> {
        let clause = filters.build_clause(Psu::FILTERABLE);
        let mut conn = self.pool.get().await?;

        let mut query = psu::table.into_boxed().order(psu::serial.asc());
        if !clause.is_empty() {
            query = query.filter(sql::<Bool>(&clause));
        }

        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = query
                .offset(offset)
                .limit(limit)
                .select(Psu::as_select())
                .load(&mut *conn)
                .await?;

            let mut count_query = psu::table.into_boxed();
            if !clause.is_empty() {
                count_query = count_query.filter(sql::<Bool>(&clause));
            }
            let count = count_query.count().get_result(&mut *conn).await?;
            Ok((count, rows))
        } else {
            let rows = query.select(Psu::as_select()).load(&mut *conn).await?;
            Ok((0, rows))
        }
    }

    pub async fn get_all_by_chassis_id(
        &self,
        page: Page,
        serials: &[String],
    ) -> Result<(i64, Vec<Psu>)> {
        let owners: Vec<Option<&str>> = serials.iter().map(|s| Some(s.as_str())).collect();
        let mut conn = self.pool.get().await?;

        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = psu::table
                .filter(psu::chassis_serial.eq_any(owners.clone()))
                .order(psu::serial.asc())
                .offset(offset)
                .limit(limit)
                .select(Psu::as_select())
                .load(&mut *conn)
                .await?;
            let count = psu::table
                .filter(psu::chassis_serial.eq_any(owners))
                .count()
                .get_result(&mut *conn)
                .await?;
            Ok((count, rows))
        } else {
            let rows = psu::table
                .filter(psu::chassis_serial.eq_any(owners))
                .order(psu::serial.asc())
                .select(Psu::as_select())
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    pub async fn get_all_by_discrete_id(
        &self,
        page: Page,
        serials: &[String],
    ) -> Result<(i64, Vec<Psu>)> {
        let owners: Vec<Option<&str>> = serials.iter().map(|s| Some(s.as_str())).collect();
        let mut conn = self.pool.get().await?;

        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = psu::table
                .filter(psu::discrete_serial.eq_any(owners.clone()))
                .order(psu::serial.asc())
                .offset(offset)
                .limit(limit)
                .select(Psu::as_select())
                .load(&mut *conn)
                .await?;
            let count = psu::table
                .filter(psu::discrete_serial.eq_any(owners))
                .count()
                .get_result(&mut *conn)
                .await?;
            Ok((count, rows))
        } else {
            let rows = psu::table
                .filter(psu::discrete_serial.eq_any(owners))
                .order(psu::serial.asc())
                .select(Psu::as_select())
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    pub async fn get_one(&self, serial: &str) -> Result<Psu> {
        let mut conn = self.pool.get().await?;
        psu::table
            .find(serial)
            .select(Psu::as_select())
            .first(&mut *conn)
            .await
            .map_err(|err| match err {
                diesel::result::Error::NotFound => Error::RecordNotFound,
                other => Error::Storage(other),
            })
    }
}
