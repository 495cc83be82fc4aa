use crate::db::PgPool;
use crate::error::{Error, Result};
use crate::filter::{Filters, Page};
use crate::model::Fan;
use crate::schema::fan;
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::Bool;
use diesel_async::RunQueryDsl;

pub struct FanStorage {
    pool: PgPool,
}

impl FanStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn count(&self, filters: &Filters) -> Result<i64> {
        let clause = filters.build_clause(Fan::FILTERABLE);
        let mut conn = self.pool.get().await?;
        let mut query = fan::table.into_boxed();
        if !clause.is_empty() {
            query = query.filter(sql::<Bool>(&clause));
        }
        Ok(query.count().get_result(&mut *conn).await?)
    }

    pub async fn get_all(&self, page: Page) -> Result<(i64, Vec<Fan>)> {
        let mut conn = self.pool.get().await?;
        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = fan::table
                .order(fan::serial.asc())
                .offset(offset)
                .limit(limit)
                .select(Fan::as_select())
                .load(&mut *conn)
                .await?;
            let count = fan::table.count().get_result(&mut *conn).await?;
            Ok((count, rows))
        } else {
            let rows = fan::table
                .order(fan::serial.asc())
                .select(Fan::as_select())
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    pub async fn get_all_by_filters(
        &self,
        page: Page,
        filters: &Filters,
    ) -> Result<(i64, Vec<Fan>)> {
        let clause = filters.build_clause(Fan::FILTERABLE);
        let mut conn = self.pool.get().await?;

        let mut query = fan::table.into_boxed().order(fan::serial.asc());
        if !clause.is_empty() {
            query = query.filter(sql::<Bool>(&clause));
        }

        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = query
                .offset(offset)
                .limit(limit)
                .select(Fan::as_select())
                .load(&mut *conn)
                .await?;

            let mut count_query = fan::table.into_boxed();
            if !clause.is_empty() {
                count_query = count_query.filter(sql::<Bool>(&clause));
            }
            let count = count_query.count().get_result(&mut *conn).await?;
            Ok((count, rows))
        } else {
            let rows = query.select(Fan::as_select()).load(&mut *conn).await?;
            Ok((0, rows))
        }
    }

    pub async fn get_all_by_chassis_id(
        &self,
        page: Page,
        serials: &[String],
    ) -> Result<(i64, Vec<Fan>)> {
        let owners: Vec<Option<&str>> = serials.iter().map(|s| Some(s.as_str())).collect();
        let mut conn = self.pool.get().await?;

        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = fan::table
                .filter(fan::chassis_serial.eq_any(owners.clone()))
                .order(fan::serial.asc())
                .offset(offset)
                .limit(limit)
                .select(Fan::as_select())
                .load(&mut *conn)
                .await?;
            let count = fan::table
                .filter(fan::chassis_serial.eq_any(owners))
                .count()
                .get_result(&mut *conn)
                .await?;
            Ok((count, rows))
        } else {
            let rows = fan::table
                .filter(fan::chassis_serial.eq_any(owners))
                .order(fan::serial.asc())
                .select(Fan::as_select())
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    pub async fn get_all_by_discrete_id(
        &self,
        page: Page,
        serials: &[String],
    ) -> Result<(i64, Vec<Fan>)> {
        let owners: Vec<Option<&str>> = serials.iter().map(|s| Some(s.as_str())).collect();
        let mut conn = self.pool.get().await?;

        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = fan::table
                .filter(fan::discrete_serial.eq_any(owners.clone()))
                .order(fan::serial.asc())
                .offset(offset)
                .limit(limit)
                .select(Fan::as_select())
                .load(&mut *conn)
                .await?;
            let count = fan::table
                .filter(fan::discrete_serial.eq_any(owners))
                .count()
                .get_result(&mut *conn)
                .await?;
            Ok((count, rows))
        } else {
            let rows = fan::table
                .filter(fan::discrete_serial.eq_any(owners))
                .order(fan::serial.asc())
                .select(Fan::as_select())
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    pub async fn get_one(&self, serial: &str) -> Result<Fan> {
        let mut conn = self.pool.get().await?;
        fan::table
            .find(serial)
            .select(Fan::as_select())
            .first(&mut *conn)
            .await
            .map_err(|err| match err {
                diesel::result::Error::NotFound => Error::RecordNotFound,
                other => Error::Storage(other),
            })
    }
}
