use crate::db::PgPool;
use crate::error::{Error, Result};
use crate::filter::{Filters, Page};
use crate::model::StorageBlade;
use crate::schema::storage_blade;
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::Bool;
use diesel_async::RunQueryDsl;

pub struct StorageBladeStorage {
    pool: PgPool,
}

impl StorageBladeStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn count(&self, filters: &Filters) -> Result<i64> {
        let clause = filters.build_clause(StorageBlade::FILTERABLE);
        let mut conn = self.pool.get().await?;
        let mut query = storage_blade::table.into_boxed();
        if !clause.is_empty() {
            query = query.filter(sql::<Bool>(&clause));
        }
        Ok(query.count().get_result(&mut *conn).await?)
    }

    pub async fn get_all(&self, page: Page) -> Result<(i64, Vec<StorageBlade>)> {
        let mut conn = self.pool.get().await?;
        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = storage_blade::table
                .order(storage_blade::serial.asc())
                .offset(offset)
                .limit(limit)
                .select(StorageBlade::as_select())
                .load(&mut *conn)
                .await?;
            let count = storage_blade::table.count().get_result(&mut *conn).await?;
            Ok((count, rows))
        } else {
            let rows = storage_blade::table
                .order(storage_blade::serial.asc())
                .select(StorageBlade::as_select())
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    pub async fn get_all_by_filters(
        &self,
        page: Page,
        filters: &Filters,
    ) -> Result<(i64, Vec<StorageBlade>)> {
        let clause = filters.build_clause(StorageBlade::FILTERABLE);
        let mut conn = self.pool.get().await?;

        let mut query = storage_blade::table
            .into_boxed()
            .order(storage_blade::serial.asc());
        if !clause.is_empty() {
            query = query.filter(sql::<Bool>(&clause));
        }

        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = query
                .offset(offset)
                .limit(limit)
                .select(StorageBlade::as_select())
                .load(&mut *conn)
                .await?;

            let mut count_query = storage_blade::table.into_boxed();
            if !clause.is_empty() {
                count_query = count_query.filter(sql::<Bool>(&clause));
            }
            let count = count_query.count().get_result(&mut *conn).await?;
            Ok((count, rows))
        } else {
            let rows = query
                .select(StorageBlade::as_select())
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    pub async fn get_all_by_chassis_id(
        &self,
        page: Page,
        serials: &[String],
    ) -> Result<(i64, Vec<StorageBlade>)> {
        let owners: Vec<Option<&str>> = serials.iter().map(|s| Some(s.as_str())).collect();
        let mut conn = self.pool.get().await?;

        if let (Some(offset), Some(limit)) = (page.offset, page.limit) {
            let rows = storage_blade::table
                .filter(storage_blade::chassis_serial.eq_any(owners.clone()))
                .order(storage_blade::serial.asc())
                .offset(offset)
                .limit(limit)
                .select(StorageBlade::as_select())
                .load(&mut *conn)
                .await?;
            let count = storage_blade::table
                .filter(storage_blade::chassis_serial.eq_any(owners))
                .count()
                .get_result(&mut *conn)
                .await?;
            Ok((count, rows))
        } else {
            let rows = storage_blade::table
                .filter(storage_blade::chassis_serial.eq_any(owners))
                .order(storage_blade::serial.asc())
                .select(StorageBlade::as_select())
                .load(&mut *conn)
                .await?;
            Ok((0, rows))
        }
    }

    pub async fn get_one(&self, serial: &str) -> Result<StorageBlade> {
        let mut conn = self.pool.get().await?;
        storage_blade::table
            .find(serial)
            .select(StorageBlade::as_select())
            .first(&mut *conn)
            .await
            .map_err(|err| match err {
                diesel::result::Error::NotFound => Error::RecordNotFound,
                other => Error::Storage(other),
            })
    }
}
