//! The JSON:API HTTP surface.

pub mod jsonapi;
pub mod resources;

use crate::config::Config;
use crate::db::{self, PgPool};
use crate::filter::QueryParams;
use crate::storage::{
    BladeStorage, ChassisStorage, DiscreteStorage, DiskStorage, FanStorage, NicStorage,
    PsuStorage, ScannedPortStorage, StorageBladeStorage,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use diesel_async::SimpleAsyncConnection;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub chassis: Arc<ChassisStorage>,
    pub blades: Arc<BladeStorage>,
    pub discretes: Arc<DiscreteStorage>,
    pub nics: Arc<NicStorage>,
    pub disks: Arc<DiskStorage>,
    pub psus: Arc<PsuStorage>,
    pub fans: Arc<FanStorage>,
    pub storage_blades: Arc<StorageBladeStorage>,
    pub scanned_ports: Arc<ScannedPortStorage>,
}

pub struct Server {
    config: Arc<Config>,
    state: AppState,
}

impl Server {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let pool = db::connect_pool(&config).await?;
        let state = AppState {
            chassis: Arc::new(ChassisStorage::new(pool.clone())),
            blades: Arc::new(BladeStorage::new(pool.clone())),
            discretes: Arc::new(DiscreteStorage::new(pool.clone())),
            nics: Arc::new(NicStorage::new(pool.clone())),
            disks: Arc::new(DiskStorage::new(pool.clone())),
            psus: Arc::new(PsuStorage::new(pool.clone())),
            fans: Arc::new(FanStorage::new(pool.clone())),
            storage_blades: Arc::new(StorageBladeStorage::new(pool.clone())),
            scanned_ports: Arc::new(ScannedPortStorage::new(pool.clone())),
            pool,
        };
        Ok(Self {
            config: Arc::new(config),
            state,
        })
    }

    fn router(&self) -> Router {
        let api = Router::new()
            .route("/chassis", get(resources::chassis::list))
            .route("/chassis/:serial", get(resources::chassis::get_one))
            .route("/blades", get(resources::blade::list))
            .route("/blades/:serial", get(resources::blade::get_one))
            .route("/discretes", get(resources::discrete::list))
            .route("/discretes/:serial", get(resources::discrete::get_one))
            .route("/nics", get(resources::nic::list))
            .route("/nics/:mac_address", get(resources::nic::get_one))
            .route("/disks", get(resources::disk::list))
            .route("/disks/:serial", get(resources::disk::get_one))
            .route("/psus", get(resources::psu::list))
            .route("/psus/:serial", get(resources::psu::get_one))
            .route("/fans", get(resources::fan::list))
            .route("/fans/:serial", get(resources::fan::get_one))
            .route("/storage_blades", get(resources::storage_blade::list))
            .route(
                "/storage_blades/:serial",
                get(resources::storage_blade::get_one),
            )
            .route("/scanned_ports", get(resources::scanned_port::list))
            .route("/scanned_ports/:id", get(resources::scanned_port::get_one));

        Router::new()
            .route("/healthz", get(Self::health))
            .route("/ping_db", get(Self::ping_db))
            .nest("/v1", api)
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = format!("0.0.0.0:{}", self.config.http_server_port);
        let listener = TcpListener::bind(&addr).await?;
        info!(%addr, "API listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    async fn health() -> Json<serde_json::Value> {
        Json(json!({ "status": "ok" }))
    }

    async fn ping_db(State(state): State<AppState>) -> (StatusCode, &'static str) {
        let alive = match state.pool.get().await {
            Ok(mut conn) => conn.batch_execute("SELECT 1").await.is_ok(),
            Err(_) => false,
        };
        if alive {
            (StatusCode::OK, "pong")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "database has gone away")
        }
    }
}

/// Shared query-string extraction for the resource handlers.
pub(crate) fn params_from(pairs: Query<Vec<(String, String)>>) -> QueryParams {
    QueryParams::from_pairs(pairs.0.iter().map(|(k, v)| (k.as_str(), v.as_str())))
}
