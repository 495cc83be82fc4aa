#![recursion_limit = "256"]

pub mod bus;
pub mod clients;
pub mod collector;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod model;
pub mod schema;
pub mod storage;
pub mod telemetry;
pub mod web;

use crate::{config::Config, web::Server};

/// Bootstraps the JSON:API server from a loaded configuration.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    Server::new(config).await?.run().await
}
