//! Message-bus worker: a queue subscription that forwards IP strings into
//! the collection pipeline until the process is asked to stop.

use crate::collector::{resolve, Pipeline, Source};
use crate::config::Config;
use crate::db::PgPool;
use anyhow::{Context, Result};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Collection requests arrive on this subject, one IP string per message.
pub const COLLECT_SUBJECT: &str = "dora::collect";

/// Subscribes to the collect subject under the configured queue group and
/// feeds the pipeline. On ctrl-c the subscription is drained, the input
/// channel closed, and the workers joined before returning.
pub async fn run_worker(config: Arc<Config>, pool: PgPool) -> Result<()> {
    let worker = &config.collector.worker;
    if worker.server.is_empty() {
        anyhow::bail!("collector.worker.server is not configured");
    }

    let mut options = async_nats::ConnectOptions::new();
    if !worker.username.is_empty() {
        options = options.user_and_password(worker.username.clone(), worker.password.clone());
    }
    let client = options
        .connect(&worker.server)
        .await
        .with_context(|| format!("failed to connect to {}", worker.server))?;
    info!(server = %worker.server, "connected to message bus");

    let mut subscription = client
        .queue_subscribe(COLLECT_SUBJECT.to_string(), worker.queue.clone())
        .await
        .context("failed to subscribe to the collect subject")?;
    info!(subject = COLLECT_SUBJECT, queue = %worker.queue, "waiting for collection requests");

    let pipeline = Pipeline::start(Arc::clone(&config), pool, Source::Service)?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested, draining workers");
                break;
            }
            message = subscription.next() => {
                let Some(message) = message else {
                    warn!("message bus subscription closed");
                    break;
                };
                let host = String::from_utf8_lossy(&message.payload).trim().to_string();
                if host.is_empty() {
                    continue;
                }
                match resolve(&host).await {
                    Some(address) => {
                        if pipeline.input.send(address).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        error!(operation = "connection", ip = %host, "could not resolve host");
                    }
                }
            }
        }
    }

    if let Err(err) = subscription.unsubscribe().await {
        warn!(error = %err, "unsubscribe failed");
    }
    pipeline.finish().await;
    Ok(())
}
