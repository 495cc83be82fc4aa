//! Change-notification sink: a single task draining callback URLs and
//! POSTing them to the asset database, fire-and-forget.

use crate::error::Result;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Spawns the notifier task. The returned sender must outlive every
/// producer worker; dropping the last clone lets the task drain and exit.
pub fn spawn_notifier() -> Result<(mpsc::UnboundedSender<String>, JoinHandle<()>)> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(20))
        .build()?;
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let handle = tokio::spawn(async move {
        while let Some(callback) = rx.recv().await {
            match client.post(&callback).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(operation = "asset db callback", url = %callback, "change notified");
                }
                Ok(response) => {
                    error!(operation = "asset db callback", url = %callback, status = %response.status(),
                        "sending asset db callback");
                }
                Err(err) => {
                    error!(operation = "asset db callback", url = %callback, error = %err,
                        "sending asset db callback");
                }
            }
        }
    });

    Ok((tx, handle))
}
