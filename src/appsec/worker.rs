//! Update worker.
//!
//! A single task consumes deliveries from a bounded channel and applies
//! them one at a time, whatever thread the transport delivers from.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::appsec::controller::Appsec;
use crate::remoteconfig::{Delivery, UpdateSender};

/// Create the delivery channel. The sender goes to `Appsec::new`, the
/// receiver to [`spawn`].
pub fn channel(capacity: usize) -> (UpdateSender, mpsc::Receiver<Delivery>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (UpdateSender::new(tx), rx)
}

/// Spawn the worker. It exits on shutdown, or once every sender is dropped.
///
/// `Appsec` keeps a sender for listener registration, so a worker serving
/// it only ends through `shutdown`.
pub fn spawn(
    appsec: Arc<Appsec>,
    deliveries: mpsc::Receiver<Delivery>,
    shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(run(appsec, deliveries, shutdown))
}

async fn run(
    appsec: Arc<Appsec>,
    mut deliveries: mpsc::Receiver<Delivery>,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::debug!("Update worker started");
    loop {
        tokio::select! {
            delivery = deliveries.recv() => {
                let Some(delivery) = delivery else {
                    break;
                };
                let statuses = appsec.dispatch(delivery.listener, &delivery.updates);
                if delivery.reply.send(statuses).is_err() {
                    tracing::debug!(listener = ?delivery.listener, "Delivery caller went away before statuses were ready");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Update worker received shutdown signal, exiting loop");
                break;
            }
        }
    }
    tracing::debug!("Update worker stopped");
}
