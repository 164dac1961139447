//! Vantage hub: orchestrator watch seam and the watcher tasks that merge all
//! primitive streams into one channel.

#![forbid(unsafe_code)]

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use futures::stream::BoxStream;
use futures::StreamExt;
use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use vantage_core::{Container, Endpoint, EventType, Executable, RawObject, ResourceEvent, Service};

/// One event on a primitive watch stream.
#[derive(Debug, Clone)]
pub enum WatchEvent<T> {
    Added(T),
    Modified(T),
    Deleted(T),
    /// Progress marker; carries no object.
    Bookmark,
    /// In-band stream error; the stream itself keeps going.
    Error(String),
}

/// Watch access to the local orchestrator. Streams are lazy and infinite;
/// they end only when the orchestrator side fails.
#[async_trait::async_trait]
pub trait OrchestratorClient: Send + Sync {
    async fn watch_containers(&self) -> Result<BoxStream<'static, WatchEvent<Container>>>;
    async fn watch_executables(&self) -> Result<BoxStream<'static, WatchEvent<Executable>>>;
    async fn watch_endpoints(&self) -> Result<BoxStream<'static, WatchEvent<Endpoint>>>;
    async fn watch_services(&self) -> Result<BoxStream<'static, WatchEvent<Service>>>;
}

/// Spawn one watcher task per primitive kind, all feeding `merged_tx`.
/// A failed kind stops alone; the others keep going. No restart is attempted,
/// the host process is expected to restart instead.
pub fn spawn_watchers(
    client: Arc<dyn OrchestratorClient>,
    merged_tx: mpsc::UnboundedSender<ResourceEvent>,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let containers = {
        let client = Arc::clone(&client);
        spawn_kind(
            "Container",
            async move { client.watch_containers().await },
            merged_tx.clone(),
            cancel.clone(),
        )
    };
    let executables = {
        let client = Arc::clone(&client);
        spawn_kind(
            "Executable",
            async move { client.watch_executables().await },
            merged_tx.clone(),
            cancel.clone(),
        )
    };
    let endpoints = {
        let client = Arc::clone(&client);
        spawn_kind(
            "Endpoint",
            async move { client.watch_endpoints().await },
            merged_tx.clone(),
            cancel.clone(),
        )
    };
    let services = {
        let client = Arc::clone(&client);
        spawn_kind(
            "Service",
            async move { client.watch_services().await },
            merged_tx,
            cancel.clone(),
        )
    };
    vec![containers, executables, endpoints, services]
}

fn spawn_kind<T, F>(
    kind: &'static str,
    connect: F,
    tx: mpsc::UnboundedSender<ResourceEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    T: Into<RawObject> + Send + 'static,
    F: Future<Output = Result<BoxStream<'static, WatchEvent<T>>>> + Send + 'static,
{
    tokio::spawn(async move {
        let stream = tokio::select! {
            _ = cancel.cancelled() => return,
            res = connect => match res {
                Ok(s) => s,
                Err(e) => {
                    error!(kind, error = %e, "watch failed to start");
                    counter!("watch_errors_total", 1u64);
                    return;
                }
            },
        };
        pump(kind, stream, tx, cancel).await;
    })
}

/// Forward one stream into the merged channel until it ends, the channel
/// closes, or cancellation fires.
async fn pump<T: Into<RawObject>>(
    kind: &'static str,
    mut stream: BoxStream<'static, WatchEvent<T>>,
    tx: mpsc::UnboundedSender<ResourceEvent>,
    cancel: CancellationToken,
) {
    info!(kind, "watcher starting");
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(kind, "watcher cancelled");
                break;
            }
            next = stream.next() => next,
        };
        let (event, object) = match next {
            Some(WatchEvent::Added(o)) => (EventType::Added, o),
            Some(WatchEvent::Modified(o)) => (EventType::Modified, o),
            Some(WatchEvent::Deleted(o)) => (EventType::Deleted, o),
            Some(WatchEvent::Bookmark) => {
                counter!("watch_bookmarks_total", 1u64);
                continue;
            }
            Some(WatchEvent::Error(e)) => {
                warn!(kind, error = %e, "in-band watch error ignored");
                counter!("watch_errors_total", 1u64);
                continue;
            }
            None => {
                error!(kind, "watch stream ended");
                counter!("watch_errors_total", 1u64);
                break;
            }
        };
        counter!("watch_events_total", 1u64);
        if tx.send(ResourceEvent { event, object: object.into() }).is_err() {
            info!(kind, "merged channel closed; stopping watcher");
            break;
        }
    }
    info!(kind, "watcher stopped");
}
