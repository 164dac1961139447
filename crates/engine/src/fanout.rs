//! Fan-out processors: one task per view-model kind (plus the aggregate)
//! holding the current-state map, serving snapshots to new subscribers and
//! broadcasting deltas.

use std::collections::BTreeMap;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use vantage_core::{Change, ChangeKind, Keyed};

/// Subscription handle: a snapshot of the current view models in name order
/// plus the live delta stream picking up exactly where the snapshot ends.
/// The stream ends when the service shuts down.
pub struct Monitor<V> {
    pub snapshot: Vec<V>,
    pub stream: mpsc::UnboundedReceiver<Change<V>>,
}

pub(crate) enum FanIn<V> {
    Delta(Change<V>),
    Subscribe(oneshot::Sender<Monitor<V>>),
}

/// Feed-and-subscribe handle for one fan-out task.
pub struct FanOutHandle<V> {
    tx: mpsc::UnboundedSender<FanIn<V>>,
}

impl<V> Clone for FanOutHandle<V> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<V: Keyed + Clone + Send + 'static> FanOutHandle<V> {
    /// Snapshot plus stream, atomically: the request travels the same channel
    /// as the deltas, so nothing is missing from or duplicated in the stream.
    /// `None` once the fan-out task has stopped.
    pub async fn monitor(&self) -> Option<Monitor<V>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(FanIn::Subscribe(reply_tx)).ok()?;
        reply_rx.await.ok()
    }

    pub(crate) fn send(&self, change: Change<V>) {
        let _ = self.tx.send(FanIn::Delta(change));
    }
}

/// Spawn one fan-out task. Subscribers are buffered without bound, so a slow
/// subscriber never blocks the task or its peers; a subscriber is pruned once
/// its receiver is gone.
pub(crate) fn spawn_fanout<V>(
    label: &'static str,
    cancel: CancellationToken,
) -> (FanOutHandle<V>, JoinHandle<()>)
where
    V: Keyed + Clone + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<FanIn<V>>();
    let task = tokio::spawn(async move {
        let mut current: BTreeMap<String, V> = BTreeMap::new();
        let mut sinks: Vec<mpsc::UnboundedSender<Change<V>>> = Vec::new();
        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(m) => m,
                    None => break,
                },
            };
            match msg {
                FanIn::Subscribe(reply) => {
                    let (sink_tx, sink_rx) = mpsc::unbounded_channel();
                    let snapshot = current.values().cloned().collect();
                    if reply.send(Monitor { snapshot, stream: sink_rx }).is_ok() {
                        sinks.push(sink_tx);
                    }
                    debug!(label, subscribers = sinks.len(), "subscriber added");
                }
                FanIn::Delta(change) => {
                    match change.kind {
                        ChangeKind::Added | ChangeKind::Modified => {
                            current.insert(change.value.key().to_string(), change.value.clone());
                        }
                        ChangeKind::Deleted => {
                            current.remove(change.value.key());
                        }
                        ChangeKind::Other => {}
                    }
                    sinks.retain(|sink| sink.send(change.clone()).is_ok());
                }
            }
        }
        info!(label, "fan-out stopped");
    });
    (FanOutHandle { tx }, task)
}
