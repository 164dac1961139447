//! One-shot enrichment tasks reading container environment out of the
//! container runtime. A container id is only ever inspected once.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use vantage_core::EnvVar;
use vantage_inspect::{inspect_env, inspect_timeout, ProcessRunner};

/// One successful harvest, drained by the reconciler.
#[derive(Debug)]
pub(crate) struct Harvest {
    pub container_id: String,
    pub container_name: String,
    pub env: Vec<EnvVar>,
}

/// Spawn a single-shot inspection for `container_id`. Failures are logged and
/// dropped; the reconciler never retries an id, so a recreated container (new
/// id) is the only retry path. Cancellation abandons the wait, which kills
/// the subprocess.
pub(crate) fn spawn_enrichment(
    runner: Arc<dyn ProcessRunner>,
    container_id: String,
    container_name: String,
    tx: mpsc::UnboundedSender<Harvest>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let deadline = inspect_timeout();
        let res = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(container_id = %container_id, "enrichment cancelled");
                return;
            }
            res = tokio::time::timeout(deadline, inspect_env(runner.as_ref(), &container_id)) => res,
        };
        match res {
            Ok(Ok(env)) => {
                counter!("enrich_ok_total", 1u64);
                debug!(container_id = %container_id, vars = env.len(), "container env harvested");
                let _ = tx.send(Harvest { container_id, container_name, env });
            }
            Ok(Err(e)) => {
                counter!("enrich_failures_total", 1u64);
                error!(container_id = %container_id, error = %e, "container env inspection failed");
            }
            Err(_) => {
                counter!("enrich_failures_total", 1u64);
                error!(
                    container_id = %container_id,
                    timeout_secs = deadline.as_secs(),
                    "container env inspection timed out"
                );
            }
        }
    });
}
