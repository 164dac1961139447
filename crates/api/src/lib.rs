//! Vantage public API facade (in-process).
//!
//! Frontends construct a [`ViewService`] against the orchestrator client, the
//! process runner and the application model, then subscribe to live view
//! models through monitors.

#![forbid(unsafe_code)]

use std::sync::Arc;

use tracing::info;

pub use vantage_core::prelude::*;
pub use vantage_core::{annotations, ApplicationModel, NoLaunchProfiles};
pub use vantage_engine::Monitor;
pub use vantage_hub::{OrchestratorClient, WatchEvent};
pub use vantage_inspect::{ProcessOutput, ProcessRunner, ProcessSpec, TokioRunner};

/// Errors surfaced to frontends. Subscribers otherwise only ever see view
/// model deltas or stream termination.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The engine's tasks have stopped (shutdown, or a reconcile failure).
    #[error("view service stopped")]
    Stopped,
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Live view over one application's workloads. Purely observational and
/// in-memory; nothing is persisted and the orchestrator is never written to.
pub struct ViewService {
    engine: vantage_engine::Engine,
    application_name: String,
}

impl ViewService {
    /// Spawn the full pipeline. Instances are independent; any number may
    /// coexist in one process.
    pub fn start(
        host_application_name: &str,
        client: Arc<dyn OrchestratorClient>,
        runner: Arc<dyn ProcessRunner>,
        model: Arc<dyn ApplicationModel>,
    ) -> ViewService {
        let application_name = display_name(host_application_name);
        info!(application = %application_name, "view service starting");
        ViewService {
            engine: vantage_engine::Engine::start(client, runner, model),
            application_name,
        }
    }

    /// Display name of the observed application.
    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    pub async fn containers(&self) -> ServiceResult<Monitor<ContainerViewModel>> {
        self.engine.containers.monitor().await.ok_or(ServiceError::Stopped)
    }

    pub async fn executables(&self) -> ServiceResult<Monitor<ExecutableViewModel>> {
        self.engine.executables.monitor().await.ok_or(ServiceError::Stopped)
    }

    pub async fn projects(&self) -> ServiceResult<Monitor<ProjectViewModel>> {
        self.engine.projects.monitor().await.ok_or(ServiceError::Stopped)
    }

    /// Aggregate stream: the union of the three per-kind streams with
    /// identical payloads.
    pub async fn resources(&self) -> ServiceResult<Monitor<ResourceViewModel>> {
        self.engine.resources.monitor().await.ok_or(ServiceError::Stopped)
    }

    /// Cancel every task and wait for all of them to finish.
    pub async fn shutdown(self) {
        info!(application = %self.application_name, "view service stopping");
        self.engine.shutdown().await;
    }
}

/// Host application names conventionally end in ".AppHost"; the dashboard
/// shows the name without it.
fn display_name(host_name: &str) -> String {
    const SUFFIX: &str = ".AppHost";
    let cut = host_name.len().saturating_sub(SUFFIX.len());
    if host_name.is_char_boundary(cut) && host_name[cut..].eq_ignore_ascii_case(SUFFIX) {
        return host_name[..cut].to_string();
    }
    host_name.to_string()
}
