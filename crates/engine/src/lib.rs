//! Vantage engine: single-writer reconciler over the merged change channel,
//! container enrichment scheduling, and fan-out to subscribers.

#![forbid(unsafe_code)]

mod enrich;
mod fanout;
mod project;
mod store;

pub use fanout::{FanOutHandle, Monitor};

use std::sync::Arc;

use anyhow::Result;
use metrics::counter;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use vantage_core::{
    ApplicationModel, Change, ChangeKind, Container, ContainerViewModel, EnvVar, EventType,
    Executable, ExecutableViewModel, OwnerKind, ProjectViewModel, RawObject, ResourceEvent,
    ResourceViewModel,
};
use vantage_hub::OrchestratorClient;
use vantage_inspect::ProcessRunner;

use enrich::{spawn_enrichment, Harvest};
use store::RawStore;

/// Running reconciliation pipeline plus its output hubs. Instances are
/// independent; any number may coexist in one process.
pub struct Engine {
    pub containers: FanOutHandle<ContainerViewModel>,
    pub executables: FanOutHandle<ExecutableViewModel>,
    pub projects: FanOutHandle<ProjectViewModel>,
    pub resources: FanOutHandle<ResourceViewModel>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Wire the channels and spawn watcher, fan-out and reconciler tasks.
    pub fn start(
        client: Arc<dyn OrchestratorClient>,
        runner: Arc<dyn ProcessRunner>,
        model: Arc<dyn ApplicationModel>,
    ) -> Engine {
        let cancel = CancellationToken::new();
        let (merged_tx, merged_rx) = mpsc::unbounded_channel::<ResourceEvent>();
        let (harvest_tx, harvest_rx) = mpsc::unbounded_channel::<Harvest>();

        let mut tasks = vantage_hub::spawn_watchers(client, merged_tx, &cancel);

        let (containers, t) = fanout::spawn_fanout("containers", cancel.clone());
        tasks.push(t);
        let (executables, t) = fanout::spawn_fanout("executables", cancel.clone());
        tasks.push(t);
        let (projects, t) = fanout::spawn_fanout("projects", cancel.clone());
        tasks.push(t);
        let (resources, t) = fanout::spawn_fanout("resources", cancel.clone());
        tasks.push(t);

        let reconciler = Reconciler {
            store: RawStore::default(),
            env_cache: FxHashMap::default(),
            enrich_started: FxHashSet::default(),
            runner,
            model,
            harvest_tx,
            cancel: cancel.clone(),
            containers: containers.clone(),
            executables: executables.clone(),
            projects: projects.clone(),
            resources: resources.clone(),
        };
        tasks.push(tokio::spawn(reconciler.run(merged_rx, harvest_rx)));

        Engine { containers, executables, projects, resources, cancel, tasks }
    }

    /// Cancel every task and wait for all of them to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "engine task join failed");
                }
            }
        }
        info!("engine stopped");
    }
}

/// Sole owner of the raw tables, the associated-services index, the
/// enrichment cache and the started set. Everything it touches is unshared.
struct Reconciler {
    store: RawStore,
    /// container runtime id → harvested env. Entries live until process exit.
    env_cache: FxHashMap<String, Vec<EnvVar>>,
    /// Runtime ids an inspection was ever scheduled for. Never shrinks.
    enrich_started: FxHashSet<String>,
    runner: Arc<dyn ProcessRunner>,
    model: Arc<dyn ApplicationModel>,
    harvest_tx: mpsc::UnboundedSender<Harvest>,
    cancel: CancellationToken,
    containers: FanOutHandle<ContainerViewModel>,
    executables: FanOutHandle<ExecutableViewModel>,
    projects: FanOutHandle<ProjectViewModel>,
    resources: FanOutHandle<ResourceViewModel>,
}

impl Reconciler {
    async fn run(
        mut self,
        mut merged_rx: mpsc::UnboundedReceiver<ResourceEvent>,
        mut harvest_rx: mpsc::UnboundedReceiver<Harvest>,
    ) {
        info!("reconciler starting");
        // The merged channel closes when every watcher is gone; harvests may
        // still be in flight at that point, so the loop keeps draining them.
        let mut merged_open = true;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("reconciler cancelled");
                    break;
                }
                ev = merged_rx.recv(), if merged_open => match ev {
                    Some(ev) => {
                        if let Err(e) = self.handle(ev) {
                            error!(error = %e, "reconcile failed; no further updates will be emitted");
                            counter!("reconcile_failures_total", 1u64);
                            break;
                        }
                    }
                    None => {
                        info!("merged channel closed");
                        merged_open = false;
                    }
                },
                harvest = harvest_rx.recv() => match harvest {
                    Some(h) => self.absorb_harvest(h),
                    // Cannot close while we hold harvest_tx.
                    None => break,
                },
            }
        }
        info!("reconciler stopped");
    }

    fn handle(&mut self, ev: ResourceEvent) -> Result<()> {
        counter!("reconcile_events_total", 1u64);
        match ev.object {
            RawObject::Container(c) => self.on_container(ev.event, c),
            RawObject::Executable(e) if e.is_project() => self.on_project(ev.event, e),
            RawObject::Executable(e) => self.on_executable(ev.event, e),
            RawObject::Endpoint(ep) => self.on_endpoint(ev.event, ep),
            RawObject::Service(s) => self.on_service(ev.event, s),
        }
    }

    fn on_container(&mut self, event: EventType, c: Container) -> Result<()> {
        if !self.store.apply_container(event, c.clone())? {
            return Ok(());
        }
        self.store.update_associated(OwnerKind::Container, &c.name, event, &c.annotations);
        if event != EventType::Deleted {
            self.maybe_schedule_enrichment(&c);
        }
        let vm = self.container_vm(&c);
        self.emit_container(event.into(), vm);
        Ok(())
    }

    fn on_executable(&mut self, event: EventType, e: Executable) -> Result<()> {
        if !self.store.apply_executable(event, e.clone())? {
            return Ok(());
        }
        self.store.update_associated(OwnerKind::Executable, &e.name, event, &e.annotations);
        let vm = project::executable_view(&self.store, &e);
        self.emit_executable(event.into(), vm);
        Ok(())
    }

    fn on_project(&mut self, event: EventType, e: Executable) -> Result<()> {
        if !self.store.apply_executable(event, e.clone())? {
            return Ok(());
        }
        self.store.update_associated(OwnerKind::Executable, &e.name, event, &e.annotations);
        let vm = project::project_view(&self.store, &e, self.model.as_ref());
        self.emit_project(event.into(), vm);
        Ok(())
    }

    fn on_endpoint(&mut self, event: EventType, ep: vantage_core::Endpoint) -> Result<()> {
        if !self.store.apply_endpoint(event, ep.clone())? {
            return Ok(());
        }
        for owner in &ep.owner_refs {
            match OwnerKind::from_ref(&owner.kind) {
                Some(OwnerKind::Container) => {
                    if let Some(c) = self.store.containers.get(&owner.name).cloned() {
                        let vm = self.container_vm(&c);
                        self.emit_container(ChangeKind::Modified, vm);
                    }
                    // An absent owner is fine: endpoints may precede their
                    // owner, whose own event re-emits later.
                }
                Some(OwnerKind::Executable) => {
                    if let Some(e) = self.store.executables.get(&owner.name).cloned() {
                        self.reemit_executable(&e);
                    }
                }
                None => debug!(kind = %owner.kind, "endpoint owner kind not tracked"),
            }
        }
        Ok(())
    }

    fn on_service(&mut self, event: EventType, s: vantage_core::Service) -> Result<()> {
        if !self.store.apply_service(event, s.clone())? {
            return Ok(());
        }
        // Non-HTTP services never contribute endpoints, so nothing to refresh.
        if s.http_scheme().is_none() {
            return Ok(());
        }
        for (kind, name) in self.store.associated_owners(&s.name) {
            match kind {
                OwnerKind::Container => {
                    if let Some(c) = self.store.containers.get(&name).cloned() {
                        let vm = self.container_vm(&c);
                        self.emit_container(ChangeKind::Modified, vm);
                    }
                }
                OwnerKind::Executable => {
                    if let Some(e) = self.store.executables.get(&name).cloned() {
                        self.reemit_executable(&e);
                    }
                }
            }
        }
        Ok(())
    }

    fn maybe_schedule_enrichment(&mut self, c: &Container) {
        let Some(id) = c.status.as_ref().and_then(|s| s.container_id.as_deref()) else {
            return;
        };
        if self.env_cache.contains_key(id) || self.enrich_started.contains(id) {
            return;
        }
        self.enrich_started.insert(id.to_string());
        debug!(container = %c.name, container_id = id, "scheduling env enrichment");
        spawn_enrichment(
            Arc::clone(&self.runner),
            id.to_string(),
            c.name.clone(),
            self.harvest_tx.clone(),
            self.cancel.clone(),
        );
    }

    fn absorb_harvest(&mut self, h: Harvest) {
        self.env_cache.insert(h.container_id, h.env);
        match self.store.containers.get(&h.container_name).cloned() {
            Some(c) => {
                let vm = self.container_vm(&c);
                self.emit_container(ChangeKind::Modified, vm);
            }
            None => debug!(container = %h.container_name, "container gone before harvest landed"),
        }
    }

    fn container_vm(&self, c: &Container) -> ContainerViewModel {
        let cached = c
            .status
            .as_ref()
            .and_then(|s| s.container_id.as_deref())
            .and_then(|id| self.env_cache.get(id));
        project::container_view(&self.store, c, cached)
    }

    fn reemit_executable(&self, e: &Executable) {
        if e.is_project() {
            let vm = project::project_view(&self.store, e, self.model.as_ref());
            self.emit_project(ChangeKind::Modified, vm);
        } else {
            let vm = project::executable_view(&self.store, e);
            self.emit_executable(ChangeKind::Modified, vm);
        }
    }

    // Each change goes to the kind hub and the aggregate hub with an
    // identical payload, in that order, from this single task.

    fn emit_container(&self, kind: ChangeKind, vm: ContainerViewModel) {
        counter!("emissions_total", 1u64);
        self.containers.send(Change::new(kind, vm.clone()));
        self.resources.send(Change::new(kind, ResourceViewModel::Container(vm)));
    }

    fn emit_executable(&self, kind: ChangeKind, vm: ExecutableViewModel) {
        counter!("emissions_total", 1u64);
        self.executables.send(Change::new(kind, vm.clone()));
        self.resources.send(Change::new(kind, ResourceViewModel::Executable(vm)));
    }

    fn emit_project(&self, kind: ChangeKind, vm: ProjectViewModel) {
        counter!("emissions_total", 1u64);
        self.projects.send(Change::new(kind, vm.clone()));
        self.resources.send(Change::new(kind, ResourceViewModel::Project(vm)));
    }
}
