//! Vantage core types: orchestrator primitives and the change events that
//! carry them between tasks.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod annotations;
pub mod view;

pub use view::{
    Change, ChangeKind, ContainerViewModel, EnvironmentVariable, ExecutableViewModel, Keyed,
    LogSource, ProjectViewModel, ResourceCommon, ResourceViewModel,
};

/// Environment variable as reported by the orchestrator. Partially populated
/// specs may leave either side unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: Option<String>,
    pub value: Option<String>,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: Some(name.into()), value: Some(value.into()) }
    }
}

/// Reference from an endpoint back to the workload that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: String,
    pub name: String,
}

/// The two owner kinds an endpoint can point at, used to key the
/// associated-services index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwnerKind {
    Container,
    Executable,
}

impl OwnerKind {
    pub fn from_ref(kind: &str) -> Option<OwnerKind> {
        match kind {
            "Container" => Some(OwnerKind::Container),
            "Executable" => Some(OwnerKind::Executable),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerKind::Container => "Container",
            OwnerKind::Executable => "Executable",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    /// Id assigned by the container runtime once the container is created.
    pub container_id: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub uid: String,
    pub created_at: Option<DateTime<Utc>>,
    pub image: String,
    pub ports: Vec<i32>,
    /// Environment as declared in the container spec.
    pub env: Vec<EnvVar>,
    pub annotations: BTreeMap<String, String>,
    pub owner_refs: Vec<OwnerRef>,
    pub status: Option<ContainerStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableStatus {
    /// Environment the process actually launched with, when reported.
    pub effective_env: Option<Vec<EnvVar>>,
    pub stdout_path: Option<String>,
    pub stderr_path: Option<String>,
    pub pid: Option<i64>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Executable {
    pub name: String,
    pub uid: String,
    pub created_at: Option<DateTime<Utc>>,
    pub exe_path: String,
    pub working_dir: String,
    pub args: Vec<String>,
    /// Environment as declared in the executable spec.
    pub env: Vec<EnvVar>,
    pub annotations: BTreeMap<String, String>,
    pub status: Option<ExecutableStatus>,
}

impl Executable {
    /// Path carried by the project annotation, when this executable is a
    /// compilable project.
    pub fn project_path(&self) -> Option<&str> {
        self.annotations.get(annotations::PROJECT_PATH).map(String::as_str)
    }

    pub fn is_project(&self) -> bool {
        self.annotations.contains_key(annotations::PROJECT_PATH)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub service_name: String,
    pub address: String,
    pub port: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub owner_refs: Vec<OwnerRef>,
    pub spec: EndpointSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub spec: ServiceSpec,
}

impl Service {
    /// URI scheme for services that speak HTTP; `None` for everything else.
    /// Non-HTTP services never contribute endpoint URLs.
    pub fn http_scheme(&self) -> Option<&'static str> {
        match self.spec.protocol.as_deref() {
            Some(p) if p.eq_ignore_ascii_case("http") => Some("http"),
            Some(p) if p.eq_ignore_ascii_case("https") => Some("https"),
            _ => None,
        }
    }
}

/// Change kinds that survive the watch layer. Bookmarks and in-band error
/// events are stripped before reaching the merged channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

/// Payload of a merged-channel message: one of the four primitive kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawObject {
    Container(Container),
    Executable(Executable),
    Endpoint(Endpoint),
    Service(Service),
}

impl RawObject {
    pub fn name(&self) -> &str {
        match self {
            RawObject::Container(c) => &c.name,
            RawObject::Executable(e) => &e.name,
            RawObject::Endpoint(e) => &e.name,
            RawObject::Service(s) => &s.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RawObject::Container(_) => "Container",
            RawObject::Executable(_) => "Executable",
            RawObject::Endpoint(_) => "Endpoint",
            RawObject::Service(_) => "Service",
        }
    }
}

impl From<Container> for RawObject {
    fn from(v: Container) -> Self {
        RawObject::Container(v)
    }
}

impl From<Executable> for RawObject {
    fn from(v: Executable) -> Self {
        RawObject::Executable(v)
    }
}

impl From<Endpoint> for RawObject {
    fn from(v: Endpoint) -> Self {
        RawObject::Endpoint(v)
    }
}

impl From<Service> for RawObject {
    fn from(v: Service) -> Self {
        RawObject::Service(v)
    }
}

/// One message on the merged channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEvent {
    pub event: EventType,
    pub object: RawObject,
}

impl ResourceEvent {
    pub fn new(event: EventType, object: impl Into<RawObject>) -> Self {
        Self { event, object: object.into() }
    }
}

/// Launch-profile lookup for compilable projects. The host supplies the real
/// application model.
pub trait ApplicationModel: Send + Sync {
    /// Launch URL configured for the project at `project_path`, if any.
    fn launch_url(&self, project_path: &str) -> Option<String>;
}

/// Application model with no projects and no launch profiles.
pub struct NoLaunchProfiles;

impl ApplicationModel for NoLaunchProfiles {
    fn launch_url(&self, _project_path: &str) -> Option<String> {
        None
    }
}

pub mod prelude {
    pub use super::{
        Change, ChangeKind, Container, ContainerStatus, ContainerViewModel, Endpoint,
        EndpointSpec, EnvVar, EnvironmentVariable, EventType, Executable, ExecutableStatus,
        ExecutableViewModel, Keyed, LogSource, OwnerKind, OwnerRef, ProjectViewModel, RawObject,
        ResourceCommon, ResourceEvent, ResourceViewModel, Service, ServiceSpec,
    };
}
