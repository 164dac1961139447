//! Denormalized, dashboard-ready view models and the change records that
//! carry them to subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::EventType;

/// Change type attached to every delta a subscriber sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Other,
}

impl From<EventType> for ChangeKind {
    fn from(e: EventType) -> Self {
        match e {
            EventType::Added => ChangeKind::Added,
            EventType::Modified => ChangeKind::Modified,
            EventType::Deleted => ChangeKind::Deleted,
        }
    }
}

/// One delta on a monitor stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change<V> {
    pub kind: ChangeKind,
    pub value: V,
}

impl<V> Change<V> {
    pub fn new(kind: ChangeKind, value: V) -> Self {
        Self { kind, value }
    }
}

/// Where a resource's logs can be read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogSource {
    /// Container logs, addressed by runtime id once one is assigned.
    Docker { container_id: Option<String> },
    /// Process logs captured to files by the orchestrator.
    Files { stdout: Option<String>, stderr: Option<String> },
}

/// Environment entry joined against the declaring spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: Option<String>,
    /// Whether the name also appears in the resource's spec environment.
    pub from_spec: bool,
}

/// Fields shared by every view-model kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCommon {
    pub name: String,
    pub uid: String,
    pub namespaced_name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub state: Option<String>,
    /// `None` while declared producer services are still missing; subscribers
    /// render that as "Starting".
    pub expected_endpoints_count: Option<usize>,
    pub endpoints: Vec<String>,
    pub environment: Vec<EnvironmentVariable>,
    pub log_source: LogSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerViewModel {
    pub common: ResourceCommon,
    pub container_id: Option<String>,
    pub image: String,
    pub ports: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableViewModel {
    pub common: ResourceCommon,
    pub pid: Option<i64>,
    pub exe_path: String,
    pub working_dir: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectViewModel {
    pub common: ResourceCommon,
    pub pid: Option<i64>,
    pub project_path: String,
}

/// Variant carried by the aggregate stream. Per-kind streams carry the
/// refined case with an identical payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceViewModel {
    Container(ContainerViewModel),
    Executable(ExecutableViewModel),
    Project(ProjectViewModel),
}

impl ResourceViewModel {
    pub fn common(&self) -> &ResourceCommon {
        match self {
            ResourceViewModel::Container(v) => &v.common,
            ResourceViewModel::Executable(v) => &v.common,
            ResourceViewModel::Project(v) => &v.common,
        }
    }

    pub fn name(&self) -> &str {
        &self.common().name
    }
}

/// Key used by fan-out current-state maps. Names are unique within a stream.
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for ContainerViewModel {
    fn key(&self) -> &str {
        &self.common.name
    }
}

impl Keyed for ExecutableViewModel {
    fn key(&self) -> &str {
        &self.common.name
    }
}

impl Keyed for ProjectViewModel {
    fn key(&self) -> &str {
        &self.common.name
    }
}

impl Keyed for ResourceViewModel {
    fn key(&self) -> &str {
        self.name()
    }
}
