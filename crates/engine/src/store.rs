//! Raw tables holding the last-seen snapshot of each primitive kind, plus the
//! associated-services reverse index. Owned exclusively by the reconciler.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use rustc_hash::FxHashMap;

use vantage_core::annotations;
use vantage_core::{Container, Endpoint, EventType, Executable, OwnerKind, Service};

#[derive(Default)]
pub(crate) struct RawStore {
    pub containers: FxHashMap<String, Container>,
    pub executables: FxHashMap<String, Executable>,
    pub endpoints: FxHashMap<String, Endpoint>,
    pub services: FxHashMap<String, Service>,
    /// `(kind, name) → service names` from the service-producer annotation.
    associated: FxHashMap<(OwnerKind, String), Vec<String>>,
}

/// Apply one event to a table. Returns whether the table changed: `Added`
/// inserts (a duplicate name is an upstream bug and fails), `Modified`
/// upserts, `Deleted` removes (false when already absent).
fn apply<T>(
    table: &mut FxHashMap<String, T>,
    event: EventType,
    name: &str,
    object: T,
) -> Result<bool> {
    match event {
        EventType::Added => {
            if table.insert(name.to_string(), object).is_some() {
                bail!("duplicate Added for {name}");
            }
            Ok(true)
        }
        EventType::Modified => {
            table.insert(name.to_string(), object);
            Ok(true)
        }
        EventType::Deleted => Ok(table.remove(name).is_some()),
    }
}

impl RawStore {
    pub fn apply_container(&mut self, event: EventType, c: Container) -> Result<bool> {
        let name = c.name.clone();
        apply(&mut self.containers, event, &name, c)
    }

    pub fn apply_executable(&mut self, event: EventType, e: Executable) -> Result<bool> {
        let name = e.name.clone();
        apply(&mut self.executables, event, &name, e)
    }

    pub fn apply_endpoint(&mut self, event: EventType, e: Endpoint) -> Result<bool> {
        let name = e.name.clone();
        apply(&mut self.endpoints, event, &name, e)
    }

    pub fn apply_service(&mut self, event: EventType, s: Service) -> Result<bool> {
        let name = s.name.clone();
        apply(&mut self.services, event, &name, s)
    }

    /// Keep the associated-services row for `(kind, name)` in line with the
    /// owner's lifecycle. An absent or unparseable annotation leaves the row
    /// untouched.
    pub fn update_associated(
        &mut self,
        kind: OwnerKind,
        name: &str,
        event: EventType,
        annotations_map: &BTreeMap<String, String>,
    ) {
        if event == EventType::Deleted {
            self.associated.remove(&(kind, name.to_string()));
            return;
        }
        if let Some(names) = annotations_map
            .get(annotations::SERVICE_PRODUCER)
            .and_then(|json| annotations::service_producers(json))
        {
            self.associated.insert((kind, name.to_string()), names);
        }
    }

    /// Owners whose producer annotation names `service_name`, in stable order.
    pub fn associated_owners(&self, service_name: &str) -> Vec<(OwnerKind, String)> {
        let mut owners: Vec<(OwnerKind, String)> = self
            .associated
            .iter()
            .filter(|(_, names)| names.iter().any(|n| n == service_name))
            .map(|((kind, name), _)| (*kind, name.clone()))
            .collect();
        owners.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()).then_with(|| a.1.cmp(&b.1)));
        owners
    }

    /// Endpoints owned by `(kind, name)`, in endpoint-name order so that
    /// derived URL lists are deterministic.
    pub fn endpoints_for(&self, kind: OwnerKind, name: &str) -> Vec<&Endpoint> {
        let mut eps: Vec<&Endpoint> = self
            .endpoints
            .values()
            .filter(|ep| {
                ep.owner_refs
                    .iter()
                    .any(|or| or.kind == kind.as_str() && or.name == name)
            })
            .collect();
        eps.sort_by(|a, b| a.name.cmp(&b.name));
        eps
    }
}
