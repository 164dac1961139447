//! Pure projection of primitives joined with services, endpoints and
//! harvested environment into dashboard view models. Everything here is a
//! function of the raw store snapshot at emission time.

use vantage_core::annotations;
use vantage_core::{
    ApplicationModel, Container, ContainerViewModel, EnvVar, EnvironmentVariable, Executable,
    ExecutableViewModel, LogSource, OwnerKind, ProjectViewModel, ResourceCommon,
};

use crate::store::RawStore;

/// Endpoint URLs for `(kind, name)` in endpoint-name order. Only endpoints
/// backed by a known HTTP service contribute; a project's launch URL is
/// appended to each.
fn endpoint_urls(
    store: &RawStore,
    kind: OwnerKind,
    name: &str,
    launch_url: Option<&str>,
) -> Vec<String> {
    let mut urls = Vec::new();
    for ep in store.endpoints_for(kind, name) {
        let Some(service) = store.services.get(&ep.spec.service_name) else {
            continue;
        };
        let Some(scheme) = service.http_scheme() else {
            continue;
        };
        let mut url = format!("{scheme}://{}:{}", ep.spec.address, ep.spec.port);
        if let Some(launch) = launch_url {
            url.push('/');
            url.push_str(launch);
        }
        urls.push(url);
    }
    urls
}

/// `None` while any declared producer service is still unobserved (rendered
/// as "Starting"); otherwise the number of declared services speaking HTTP.
fn expected_endpoints(
    store: &RawStore,
    annotations_map: &std::collections::BTreeMap<String, String>,
) -> Option<usize> {
    let mut count = 0;
    if let Some(names) = annotations_map
        .get(annotations::SERVICE_PRODUCER)
        .and_then(|json| annotations::service_producers(json))
    {
        for service_name in &names {
            let service = store.services.get(service_name)?;
            if service.http_scheme().is_some() {
                count += 1;
            }
        }
    }
    Some(count)
}

/// Project `source` against `spec_source`: keep named entries, mark the ones
/// whose name also appears in the spec, sort ascending by name (byte order,
/// locale independent).
fn environment(source: &[EnvVar], spec_source: &[EnvVar]) -> Vec<EnvironmentVariable> {
    let mut out: Vec<EnvironmentVariable> = source
        .iter()
        .filter_map(|e| {
            let name = e.name.clone()?;
            let from_spec = spec_source
                .iter()
                .any(|s| s.name.as_deref() == Some(name.as_str()));
            Some(EnvironmentVariable { name, value: e.value.clone(), from_spec })
        })
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}

pub(crate) fn container_view(
    store: &RawStore,
    c: &Container,
    cached_env: Option<&Vec<EnvVar>>,
) -> ContainerViewModel {
    let container_id = c.status.as_ref().and_then(|s| s.container_id.clone());
    // Without a harvest the spec env doubles as the effective source, so every
    // entry reads from_spec = true.
    let source = cached_env.map(Vec::as_slice).unwrap_or(&c.env);
    ContainerViewModel {
        common: ResourceCommon {
            name: c.name.clone(),
            uid: c.uid.clone(),
            namespaced_name: c.name.clone(),
            created_at: c.created_at,
            state: c.status.as_ref().and_then(|s| s.state.clone()),
            expected_endpoints_count: expected_endpoints(store, &c.annotations),
            endpoints: endpoint_urls(store, OwnerKind::Container, &c.name, None),
            environment: environment(source, &c.env),
            log_source: LogSource::Docker { container_id: container_id.clone() },
        },
        container_id,
        image: c.image.clone(),
        ports: c.ports.clone(),
    }
}

fn executable_common(store: &RawStore, e: &Executable, launch_url: Option<&str>) -> ResourceCommon {
    let status = e.status.as_ref();
    let effective = status.and_then(|s| s.effective_env.as_ref());
    let source = effective.map(Vec::as_slice).unwrap_or(&e.env);
    ResourceCommon {
        name: e.name.clone(),
        uid: e.uid.clone(),
        namespaced_name: e.name.clone(),
        created_at: e.created_at,
        state: status.and_then(|s| s.state.clone()),
        expected_endpoints_count: expected_endpoints(store, &e.annotations),
        endpoints: endpoint_urls(store, OwnerKind::Executable, &e.name, launch_url),
        environment: environment(source, &e.env),
        log_source: LogSource::Files {
            stdout: status.and_then(|s| s.stdout_path.clone()),
            stderr: status.and_then(|s| s.stderr_path.clone()),
        },
    }
}

pub(crate) fn executable_view(store: &RawStore, e: &Executable) -> ExecutableViewModel {
    ExecutableViewModel {
        common: executable_common(store, e, None),
        pid: e.status.as_ref().and_then(|s| s.pid),
        exe_path: e.exe_path.clone(),
        working_dir: e.working_dir.clone(),
        args: e.args.clone(),
    }
}

pub(crate) fn project_view(
    store: &RawStore,
    e: &Executable,
    model: &dyn ApplicationModel,
) -> ProjectViewModel {
    let project_path = e.project_path().unwrap_or_default().to_string();
    let launch_url = model.launch_url(&project_path);
    ProjectViewModel {
        common: executable_common(store, e, launch_url.as_deref()),
        pid: e.status.as_ref().and_then(|s| s.pid),
        project_path,
    }
}
