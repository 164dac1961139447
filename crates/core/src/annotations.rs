//! Orchestrator annotation keys and payloads consumed by the engine.
//! Keys are opaque strings agreed with the orchestrator.

use serde::Deserialize;

/// JSON array of `{"service_name": …}` naming the services a workload produces.
pub const SERVICE_PRODUCER: &str = "service-producer";

/// Marks an executable as a compilable project; the value is the project path.
pub const PROJECT_PATH: &str = "csharp-project-path";

#[derive(Debug, Deserialize)]
struct ServiceProducer {
    service_name: String,
}

/// Parse a `service-producer` payload into service names.
/// `None` when the payload is not the expected JSON shape.
pub fn service_producers(json: &str) -> Option<Vec<String>> {
    let parsed: Vec<ServiceProducer> = serde_json::from_str(json).ok()?;
    Some(parsed.into_iter().map(|p| p.service_name).collect())
}
