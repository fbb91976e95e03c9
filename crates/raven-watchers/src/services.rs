//! Services watch profile: `/api/v1/services?watch=true`.

use async_trait::async_trait;
use serde_json::{Map, Value};

use raven_core::endpoint::WatchEndpoint;
use raven_core::error::WatchError;
use raven_core::event::{EventKind, WatchEvent};
use raven_core::handler::Translate;

pub const RESOURCE: &str = "services";

pub fn endpoint(api_root: &str) -> Result<WatchEndpoint, WatchError> {
    WatchEndpoint::for_resource(api_root, RESOURCE)
}

/// The fields of a Service notification that downstream translation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSummary<'a> {
    pub kind: EventKind,
    pub name: Option<&'a str>,
    pub namespace: Option<&'a str>,
    pub cluster_ip: Option<&'a str>,
    pub service_type: Option<&'a str>,
    pub ports: Vec<(Option<&'a str>, u64)>,
}

impl<'a> ServiceSummary<'a> {
    pub fn from_event(event: &'a Map<String, Value>) -> Self {
        let ev = WatchEvent::from_object(event);
        let spec = ev.object.get("spec");
        let ports: Vec<(Option<&str>, u64)> = spec
            .and_then(|s| s.get("ports"))
            .and_then(Value::as_array)
            .map(|ports| {
                ports
                    .iter()
                    .filter_map(|p| {
                        let port = p.get("port")?.as_u64()?;
                        Some((p.get("protocol").and_then(Value::as_str), port))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            name: ev.name(),
            namespace: ev.namespace(),
            cluster_ip: spec.and_then(|s| s.get("clusterIP")).and_then(Value::as_str),
            service_type: spec.and_then(|s| s.get("type")).and_then(Value::as_str),
            ports,
            kind: ev.kind,
        }
    }
}

/// Translates Service notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServicesTranslator;

#[async_trait]
impl Translate for ServicesTranslator {
    async fn translate(&self, event: &Map<String, Value>) -> Result<(), WatchError> {
        let svc = ServiceSummary::from_event(event);
        tracing::debug!(
            event_type = %svc.kind,
            name = svc.name.unwrap_or("-"),
            namespace = svc.namespace.unwrap_or("-"),
            cluster_ip = svc.cluster_ip.unwrap_or("-"),
            service_type = svc.service_type.unwrap_or("-"),
            ports = svc.ports.len(),
            "Service notification"
        );
        tracing::trace!(event = ?event, "Service notification body");
        Ok(())
    }
}
