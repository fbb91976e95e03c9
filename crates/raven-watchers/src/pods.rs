//! Pods watch profile: `/api/v1/pods?watch=true`.

use async_trait::async_trait;
use serde_json::{Map, Value};

use raven_core::endpoint::WatchEndpoint;
use raven_core::error::WatchError;
use raven_core::event::{EventKind, WatchEvent};
use raven_core::handler::Translate;

pub const RESOURCE: &str = "pods";

pub fn endpoint(api_root: &str) -> Result<WatchEndpoint, WatchError> {
    WatchEndpoint::for_resource(api_root, RESOURCE)
}

/// The fields of a Pod notification that downstream translation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSummary<'a> {
    pub kind: EventKind,
    pub name: Option<&'a str>,
    pub namespace: Option<&'a str>,
    pub phase: Option<&'a str>,
    pub pod_ip: Option<&'a str>,
    pub node: Option<&'a str>,
}

impl<'a> PodSummary<'a> {
    pub fn from_event(event: &'a Map<String, Value>) -> Self {
        let ev = WatchEvent::from_object(event);
        let status = ev.object.get("status");
        Self {
            name: ev.name(),
            namespace: ev.namespace(),
            phase: status.and_then(|s| s.get("phase")).and_then(Value::as_str),
            pod_ip: status.and_then(|s| s.get("podIP")).and_then(Value::as_str),
            node: ev
                .object
                .get("spec")
                .and_then(|s| s.get("nodeName"))
                .and_then(Value::as_str),
            kind: ev.kind,
        }
    }
}

/// Translates Pod notifications. Currently records them; port wiring
/// against the network API hooks in here.
#[derive(Debug, Clone, Copy, Default)]
pub struct PodsTranslator;

#[async_trait]
impl Translate for PodsTranslator {
    async fn translate(&self, event: &Map<String, Value>) -> Result<(), WatchError> {
        let pod = PodSummary::from_event(event);
        tracing::debug!(
            event_type = %pod.kind,
            name = pod.name.unwrap_or("-"),
            namespace = pod.namespace.unwrap_or("-"),
            phase = pod.phase.unwrap_or("-"),
            pod_ip = pod.pod_ip.unwrap_or("-"),
            node = pod.node.unwrap_or("-"),
            "Pod notification"
        );
        tracing::trace!(event = ?event, "Pod notification body");
        Ok(())
    }
}
