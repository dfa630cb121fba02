//! Extraction of the target pod from an admission request.

use k8s_openapi::api::core::v1::{Pod, PodSpec};
use kube::core::DynamicObject;
use kube::core::admission::AdmissionRequest;
use serde_json::{Map, Value};

use super::error::AdmissionError;

/// The pod being admitted.
///
/// Name and namespace are only carried for logging. `spec` is the typed view
/// used to validate the object; `raw_spec` is the spec exactly as admitted,
/// including fields the typed schema does not know about, and is what the
/// patch is built from.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetPod {
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub spec: PodSpec,
    pub raw_spec: Map<String, Value>,
}

impl TargetPod {
    /// Name for log lines. Pods created by controllers often only have a
    /// `generateName` at admission time.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    pub fn display_namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or("<none>")
    }
}

/// Parse the embedded object of `request` as a Pod.
pub fn extract_pod(request: &AdmissionRequest<DynamicObject>) -> Result<TargetPod, AdmissionError> {
    let object = request
        .object
        .as_ref()
        .ok_or_else(|| AdmissionError::UnparseablePod("request has no object".to_string()))?;

    let value = serde_json::to_value(object)
        .map_err(|e| AdmissionError::UnparseablePod(e.to_string()))?;
    let raw_spec = match value.get("spec") {
        Some(Value::Object(spec)) => spec.clone(),
        _ => Map::new(),
    };
    let pod: Pod =
        serde_json::from_value(value).map_err(|e| AdmissionError::UnparseablePod(e.to_string()))?;

    let spec = pod
        .spec
        .ok_or_else(|| AdmissionError::UnparseablePod("pod has no spec".to_string()))?;

    let name = pod
        .metadata
        .name
        .or_else(|| pod.metadata.generate_name.map(|prefix| format!("{prefix}*")));
    let namespace = pod.metadata.namespace.or_else(|| request.namespace.clone());

    Ok(TargetPod {
        name,
        namespace,
        spec,
        raw_spec,
    })
}
