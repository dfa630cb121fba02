//! Test fixtures and builder patterns for pods and AdmissionReviews.

use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, Pod, PodSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use pod_volume_injector::InjectionPolicy;
use pod_volume_injector::webhooks::AdmissionResponse;
use serde_json::{Map, Value, json};

/// Builder for creating Pod test fixtures.
///
/// # Example
/// ```ignore
/// let pod = PodBuilder::new("web")
///     .namespace("prod")
///     .volume(empty_dir("cache"))
///     .container("app", &[mount("cache", "/cache")])
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct PodBuilder {
    name: String,
    namespace: Option<String>,
    volumes: Vec<Volume>,
    containers: Vec<Container>,
    init_containers: Vec<Container>,
}

impl PodBuilder {
    /// Create a new builder with the given pod name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            volumes: Vec::new(),
            containers: Vec::new(),
            init_containers: Vec::new(),
        }
    }

    /// Set the namespace for the pod.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Add a pod volume.
    pub fn volume(mut self, volume: Volume) -> Self {
        self.volumes.push(volume);
        self
    }

    /// Add a container with the given mounts (none means `volumeMounts` is unset).
    pub fn container(mut self, name: &str, mounts: &[VolumeMount]) -> Self {
        self.containers.push(container(name, mounts));
        self
    }

    /// Add an init container with the given mounts.
    pub fn init_container(mut self, name: &str, mounts: &[VolumeMount]) -> Self {
        self.init_containers.push(container(name, mounts));
        self
    }

    /// Build the Pod.
    pub fn build(self) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: self.namespace,
                ..Default::default()
            },
            spec: Some(PodSpec {
                volumes: if self.volumes.is_empty() {
                    None
                } else {
                    Some(self.volumes)
                },
                containers: self.containers,
                init_containers: if self.init_containers.is_empty() {
                    None
                } else {
                    Some(self.init_containers)
                },
                ..Default::default()
            }),
            status: None,
        }
    }
}

fn container(name: &str, mounts: &[VolumeMount]) -> Container {
    Container {
        name: name.to_string(),
        image: Some("registry.k8s.io/pause:3.9".to_string()),
        volume_mounts: if mounts.is_empty() {
            None
        } else {
            Some(mounts.to_vec())
        },
        ..Default::default()
    }
}

/// An emptyDir volume.
pub fn empty_dir(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

/// A volume mount.
pub fn mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        ..Default::default()
    }
}

/// Injection policy with the default collision handling.
pub fn policy(volumes: Vec<Volume>, mounts: Vec<VolumeMount>) -> InjectionPolicy {
    InjectionPolicy {
        volumes,
        volume_mounts: mounts,
        ..Default::default()
    }
}

/// Serialize an `admission.k8s.io/v1` AdmissionReview carrying `object`.
pub fn review_body(uid: &str, operation: &str, object: &Pod) -> Vec<u8> {
    review_body_raw(uid, operation, serde_json::to_value(object).unwrap_or(Value::Null))
}

/// Serialize an `admission.k8s.io/v1` AdmissionReview around an arbitrary object value.
pub fn review_body_raw(uid: &str, operation: &str, object: Value) -> Vec<u8> {
    review_body_versioned("admission.k8s.io/v1", uid, operation, object)
}

/// Serialize an AdmissionReview of the given `apiVersion` around `object`.
pub fn review_body_versioned(api_version: &str, uid: &str, operation: &str, object: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "apiVersion": api_version,
        "kind": "AdmissionReview",
        "request": {
            "uid": uid,
            "kind": {"group": "", "version": "v1", "kind": "Pod"},
            "resource": {"group": "", "version": "v1", "resource": "pods"},
            "requestKind": {"group": "", "version": "v1", "kind": "Pod"},
            "requestResource": {"group": "", "version": "v1", "resource": "pods"},
            "namespace": "default",
            "operation": operation,
            "userInfo": {"username": "system:admin", "groups": ["system:masters"]},
            "object": object,
            "dryRun": false,
        },
    }))
    .unwrap_or_default()
}

/// Apply the patch carried by `response` to `pod` and return the result.
pub fn apply_response_patch(pod: &Pod, response: &AdmissionResponse) -> Result<Pod, String> {
    let patch_bytes = response.patch.as_ref().ok_or("response carries no patch")?;
    let patch: json_patch::Patch =
        serde_json::from_slice(patch_bytes).map_err(|e| format!("invalid patch: {e}"))?;

    let mut document = serde_json::to_value(pod).map_err(|e| e.to_string())?;
    json_patch::patch(&mut document, &patch).map_err(|e| format!("patch failed: {e}"))?;
    serde_json::from_value(document).map_err(|e| format!("patched pod invalid: {e}"))
}

/// Pod spec of `pod`, panicking in tests if absent.
pub fn spec(pod: &Pod) -> &PodSpec {
    match pod.spec.as_ref() {
        Some(spec) => spec,
        None => panic!("pod has no spec"),
    }
}

/// Pod spec of `pod` as the JSON object the API server would send.
pub fn raw_spec(pod: &Pod) -> Map<String, Value> {
    match serde_json::to_value(spec(pod)) {
        Ok(Value::Object(spec)) => spec,
        _ => panic!("pod spec is not a JSON object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let pod = PodBuilder::new("test").build();
        assert_eq!(pod.metadata.name, Some("test".to_string()));
        let spec = spec(&pod);
        assert!(spec.volumes.is_none());
        assert!(spec.containers.is_empty());
    }
}
