//! Patch planning: merges the injection policy into a pod spec.
//!
//! The planner only ever appends (or, with a non-default collision policy,
//! skips or overwrites in place). Pre-existing volumes and mounts keep their
//! contents and relative order. Output is deterministic for a given pod and
//! policy.
//!
//! Existing entries are carried as raw JSON taken from the admitted object,
//! so fields unknown to the k8s-openapi schema are passed back untouched.
//! Only the injected entries are serialized from typed values.

use json_patch::jsonptr::PointerBuf;
use json_patch::{AddOperation, ReplaceOperation};
use serde::Serialize;
use serde_json::{Map, Value};

use super::error::AdmissionError;
use super::policy::{CollisionPolicy, InjectionPolicy};

/// JSON Patch operation kinds emitted by the planner
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchOp {
    Add,
    Replace,
}

/// Value carried by a patch operation
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PatchValue {
    Volumes(Vec<Value>),
    Containers(Vec<Value>),
}

/// One planned JSON Patch step
#[derive(Clone, Debug, PartialEq)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: PointerBuf,
    pub value: PatchValue,
}

impl PatchOperation {
    fn add(tokens: &[&str], value: PatchValue) -> Self {
        Self {
            op: PatchOp::Add,
            path: PointerBuf::from_tokens(tokens.iter().copied()),
            value,
        }
    }

    fn replace(tokens: &[&str], value: PatchValue) -> Self {
        Self {
            op: PatchOp::Replace,
            path: PointerBuf::from_tokens(tokens.iter().copied()),
            value,
        }
    }

    /// Convert into the wire representation used by kube's admission response
    pub fn to_json_patch(&self) -> Result<json_patch::PatchOperation, serde_json::Error> {
        let value = serde_json::to_value(&self.value)?;
        let path = self.path.clone();
        Ok(match self.op {
            PatchOp::Add => json_patch::PatchOperation::Add(AddOperation { path, value }),
            PatchOp::Replace => {
                json_patch::PatchOperation::Replace(ReplaceOperation { path, value })
            }
        })
    }
}

/// Plan the patch that injects `policy` into the raw pod `spec`.
///
/// Emits `add /spec/volumes` followed by `replace /spec/containers`, and
/// `replace /spec/initContainers` when init container injection is enabled and
/// the pod has any. An empty policy yields no operations.
pub fn plan(
    spec: &Map<String, Value>,
    policy: &InjectionPolicy,
) -> Result<Vec<PatchOperation>, AdmissionError> {
    if policy.is_empty() {
        return Ok(Vec::new());
    }

    let collisions = policy.on_name_collision;
    let injected_volumes = to_values(&policy.volumes)?;
    let injected_mounts = to_values(&policy.volume_mounts)?;

    let volumes = merge(
        array(spec, "volumes"),
        &injected_volumes,
        |v| key(v, "name"),
        collisions,
    )
    .map_err(|key| AdmissionError::NameCollision {
        kind: "volume",
        key,
        container: None,
    })?;

    let containers = inject_mounts(array(spec, "containers"), &injected_mounts, collisions)?;

    let mut ops = vec![
        PatchOperation::add(&["spec", "volumes"], PatchValue::Volumes(volumes)),
        PatchOperation::replace(&["spec", "containers"], PatchValue::Containers(containers)),
    ];

    let init = array(spec, "initContainers");
    if policy.inject_init_containers && !init.is_empty() {
        let init = inject_mounts(init, &injected_mounts, collisions)?;
        ops.push(PatchOperation::replace(
            &["spec", "initContainers"],
            PatchValue::Containers(init),
        ));
    }

    Ok(ops)
}

fn to_values<T: Serialize>(items: &[T]) -> Result<Vec<Value>, AdmissionError> {
    items
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<_, _>>()
        .map_err(|e| AdmissionError::ResponseEncoding(format!("could not marshal policy: {e}")))
}

/// The array stored under `field`, or an empty slice when absent or null
fn array<'a>(object: &'a Map<String, Value>, field: &str) -> &'a [Value] {
    object
        .get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn key<'a>(item: &'a Value, field: &str) -> &'a str {
    item.get(field).and_then(Value::as_str).unwrap_or_default()
}

/// Append `mounts` to every container, in container order.
fn inject_mounts(
    containers: &[Value],
    mounts: &[Value],
    collisions: CollisionPolicy,
) -> Result<Vec<Value>, AdmissionError> {
    containers
        .iter()
        .map(|container| {
            let mut container = container.clone();
            if mounts.is_empty() {
                return Ok(container);
            }
            let name = key(&container, "name").to_string();
            let Some(fields) = container.as_object_mut() else {
                return Ok(container);
            };
            let merged = merge(
                array(fields, "volumeMounts"),
                mounts,
                |m| key(m, "mountPath"),
                collisions,
            )
            .map_err(|key| AdmissionError::NameCollision {
                kind: "volumeMount",
                key,
                container: Some(name),
            })?;
            fields.insert("volumeMounts".to_string(), Value::Array(merged));
            Ok(container)
        })
        .collect()
}

/// Merge `injected` after `existing`, resolving key collisions per `policy`.
///
/// Returns the colliding key when the policy is `Reject`.
fn merge<K>(
    existing: &[Value],
    injected: &[Value],
    key: K,
    policy: CollisionPolicy,
) -> Result<Vec<Value>, String>
where
    K: for<'a> Fn(&'a Value) -> &'a str,
{
    let mut merged = existing.to_vec();
    for item in injected {
        let position = merged.iter().position(|e| key(e) == key(item));
        match (policy, position) {
            (CollisionPolicy::Append, _) | (_, None) => merged.push(item.clone()),
            (CollisionPolicy::Skip, Some(_)) => {}
            (CollisionPolicy::Replace, Some(i)) => {
                if let Some(slot) = merged.get_mut(i) {
                    *slot = item.clone();
                }
            }
            (CollisionPolicy::Reject, Some(_)) => return Err(key(item).to_string()),
        }
    }
    Ok(merged)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{EmptyDirVolumeSource, HostPathVolumeSource, Volume, VolumeMount};
    use serde_json::json;

    fn volume(name: &str) -> Volume {
        Volume {
            name: name.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        }
    }

    fn mount(name: &str, path: &str) -> VolumeMount {
        VolumeMount {
            name: name.to_string(),
            mount_path: path.to_string(),
            ..Default::default()
        }
    }

    fn policy(volumes: Vec<Volume>, mounts: Vec<VolumeMount>) -> InjectionPolicy {
        InjectionPolicy {
            volumes,
            volume_mounts: mounts,
            ..Default::default()
        }
    }

    fn spec(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other:?}"),
        }
    }

    fn values_of(op: &PatchOperation) -> &[Value] {
        match &op.value {
            PatchValue::Volumes(v) | PatchValue::Containers(v) => v,
        }
    }

    fn mount_paths(container: &Value) -> Vec<&str> {
        array(container.as_object().unwrap(), "volumeMounts")
            .iter()
            .map(|m| key(m, "mountPath"))
            .collect()
    }

    #[test]
    fn test_single_container_scenario() {
        let spec = spec(json!({"containers": [{"name": "c1", "image": "nginx"}]}));
        let policy = policy(vec![volume("v1")], vec![mount("v1", "/data")]);

        let ops = plan(&spec, &policy).unwrap();
        assert_eq!(ops.len(), 2);

        let patch: Vec<_> = ops.iter().map(|op| op.to_json_patch().unwrap()).collect();
        let value = serde_json::to_value(json_patch::Patch(patch)).unwrap();
        assert_eq!(
            value,
            json!([
                {"op": "add", "path": "/spec/volumes", "value": [{"name": "v1", "emptyDir": {}}]},
                {"op": "replace", "path": "/spec/containers", "value": [{
                    "name": "c1",
                    "image": "nginx",
                    "volumeMounts": [{"name": "v1", "mountPath": "/data"}],
                }]},
            ])
        );
    }

    #[test]
    fn test_appends_after_existing_entries() {
        let spec = spec(json!({
            "volumes": [{"name": "a", "emptyDir": {}}, {"name": "b", "emptyDir": {}}],
            "containers": [
                {"name": "c1", "volumeMounts": [{"name": "a", "mountPath": "/a"}]},
                {"name": "c2"},
            ],
        }));
        let policy = policy(
            vec![volume("x"), volume("y")],
            vec![mount("x", "/x"), mount("y", "/y")],
        );

        let ops = plan(&spec, &policy).unwrap();
        assert_eq!(ops[0].op, PatchOp::Add);
        assert_eq!(ops[0].path.as_str(), "/spec/volumes");
        let names: Vec<_> = values_of(&ops[0]).iter().map(|v| key(v, "name")).collect();
        assert_eq!(names, ["a", "b", "x", "y"]);

        assert_eq!(ops[1].op, PatchOp::Replace);
        assert_eq!(ops[1].path.as_str(), "/spec/containers");
        let containers = values_of(&ops[1]);
        assert_eq!(containers.len(), 2);
        assert_eq!(mount_paths(&containers[0]), ["/a", "/x", "/y"]);
        assert_eq!(mount_paths(&containers[1]), ["/x", "/y"]);
    }

    #[test]
    fn test_unknown_fields_are_preserved() {
        let spec = spec(json!({
            "volumes": [{"name": "a", "emptyDir": {}, "futureVolField": true}],
            "containers": [{
                "name": "c1",
                "futureField": {"nested": [1, 2]},
                "volumeMounts": [{"name": "a", "mountPath": "/a", "futureMountField": "x"}],
            }],
        }));
        let policy = policy(vec![volume("v1")], vec![mount("v1", "/data")]);

        let ops = plan(&spec, &policy).unwrap();
        let volumes = values_of(&ops[0]);
        assert_eq!(volumes[0]["futureVolField"], true);

        let container = &values_of(&ops[1])[0];
        assert_eq!(container["futureField"], json!({"nested": [1, 2]}));
        assert_eq!(container["volumeMounts"][0]["futureMountField"], "x");
        assert_eq!(container["volumeMounts"][1]["mountPath"], "/data");
    }

    #[test]
    fn test_empty_policy_emits_nothing() {
        let spec = spec(json!({"containers": [{"name": "c1"}]}));
        let ops = plan(&spec, &InjectionPolicy::default()).unwrap();
        assert!(ops.is_empty());
    }

    #[test]
    fn test_volumes_only_leaves_containers_untouched() {
        let spec = spec(json!({"containers": [{"name": "c1"}]}));
        let ops = plan(&spec, &policy(vec![volume("v1")], vec![])).unwrap();
        assert_eq!(values_of(&ops[1]), [json!({"name": "c1"})]);
    }

    #[test]
    fn test_zero_containers() {
        let spec = spec(json!({"containers": []}));
        let ops = plan(&spec, &policy(vec![volume("v1")], vec![mount("v1", "/d")])).unwrap();
        assert!(values_of(&ops[1]).is_empty());
    }

    #[test]
    fn test_append_keeps_duplicates() {
        let spec = spec(json!({
            "volumes": [{"name": "certs", "emptyDir": {}}],
            "containers": [{"name": "c1", "volumeMounts": [{"name": "certs", "mountPath": "/etc/ssl/certs"}]}],
        }));
        let injected = Volume {
            name: "certs".to_string(),
            host_path: Some(HostPathVolumeSource {
                path: "/etc/ssl/certs".to_string(),
                type_: Some("Directory".to_string()),
            }),
            ..Default::default()
        };
        let policy = policy(vec![injected], vec![mount("certs", "/etc/ssl/certs")]);

        let ops = plan(&spec, &policy).unwrap();
        assert_eq!(values_of(&ops[0]).len(), 2);
        assert_eq!(mount_paths(&values_of(&ops[1])[0]).len(), 2);
    }

    #[test]
    fn test_skip_collisions() {
        let spec = spec(json!({
            "volumes": [{"name": "certs", "emptyDir": {}}],
            "containers": [{"name": "c1", "volumeMounts": [{"name": "certs", "mountPath": "/certs"}]}],
        }));
        let mut policy = policy(
            vec![volume("certs"), volume("extra")],
            vec![mount("other", "/certs"), mount("extra", "/extra")],
        );
        policy.on_name_collision = CollisionPolicy::Skip;

        let ops = plan(&spec, &policy).unwrap();
        let names: Vec<_> = values_of(&ops[0]).iter().map(|v| key(v, "name")).collect();
        assert_eq!(names, ["certs", "extra"]);

        let mounts = &values_of(&ops[1])[0]["volumeMounts"];
        assert_eq!(mounts.as_array().unwrap().len(), 2);
        assert_eq!(mounts[0]["name"], "certs");
        assert_eq!(mounts[1]["name"], "extra");
    }

    #[test]
    fn test_replace_volume_collisions_in_place() {
        let spec = spec(json!({
            "volumes": [
                {"name": "a", "emptyDir": {}},
                {"name": "certs", "emptyDir": {}},
                {"name": "b", "emptyDir": {}},
            ],
            "containers": [{"name": "c1"}],
        }));
        let injected = Volume {
            name: "certs".to_string(),
            host_path: Some(HostPathVolumeSource {
                path: "/etc/ssl/certs".to_string(),
                type_: None,
            }),
            ..Default::default()
        };
        let mut policy = policy(vec![injected.clone()], vec![]);
        policy.on_name_collision = CollisionPolicy::Replace;

        let ops = plan(&spec, &policy).unwrap();
        let volumes = values_of(&ops[0]);
        assert_eq!(volumes.len(), 3);
        assert_eq!(volumes[1], serde_json::to_value(&injected).unwrap());
        assert_eq!(volumes[2]["name"], "b");
    }

    #[test]
    fn test_replace_mount_collisions_in_place() {
        let spec = spec(json!({
            "containers": [{
                "name": "app",
                "volumeMounts": [
                    {"name": "old", "mountPath": "/data", "readOnly": false},
                    {"name": "logs", "mountPath": "/logs"},
                ],
            }],
        }));
        let mut policy = policy(
            vec![volume("v1")],
            vec![mount("v1", "/data"), mount("v2", "/extra")],
        );
        policy.on_name_collision = CollisionPolicy::Replace;

        let ops = plan(&spec, &policy).unwrap();
        let mounts = &values_of(&ops[1])[0]["volumeMounts"];
        assert_eq!(
            mounts,
            &json!([
                {"name": "v1", "mountPath": "/data"},
                {"name": "logs", "mountPath": "/logs"},
                {"name": "v2", "mountPath": "/extra"},
            ])
        );
    }

    #[test]
    fn test_reject_collisions() {
        let spec = spec(json!({
            "containers": [{"name": "app", "volumeMounts": [{"name": "x", "mountPath": "/data"}]}],
        }));
        let mut policy = policy(vec![volume("v1")], vec![mount("v1", "/data")]);
        policy.on_name_collision = CollisionPolicy::Reject;

        match plan(&spec, &policy).unwrap_err() {
            AdmissionError::NameCollision {
                kind,
                key,
                container,
            } => {
                assert_eq!(kind, "volumeMount");
                assert_eq!(key, "/data");
                assert_eq!(container.as_deref(), Some("app"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_init_containers() {
        let spec = spec(json!({
            "containers": [{"name": "app"}],
            "initContainers": [{"name": "init", "futureField": 1}],
        }));
        let mut policy = policy(vec![volume("v1")], vec![mount("v1", "/data")]);

        // Off by default
        assert_eq!(plan(&spec, &policy).unwrap().len(), 2);

        policy.inject_init_containers = true;
        let ops = plan(&spec, &policy).unwrap();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[2].path.as_str(), "/spec/initContainers");
        let init = &values_of(&ops[2])[0];
        assert_eq!(mount_paths(init), ["/data"]);
        assert_eq!(init["futureField"], 1);
    }

    #[test]
    fn test_init_container_collisions() {
        let spec = spec(json!({
            "containers": [{"name": "app"}],
            "initContainers": [{"name": "setup", "volumeMounts": [{"name": "x", "mountPath": "/data"}]}],
        }));
        let mut policy = policy(vec![volume("v1")], vec![mount("v1", "/data")]);
        policy.inject_init_containers = true;

        policy.on_name_collision = CollisionPolicy::Skip;
        let ops = plan(&spec, &policy).unwrap();
        assert_eq!(mount_paths(&values_of(&ops[1])[0]), ["/data"]);
        assert_eq!(values_of(&ops[2])[0]["volumeMounts"][0]["name"], "x");
        assert_eq!(mount_paths(&values_of(&ops[2])[0]), ["/data"]);

        policy.on_name_collision = CollisionPolicy::Reject;
        match plan(&spec, &policy).unwrap_err() {
            AdmissionError::NameCollision { container, .. } => {
                assert_eq!(container.as_deref(), Some("setup"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_init_containers_absent() {
        let spec = spec(json!({"containers": [{"name": "app"}]}));
        let mut policy = policy(vec![volume("v1")], vec![mount("v1", "/data")]);
        policy.inject_init_containers = true;
        assert_eq!(plan(&spec, &policy).unwrap().len(), 2);
    }

    #[test]
    fn test_deterministic() {
        let spec = spec(json!({
            "volumes": [{"name": "a", "emptyDir": {}}],
            "containers": [{"name": "c1"}, {"name": "c2"}],
        }));
        let policy = policy(vec![volume("v1")], vec![mount("v1", "/data")]);

        let encode = || {
            let ops: Vec<_> = plan(&spec, &policy)
                .unwrap()
                .iter()
                .map(|op| op.to_json_patch().unwrap())
                .collect();
            serde_json::to_vec(&json_patch::Patch(ops)).unwrap()
        };
        assert_eq!(encode(), encode());
    }
}
