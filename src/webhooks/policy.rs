//! Injection policy: the volumes and mounts added to every admitted pod.

use k8s_openapi::api::core::v1::{Volume, VolumeMount};
use serde::Deserialize;

/// What to do when an injected volume or mount collides with one the pod
/// already declares.
///
/// Volumes collide by `name`, mounts collide by `mountPath` within a container.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Keep both entries and leave the conflict to API server validation
    #[default]
    Append,
    /// Keep the pod's entry and drop the injected one
    Skip,
    /// Overwrite the pod's entry in place with the injected one
    Replace,
    /// Deny the pod
    Reject,
}

impl std::fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CollisionPolicy::Append => "append",
            CollisionPolicy::Skip => "skip",
            CollisionPolicy::Replace => "replace",
            CollisionPolicy::Reject => "reject",
        };
        f.write_str(s)
    }
}

/// Process-wide injection policy.
///
/// Loaded once at startup and shared read-only between requests.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InjectionPolicy {
    /// Volumes appended to `spec.volumes`
    #[serde(default)]
    pub volumes: Vec<Volume>,
    /// Mounts appended to every container's `volumeMounts`
    #[serde(default)]
    pub volume_mounts: Vec<VolumeMount>,
    #[serde(default)]
    pub on_name_collision: CollisionPolicy,
    /// Also append mounts to init containers
    #[serde(default)]
    pub inject_init_containers: bool,
}

impl InjectionPolicy {
    /// True when the policy injects nothing at all
    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty() && self.volume_mounts.is_empty()
    }
}
