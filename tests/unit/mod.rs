// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Black-box tests for the mutation pipeline.
//!
//! These tests feed raw AdmissionReview bodies through `mutate_review` and
//! apply the returned JSON Patch to the original pod, without a cluster.

#[path = "../common/mod.rs"]
mod common;

use common::fixtures::*;

mod pipeline_tests {
    use super::*;
    use axum::http::StatusCode;
    use pod_volume_injector::mutate_review;
    use pod_volume_injector::webhooks::response::encode_review;
    use pod_volume_injector::webhooks::{AdmissionResponse, Mutation, Outcome};

    fn response(mutation: &Mutation) -> &AdmissionResponse {
        mutation.review.response.as_ref().unwrap()
    }

    #[test]
    fn test_example_scenario() {
        let pod = PodBuilder::new("web")
            .namespace("default")
            .container("c1", &[])
            .build();
        let policy = policy(vec![empty_dir("v1")], vec![mount("v1", "/data")]);

        let mutation = mutate_review(&review_body("uid-1", "CREATE", &pod), &policy);
        assert_eq!(mutation.status, StatusCode::OK);
        assert_eq!(mutation.outcome, Outcome::Patched);

        let response = response(&mutation);
        assert_eq!(response.uid, "uid-1");
        assert!(response.allowed);

        let patch: serde_json::Value =
            serde_json::from_slice(response.patch.as_ref().unwrap()).unwrap();
        assert_eq!(patch[0]["op"], "add");
        assert_eq!(patch[0]["path"], "/spec/volumes");
        assert_eq!(
            patch[0]["value"],
            serde_json::json!([{"name": "v1", "emptyDir": {}}])
        );
        assert_eq!(patch[1]["op"], "replace");
        assert_eq!(patch[1]["path"], "/spec/containers");
        assert_eq!(patch[1]["value"][0]["name"], "c1");
        assert_eq!(
            patch[1]["value"][0]["volumeMounts"],
            serde_json::json!([{"name": "v1", "mountPath": "/data"}])
        );
    }

    #[test]
    fn test_patch_applies_cleanly() {
        let pod = PodBuilder::new("web")
            .volume(empty_dir("cache"))
            .container("app", &[mount("cache", "/cache")])
            .container("sidecar", &[])
            .build();
        let policy = policy(
            vec![empty_dir("certs")],
            vec![mount("certs", "/etc/ssl/certs")],
        );

        let mutation = mutate_review(&review_body("uid-2", "CREATE", &pod), &policy);
        let patched = apply_response_patch(&pod, response(&mutation)).unwrap();
        let spec = spec(&patched);

        let volumes: Vec<_> = spec
            .volumes
            .as_ref()
            .unwrap()
            .iter()
            .map(|v| v.name.as_str())
            .collect();
        assert_eq!(volumes, ["cache", "certs"]);

        let app = spec.containers[0].volume_mounts.as_ref().unwrap();
        assert_eq!(app, &vec![mount("cache", "/cache"), mount("certs", "/etc/ssl/certs")]);
        let sidecar = spec.containers[1].volume_mounts.as_ref().unwrap();
        assert_eq!(sidecar, &vec![mount("certs", "/etc/ssl/certs")]);

        // Everything outside volumes and mounts is untouched
        assert_eq!(patched.metadata, pod.metadata);
        assert_eq!(spec.containers[1].image, crate::spec(&pod).containers[1].image);
    }

    #[test]
    fn test_v1beta1_envelope_is_mirrored() {
        let pod = PodBuilder::new("web").container("c1", &[]).build();
        let policy = policy(vec![empty_dir("v1")], vec![mount("v1", "/data")]);
        let body = review_body_versioned(
            "admission.k8s.io/v1beta1",
            "uid-5",
            "CREATE",
            serde_json::to_value(&pod).unwrap(),
        );

        let mutation = mutate_review(&body, &policy);
        assert_eq!(mutation.outcome, Outcome::Patched);

        let encoded = encode_review(&mutation.review).unwrap();
        let review: serde_json::Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(review["apiVersion"], "admission.k8s.io/v1beta1");
        assert_eq!(review["kind"], "AdmissionReview");
        assert_eq!(review["response"]["uid"], "uid-5");
        assert_eq!(review["response"]["allowed"], true);
        assert_eq!(review["response"]["patchType"], "JSONPatch");
    }

    #[test]
    fn test_unknown_fields_survive_patch() {
        let body = review_body_raw(
            "uid-6",
            "CREATE",
            serde_json::json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {"name": "web"},
                "spec": {
                    "volumes": [{"name": "a", "emptyDir": {}, "futureVolField": true}],
                    "containers": [{
                        "name": "c1",
                        "futureField": {"enabled": true},
                        "volumeMounts": [{"name": "a", "mountPath": "/a", "futureMountField": "x"}],
                    }],
                },
            }),
        );
        let policy = policy(vec![empty_dir("v1")], vec![mount("v1", "/data")]);

        let mutation = mutate_review(&body, &policy);
        let patch: serde_json::Value =
            serde_json::from_slice(response(&mutation).patch.as_ref().unwrap()).unwrap();
        assert_eq!(
            patch[0]["value"],
            serde_json::json!([
                {"name": "a", "emptyDir": {}, "futureVolField": true},
                {"name": "v1", "emptyDir": {}},
            ])
        );
        assert_eq!(
            patch[1]["value"],
            serde_json::json!([{
                "name": "c1",
                "futureField": {"enabled": true},
                "volumeMounts": [
                    {"name": "a", "mountPath": "/a", "futureMountField": "x"},
                    {"name": "v1", "mountPath": "/data"},
                ],
            }])
        );
    }

    #[test]
    fn test_delete_is_not_mutated() {
        let pod = PodBuilder::new("web").container("c1", &[]).build();
        let policy = policy(vec![empty_dir("v1")], vec![mount("v1", "/data")]);

        let mutation = mutate_review(&review_body("uid-3", "DELETE", &pod), &policy);
        assert_eq!(mutation.outcome, Outcome::Unchanged);
        assert!(response(&mutation).allowed);
        assert!(response(&mutation).patch.is_none());
    }

    #[test]
    fn test_malformed_envelope_never_allows() {
        let policy = policy(vec![empty_dir("v1")], vec![mount("v1", "/data")]);

        let bodies: [&[u8]; 4] = [b"", b"{", b"null", b"{\"kind\":\"AdmissionReview\"}"];
        for body in bodies {
            let mutation = mutate_review(body, &policy);
            assert_eq!(mutation.status, StatusCode::BAD_REQUEST);
            assert_eq!(mutation.outcome, Outcome::MalformedRequest);
            let response = response(&mutation);
            assert!(!response.allowed);
            assert!(response.patch.is_none());
        }
    }

    #[test]
    fn test_unparseable_pod_denied_with_uid() {
        let body = review_body_raw(
            "uid-4",
            "CREATE",
            serde_json::json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {"name": "web"},
                "spec": {"volumes": "nope", "containers": []},
            }),
        );
        let policy = policy(vec![empty_dir("v1")], vec![]);

        let mutation = mutate_review(&body, &policy);
        assert_eq!(mutation.status, StatusCode::OK);
        assert_eq!(mutation.outcome, Outcome::UnparseablePod);
        let response = response(&mutation);
        assert_eq!(response.uid, "uid-4");
        assert!(!response.allowed);
        assert!(response.result.message.contains("UnparseablePod"));
    }
}

mod config_tests {
    use pod_volume_injector::Config;
    use pod_volume_injector::webhooks::CollisionPolicy;

    #[test]
    fn test_policy_from_config_drives_pipeline() {
        let config = Config::from_yaml(
            r#"
volumes:
  - name: etc-ssl-certs
    hostPath:
      path: /etc/ssl/certs
volumeMounts:
  - name: etc-ssl-certs
    mountPath: /etc/ssl/certs
    readOnly: true
onNameCollision: reject
injectInitContainers: true
"#,
        )
        .unwrap();

        assert_eq!(config.policy.on_name_collision, CollisionPolicy::Reject);
        assert!(config.policy.inject_init_containers);
        assert_eq!(config.http.listen_address, ":8080");
    }
}
