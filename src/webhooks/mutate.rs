//! The mutation pipeline: decode, extract, plan, respond.
//!
//! Pure and synchronous. Every path ends in an explicit AdmissionReview,
//! so the API server never has to fall back on its own failure policy.

use axum::http::StatusCode;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionResponse, AdmissionReview, Operation};
use tracing::{debug, error, info, warn};

use super::decoder::{decode_review, require_object};
use super::error::AdmissionError;
use super::planner::plan;
use super::pod::extract_pod;
use super::policy::InjectionPolicy;
use super::response::{failure, patched};

/// How a request ended, used for logging and metrics
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Allowed with a patch
    Patched,
    /// Allowed without a patch
    Unchanged,
    MalformedRequest,
    UnparseablePod,
    ResponseEncodingError,
    NameCollision,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Patched => "patched",
            Outcome::Unchanged => "unchanged",
            Outcome::MalformedRequest => "malformed_request",
            Outcome::UnparseablePod => "unparseable_pod",
            Outcome::ResponseEncodingError => "response_encoding_error",
            Outcome::NameCollision => "name_collision",
        }
    }

    fn from_error(error: &AdmissionError) -> Self {
        match error {
            AdmissionError::MalformedRequest { .. } => Outcome::MalformedRequest,
            AdmissionError::UnparseablePod(_) => Outcome::UnparseablePod,
            AdmissionError::ResponseEncoding(_) => Outcome::ResponseEncodingError,
            AdmissionError::NameCollision { .. } => Outcome::NameCollision,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running the pipeline on one request body
#[derive(Debug)]
pub struct Mutation {
    pub status: StatusCode,
    pub review: AdmissionReview<DynamicObject>,
    pub outcome: Outcome,
    /// Number of JSON Patch operations attached to the response
    pub patch_operations: usize,
}

impl Mutation {
    fn new(status: StatusCode, response: AdmissionResponse, outcome: Outcome) -> Self {
        Self {
            status,
            review: response.into_review(),
            outcome,
            patch_operations: 0,
        }
    }
}

/// Run the full mutation pipeline over a raw AdmissionReview body.
pub fn mutate_review(body: &[u8], policy: &InjectionPolicy) -> Mutation {
    let request = match decode_review(body) {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "Could not decode admission review");
            return Mutation::new(e.status_code(), failure(None, &e), Outcome::from_error(&e));
        }
    };

    let uid = request.uid.as_str();
    if let Err(e) = require_object(&request) {
        error!(uid = %uid, error = %e, "Could not decode admission review");
        return Mutation::new(
            e.status_code(),
            failure(Some(&request), &e),
            Outcome::from_error(&e),
        );
    }

    debug!(
        uid = %uid,
        operation = ?request.operation,
        namespace = ?request.namespace,
        "Processing admission request"
    );

    if request.operation != Operation::Create {
        debug!(uid = %uid, operation = ?request.operation, "Not a CREATE, allowing unchanged");
        return Mutation::new(
            StatusCode::OK,
            AdmissionResponse::from(&request),
            Outcome::Unchanged,
        );
    }

    let pod = match extract_pod(&request) {
        Ok(pod) => pod,
        Err(e) => {
            error!(uid = %uid, namespace = ?request.namespace, error = %e, "Could not parse pod");
            return Mutation::new(
                e.status_code(),
                failure(Some(&request), &e),
                Outcome::from_error(&e),
            );
        }
    };

    info!(
        uid = %uid,
        name = %pod.display_name(),
        namespace = %pod.display_namespace(),
        "Processing pod"
    );

    let result = plan(&pod.raw_spec, policy)
        .and_then(|ops| patched(&request, &ops).map(|response| (response, ops.len())));

    match result {
        Ok((response, 0)) => {
            info!(
                uid = %uid,
                name = %pod.display_name(),
                namespace = %pod.display_namespace(),
                "Empty injection policy, pod admitted unchanged"
            );
            Mutation::new(StatusCode::OK, response, Outcome::Unchanged)
        }
        Ok((response, ops)) => {
            info!(
                uid = %uid,
                name = %pod.display_name(),
                namespace = %pod.display_namespace(),
                patch_ops = ops,
                "Pod patched"
            );
            Mutation {
                patch_operations: ops,
                ..Mutation::new(StatusCode::OK, response, Outcome::Patched)
            }
        }
        Err(e) => {
            warn!(
                uid = %uid,
                name = %pod.display_name(),
                namespace = %pod.display_namespace(),
                reason = e.reason(),
                error = %e,
                "Admission request denied"
            );
            Mutation::new(
                e.status_code(),
                failure(Some(&request), &e),
                Outcome::from_error(&e),
            )
        }
    }
}
