//! Building and encoding admission responses.

use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};

use super::error::AdmissionError;
use super::planner::PatchOperation;

/// Allow `request`, attaching `ops` as a JSON Patch.
///
/// No operations means no patch: the pod is admitted unchanged.
pub fn patched(
    request: &AdmissionRequest<DynamicObject>,
    ops: &[PatchOperation],
) -> Result<AdmissionResponse, AdmissionError> {
    let response = AdmissionResponse::from(request);
    if ops.is_empty() {
        return Ok(response);
    }

    let patch = ops
        .iter()
        .map(PatchOperation::to_json_patch)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AdmissionError::ResponseEncoding(format!("could not marshal patch: {e}")))?;

    response
        .with_patch(json_patch::Patch(patch))
        .map_err(|e| AdmissionError::ResponseEncoding(e.to_string()))
}

/// Create a denial response with reason embedded in message.
/// kube-rs deny() only sets status.message, so we format as "[reason] message"
pub fn deny_with_reason(
    request: &AdmissionRequest<DynamicObject>,
    error: &AdmissionError,
) -> AdmissionResponse {
    AdmissionResponse::from(request).deny(format!("[{}] {}", error.reason(), error))
}

/// Response for an error raised before or during planning.
///
/// `request` is `None` when the envelope itself could not be decoded.
pub fn failure(
    request: Option<&AdmissionRequest<DynamicObject>>,
    error: &AdmissionError,
) -> AdmissionResponse {
    let Some(request) = request else {
        let mut response = AdmissionResponse::invalid(format!("[{}] {}", error.reason(), error));
        if let AdmissionError::MalformedRequest { uid: Some(uid), .. } = error {
            response.uid = uid.clone();
        }
        return response;
    };
    deny_with_reason(request, error)
}

/// Serialize the outgoing envelope
pub fn encode_review(review: &AdmissionReview<DynamicObject>) -> Result<Vec<u8>, AdmissionError> {
    serde_json::to_vec(review).map_err(|e| {
        AdmissionError::ResponseEncoding(format!("could not marshal admission review: {e}"))
    })
}
