//! Decoding of raw AdmissionReview payloads.

use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionReview};

use super::error::AdmissionError;

/// Decode a raw request body into an admission request.
///
/// The body must be an AdmissionReview carrying a `request` with an embedded
/// `object`. The object itself is kept untyped here so that a bad pod is
/// reported separately from a bad envelope.
pub fn decode(body: &[u8]) -> Result<AdmissionRequest<DynamicObject>, AdmissionError> {
    let request = decode_review(body)?;
    require_object(&request)?;
    Ok(request)
}

/// Decode the AdmissionReview envelope and take its `request`.
pub fn decode_review(body: &[u8]) -> Result<AdmissionRequest<DynamicObject>, AdmissionError> {
    let review: AdmissionReview<DynamicObject> = serde_json::from_slice(body)
        .map_err(|e| AdmissionError::malformed(format!("could not deserialize request: {e}")))?;

    review
        .try_into()
        .map_err(|e| AdmissionError::malformed(format!("malformed admission review: {e}")))
}

/// Fail unless `request` embeds the object under admission.
pub fn require_object(request: &AdmissionRequest<DynamicObject>) -> Result<(), AdmissionError> {
    if request.object.is_none() {
        return Err(AdmissionError::MalformedRequest {
            uid: Some(request.uid.clone()),
            message: "admission request has no object".to_string(),
        });
    }
    Ok(())
}
