//! Mutating admission webhook for pods.
//!
//! A request flows through four stages:
//! - `decoder`: raw AdmissionReview bytes to an admission request
//! - `pod`: the embedded object validated as a Pod, keeping its raw spec
//! - `planner`: injection policy merged into the raw pod spec as JSON Patch operations
//! - `response`: patch and request UID packaged into an AdmissionReview

pub mod decoder;
pub mod error;
pub mod mutate;
pub mod planner;
pub mod pod;
pub mod policy;
pub mod response;
mod server;

pub use error::AdmissionError;
pub use mutate::{Mutation, Outcome, mutate_review};
pub use planner::{PatchOp, PatchOperation, PatchValue, plan};
pub use policy::{CollisionPolicy, InjectionPolicy};
pub use server::{
    WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WebhookError, WebhookState, create_webhook_router,
    run_webhook_server,
};

// Re-export kube-rs admission types for contract testing
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
