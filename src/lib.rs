//! pod-volume-injector library crate
//!
//! This module exports the admission pipeline, configuration loading, and the
//! health/metrics endpoints.

pub mod config;
pub mod health;
pub mod webhooks;

pub use config::{Config, ConfigError};
pub use health::HealthState;
pub use webhooks::{
    InjectionPolicy, WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WebhookError, WebhookState,
    create_webhook_router, mutate_review, run_webhook_server,
};
