//! HTTP middleware for ops-iam-core

pub mod metrics;

pub use metrics::ObservabilityLayer;
