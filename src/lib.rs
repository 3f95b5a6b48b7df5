//! Hemmer provider for Fastly logging endpoints
//!
//! This crate is both the library behind the `hemmer-provider-fastly` binary
//! and a toolkit for testing it in-process.
//!
//! # Overview
//!
//! - **Resources**: `fastly_service_vcl` and `fastly_service_compute`, each
//!   addressing one service version and carrying a set of `logging_kafka`
//!   blocks
//! - **Set diff**: [`setdiff`] partitions old and new block sets by name into
//!   added, deleted and modified records
//! - **Handlers**: each nested block type is a
//!   [`ServiceAttributeHandler`](service::ServiceAttributeHandler); see
//!   [`logging_kafka`]
//! - **Fastly API**: [`fastly::FastlyApi`] and its `reqwest` implementation
//! - **Protocol**: the gRPC server in [`server`] with the stdout handshake
//!
//! # Example
//!
//! ```hcl
//! resource "fastly_service_vcl" "cdn" {
//!   service_id = "SU1Z0isxPaozGVKXdv0eY"
//!   version    = 3
//!
//!   logging_kafka {
//!     name    = "kafka-logs"
//!     topic   = "cdn-requests"
//!     brokers = "broker-1:9092,broker-2:9092"
//!     use_tls = true
//!   }
//! }
//! ```
//!
//! # Handshake Protocol
//!
//! When the provider starts via [`serve`], it prints a handshake line to stdout:
//!
//! ```text
//! HEMMER_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `HEMMER_PROVIDER|<protocol_version>|<address>`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod fastly;
pub mod logging;
pub mod logging_kafka;
pub mod provider;
pub mod schema;
pub mod server;
pub mod service;
pub mod setdiff;
pub mod testing;
pub mod types;
pub mod validation;

/// Types generated from `proto/provider.proto`.
#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated {
    tonic::include_proto!("hemmer.provider.v1");
}

pub use config::ProviderConfig;
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::FastlyProvider;
pub use schema::ProviderSchema;
pub use server::{
    serve, serve_on, serve_on_with_options, serve_with_options, ProviderService, ServeOptions,
};
pub use setdiff::{DiffError, DiffResult, SetDiff};
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities,
    HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};
pub use validation::{is_valid, validate, validate_result};

pub use async_trait::async_trait;
pub use serde_json;
