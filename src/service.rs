//! Service-level building blocks shared by every sub-resource handler.
//!
//! A Fastly service owns many kinds of named sub-resources (logging
//! endpoints, backends, conditions...). Each kind is implemented as a
//! [`ServiceAttributeHandler`] that contributes a nested set block to the
//! service schema and reconciles that block against the API.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::fastly::FastlyApi;
use crate::schema::Schema;

/// The flavor of a Fastly service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    /// A VCL service; logging endpoints carry placement and format fields.
    Vcl,
    /// A Compute (Wasm) service; logging is driven from application code.
    Compute,
}

impl ServiceType {
    /// The host resource type name for this service flavor.
    pub fn resource_type(self) -> &'static str {
        match self {
            ServiceType::Vcl => "fastly_service_vcl",
            ServiceType::Compute => "fastly_service_compute",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceType::Vcl => f.write_str("vcl"),
            ServiceType::Compute => f.write_str("compute"),
        }
    }
}

/// Metadata handed to every handler of a service resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceMetadata {
    /// The service flavor.
    pub service_type: ServiceType,
}

impl ServiceMetadata {
    /// Metadata for a service of the given type.
    pub fn new(service_type: ServiceType) -> Self {
        Self { service_type }
    }

    /// Whether the service is a VCL service.
    pub fn is_vcl(&self) -> bool {
        self.service_type == ServiceType::Vcl
    }
}

/// The service version a reconciliation pass writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceVersion {
    /// Fastly service ID.
    pub service_id: String,
    /// Version number within the service.
    pub version: u32,
}

impl ServiceVersion {
    /// Create a new service version reference.
    pub fn new(service_id: impl Into<String>, version: u32) -> Self {
        Self {
            service_id: service_id.into(),
            version,
        }
    }
}

impl fmt::Display for ServiceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.service_id, self.version)
    }
}

/// A sub-resource integration attached to a service.
///
/// Records passed to [`process`](Self::process) are the JSON objects of the
/// handler's nested set block, already normalized against its schema.
#[async_trait]
pub trait ServiceAttributeHandler: Send + Sync {
    /// Name of the nested block this handler owns (e.g. `logging_kafka`).
    fn key(&self) -> &'static str;

    /// Metadata of the service this handler was built for.
    fn service_metadata(&self) -> &ServiceMetadata;

    /// Add the handler's block to the service schema.
    fn register(&self, schema: Schema) -> Schema;

    /// Reconcile the remote service version from `old` to `new`.
    async fn process(
        &self,
        api: &dyn FastlyApi,
        version: &ServiceVersion,
        old: &[Value],
        new: &[Value],
    ) -> Result<(), ProviderError>;

    /// Read the handler's records back from the API.
    async fn read(
        &self,
        api: &dyn FastlyApi,
        version: &ServiceVersion,
    ) -> Result<Vec<Value>, ProviderError>;
}
