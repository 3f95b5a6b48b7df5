//! Plan, import and metadata types exchanged with the host.
//!
//! These wrap the raw protobuf messages with JSON values instead of bytes.

use serde::{Deserialize, Serialize};

use crate::generated as proto;

/// A change to a single attribute during a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// The path to the attribute that changed.
    pub path: String,
    /// The value before the change (JSON-encoded, None if creating).
    pub before: Option<serde_json::Value>,
    /// The value after the change (JSON-encoded, None if deleting).
    pub after: Option<serde_json::Value>,
}

impl AttributeChange {
    /// Create a new attribute change.
    pub fn new(
        path: impl Into<String>,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }

    /// Create a change for a new attribute.
    pub fn added(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(path, None, Some(value))
    }

    /// Create a change for a removed attribute.
    pub fn removed(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(path, Some(value), None)
    }

    /// Create a change for a modified attribute.
    pub fn modified(
        path: impl Into<String>,
        before: serde_json::Value,
        after: serde_json::Value,
    ) -> Self {
        Self::new(path, Some(before), Some(after))
    }
}

fn to_bytes(value: Option<&serde_json::Value>) -> Vec<u8> {
    value
        .and_then(|v| serde_json::to_vec(v).ok())
        .unwrap_or_default()
}

fn from_bytes(bytes: &[u8]) -> Option<serde_json::Value> {
    if bytes.is_empty() {
        None
    } else {
        serde_json::from_slice(bytes).ok()
    }
}

impl From<proto::AttributeChange> for AttributeChange {
    fn from(change: proto::AttributeChange) -> Self {
        Self {
            before: from_bytes(&change.before),
            after: from_bytes(&change.after),
            path: change.path,
        }
    }
}

impl From<AttributeChange> for proto::AttributeChange {
    fn from(change: AttributeChange) -> Self {
        Self {
            before: to_bytes(change.before.as_ref()),
            after: to_bytes(change.after.as_ref()),
            path: change.path,
        }
    }
}

/// The result of a plan operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// The planned state after the operation.
    pub planned_state: serde_json::Value,
    /// The list of attribute changes.
    pub changes: Vec<AttributeChange>,
    /// Whether the resource requires replacement.
    pub requires_replace: bool,
}

impl PlanResult {
    /// Create a plan result with no changes.
    pub fn no_change(state: serde_json::Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
        }
    }

    /// Create a plan result with changes.
    pub fn with_changes(
        planned_state: serde_json::Value,
        changes: Vec<AttributeChange>,
        requires_replace: bool,
    ) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace,
        }
    }
}

/// An imported resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// The resource type.
    pub resource_type: String,
    /// The imported state.
    pub state: serde_json::Value,
}

impl ImportedResource {
    /// Create a new imported resource.
    pub fn new(resource_type: impl Into<String>, state: serde_json::Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

impl From<ImportedResource> for proto::ImportedResource {
    fn from(resource: ImportedResource) -> Self {
        Self {
            state: to_bytes(Some(&resource.state)),
            resource_type: resource.resource_type,
        }
    }
}

/// Provider metadata returned by GetMetadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// Resource type names.
    pub resources: Vec<String>,
    /// Server capabilities.
    pub capabilities: ServerCapabilities,
}

/// Server capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    /// Whether the provider supports planning destroy operations.
    pub plan_destroy: bool,
}

impl From<ServerCapabilities> for proto::ServerCapabilities {
    fn from(capabilities: ServerCapabilities) -> Self {
        Self {
            plan_destroy: capabilities.plan_destroy,
        }
    }
}

/// The protocol version for the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// The handshake prefix output by providers.
pub const HANDSHAKE_PREFIX: &str = "HEMMER_PROVIDER";
