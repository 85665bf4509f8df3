//! Crate-owned delta xDS message types.
//!
//! These types are codegen-agnostic and serve as the interface between the
//! stream-processing logic and whatever protobuf layer fronts it. A service
//! wrapper converts them to/from the generated envoy wire types at the edge.

use std::collections::HashMap;

use bytes::Bytes;

/// An incremental discovery request received from a client.
///
/// Carries the client's subscription changes and, on every request after the
/// first, the acknowledgement (or rejection) of the previous response via
/// [`response_nonce`](Self::response_nonce) and
/// [`error_detail`](Self::error_detail).
#[derive(Debug, Clone, Default)]
pub struct DeltaDiscoveryRequest {
    /// The node making the request. Only present on the first request of a
    /// stream; the server remembers it and reattaches it afterwards.
    pub node: Option<Node>,
    /// Type URL of the resources being requested.
    pub type_url: String,
    /// Resource names to add to the subscription.
    pub resource_names_subscribe: Vec<String>,
    /// Resource names to drop from the subscription.
    pub resource_names_unsubscribe: Vec<String>,
    /// Versions of resources the client already holds, keyed by name.
    /// Populated on the first request of a stream after a reconnect.
    pub initial_resource_versions: HashMap<String, String>,
    /// The nonce of the most recent response this request acknowledges,
    /// or empty for the first request.
    pub response_nonce: String,
    /// Error details if this is a NACK (negative acknowledgment).
    pub error_detail: Option<ErrorDetail>,
}

/// An incremental discovery response sent to a client.
#[derive(Debug, Clone, Default)]
pub struct DeltaDiscoveryResponse {
    /// Cache-assigned version of the configuration snapshot the response
    /// was built from.
    pub system_version_info: String,
    /// Added or updated resources.
    pub resources: Vec<Resource>,
    /// Names of resources removed since the client's last known versions.
    pub removed_resources: Vec<String>,
    /// Type URL of the resources.
    pub type_url: String,
    /// Nonce for this response, to be echoed back in the next request.
    /// Stamped by the server immediately before sending.
    pub nonce: String,
}

/// A single versioned resource in a delta response.
#[derive(Debug, Clone, Default)]
pub struct Resource {
    /// Resource name, unique within its type.
    pub name: String,
    /// Per-resource version descriptor.
    pub version: String,
    /// The resource payload, absent for heartbeat-style entries.
    pub resource: Option<ResourceAny>,
}

/// A resource payload wrapped as `google.protobuf.Any`.
#[derive(Debug, Clone)]
pub struct ResourceAny {
    /// Type URL of the payload.
    pub type_url: String,
    /// Serialized resource bytes.
    pub value: Bytes,
}

/// Node identification for a client.
#[derive(Debug, Clone, Default)]
pub struct Node {
    /// An opaque node identifier.
    pub id: Option<String>,
    /// The cluster the node belongs to.
    pub cluster: Option<String>,
    /// Locality specifying where the node is running.
    pub locality: Option<Locality>,
    /// Free-form string identifying the client type (e.g., "envoy", "grpc").
    pub user_agent_name: String,
    /// Version of the client.
    pub user_agent_version: String,
}

impl Node {
    /// Create a new Node with the required user agent fields.
    pub fn new(user_agent_name: impl Into<String>, user_agent_version: impl Into<String>) -> Self {
        Self {
            user_agent_name: user_agent_name.into(),
            user_agent_version: user_agent_version.into(),
            ..Self::default()
        }
    }

    /// Set the node ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the cluster.
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    /// Set the locality.
    pub fn with_locality(mut self, locality: Locality) -> Self {
        self.locality = Some(locality);
        self
    }
}

/// Locality information identifying where a node is running.
#[derive(Debug, Clone, Default)]
pub struct Locality {
    /// Region the node is in.
    pub region: String,
    /// Zone within the region.
    pub zone: String,
    /// Sub-zone within the zone.
    pub sub_zone: String,
}

/// Error details carried on a NACK request.
#[derive(Debug, Clone)]
pub struct ErrorDetail {
    /// gRPC status code.
    pub code: i32,
    /// Error message.
    pub message: String,
}
