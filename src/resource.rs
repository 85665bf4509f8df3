//! Well-known xDS resource type URLs.

/// Type URL for endpoint assignments.
pub const ENDPOINT_TYPE: &str =
    "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";

/// Type URL for clusters.
pub const CLUSTER_TYPE: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";

/// Type URL for route configurations.
pub const ROUTE_TYPE: &str = "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";

/// Type URL for listeners.
pub const LISTENER_TYPE: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";

/// Type URL for transport socket secrets.
pub const SECRET_TYPE: &str =
    "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.Secret";

/// Type URL for runtime layers.
pub const RUNTIME_TYPE: &str = "type.googleapis.com/envoy.service.runtime.v3.Runtime";

/// The default type URL of an aggregated (ADS) stream, on which every
/// request must name its own type URL.
pub const ANY_TYPE: &str = "";

/// The closed set of well-known resource types. Per-stream state is
/// pre-populated with one entry for each.
pub const TYPE_URLS: [&str; 6] = [
    ENDPOINT_TYPE,
    CLUSTER_TYPE,
    ROUTE_TYPE,
    LISTENER_TYPE,
    SECRET_TYPE,
    RUNTIME_TYPE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_urls_are_distinct() {
        for (i, url) in TYPE_URLS.iter().enumerate() {
            assert!(!url.is_empty());
            assert!(!TYPE_URLS[i + 1..].contains(url));
        }
    }
}
