//! Contract between the delta server and the configuration cache.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::Result;
use crate::message::{DeltaDiscoveryRequest, DeltaDiscoveryResponse, Resource};
use crate::stream::{DeltaVersionMap, StreamState};

/// Cancels a registered delta watch.
///
/// Invoking the handle must eventually stop the watch from delivering
/// further responses on the sink it was created with. The handle is
/// consumed on invocation; the processor clears its slot once the watch's
/// response has been applied.
pub type CancelWatch = Box<dyn FnOnce() + Send>;

/// A single response produced by a delta watch.
///
/// The processor never inspects resource payloads; it needs the originating
/// request (to key its per-type state), the materialized wire response, and
/// the versioning data the next watch registration carries back to the
/// cache.
pub trait DeltaResponse: Send + Sync + 'static {
    /// The request that registered the watch this response answers.
    fn delta_request(&self) -> &DeltaDiscoveryRequest;

    /// Materialize the wire-level response. The nonce field is left empty;
    /// the processor stamps it immediately before sending.
    fn delta_discovery_response(&self) -> Result<DeltaDiscoveryResponse>;

    /// The cache-assigned version of the snapshot this response was built
    /// from.
    fn system_version(&self) -> Result<String>;

    /// The resource versions the client will track once this response is
    /// applied.
    fn delta_version_map(&self) -> Result<DeltaVersionMap>;
}

/// Source of configuration deltas.
///
/// Implementations are shared across streams and must be safe to call from
/// any of them.
pub trait ConfigWatcher: Send + Sync + 'static {
    /// Register a watch for the resources named by `request`.
    ///
    /// `state` is the stream's current knowledge for the request's type;
    /// the cache uses it to compute the next delta. Responses are delivered
    /// on `responses`, which is muxed across every type of the stream, until
    /// the returned handle is invoked. Delivery and cancellation race: a
    /// response may still arrive after the handle returns, and the caller is
    /// expected to drain it.
    fn create_delta_watch(
        &self,
        request: &DeltaDiscoveryRequest,
        responses: mpsc::Sender<Box<dyn DeltaResponse>>,
        state: StreamState,
    ) -> CancelWatch;
}

impl<T> ConfigWatcher for Arc<T>
where
    T: ConfigWatcher + ?Sized,
{
    fn create_delta_watch(
        &self,
        request: &DeltaDiscoveryRequest,
        responses: mpsc::Sender<Box<dyn DeltaResponse>>,
        state: StreamState,
    ) -> CancelWatch {
        (**self).create_delta_watch(request, responses, state)
    }
}

/// A pre-materialized delta response.
///
/// Caches that compute deltas eagerly can deliver these directly; the
/// trait methods are infallible on this type.
#[derive(Debug, Clone, Default)]
pub struct RawDeltaResponse {
    /// The request that registered the producing watch.
    pub delta_request: DeltaDiscoveryRequest,
    /// Version of the snapshot the delta was computed from.
    pub system_version_info: String,
    /// Added or updated resources.
    pub resources: Vec<Resource>,
    /// Names of removed resources.
    pub removed_resources: Vec<String>,
    /// Resource versions the client tracks after applying this response.
    pub next_version_map: DeltaVersionMap,
}

impl DeltaResponse for RawDeltaResponse {
    fn delta_request(&self) -> &DeltaDiscoveryRequest {
        &self.delta_request
    }

    fn delta_discovery_response(&self) -> Result<DeltaDiscoveryResponse> {
        Ok(DeltaDiscoveryResponse {
            system_version_info: self.system_version_info.clone(),
            resources: self.resources.clone(),
            removed_resources: self.removed_resources.clone(),
            type_url: self.delta_request.type_url.clone(),
            nonce: String::new(),
        })
    }

    fn system_version(&self) -> Result<String> {
        Ok(self.system_version_info.clone())
    }

    fn delta_version_map(&self) -> Result<DeltaVersionMap> {
        Ok(self.next_version_map.clone())
    }
}
