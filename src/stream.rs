//! Stream transport contract and per-type subscription state.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::message::{DeltaDiscoveryRequest, DeltaDiscoveryResponse};

/// Versions of the resources a client currently tracks, keyed by resource
/// name. The version descriptors are opaque to the server.
pub type DeltaVersionMap = HashMap<String, String>;

/// Per-type subscription state of one stream.
///
/// One entry exists per resource type; the processor replaces it whenever a
/// response for that type is applied, and the cache receives a copy of the
/// current entry when a watch is registered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamState {
    /// Nonce of the most recent response sent for this type, empty if none.
    pub nonce: String,
    /// Cache-assigned system version of the last applied response, empty if
    /// none.
    pub system_version: String,
    /// The client's currently-known resource versions.
    pub resource_versions: DeltaVersionMap,
}

/// Receiving half of a delta stream.
///
/// This abstraction keeps the processor independent of the gRPC layer: a
/// tonic service wraps its inbound `Streaming` in an implementation of this
/// trait, and tests drive the processor over channels.
pub trait DeltaRequestStream: Send + 'static {
    /// Receive the next request frame from the client.
    ///
    /// An error means the client ended the stream; end-of-stream and
    /// transport failures are not distinguished. `Ok(None)` is a frame that
    /// carried no message, which the server rejects as a protocol error.
    fn recv(&mut self) -> impl Future<Output = Result<Option<DeltaDiscoveryRequest>>> + Send;
}

/// Sending half of a delta stream.
pub trait DeltaResponseSink: Send + 'static {
    /// Send a response to the client.
    fn send(&mut self, response: DeltaDiscoveryResponse) -> impl Future<Output = Result<()>> + Send;
}

/// Outbound half of the tonic bidi-streaming idiom: the service hands the
/// processor the sender of the channel whose receiver backs the response
/// stream returned to the client.
impl DeltaResponseSink for mpsc::Sender<DeltaDiscoveryResponse> {
    async fn send(&mut self, response: DeltaDiscoveryResponse) -> Result<()> {
        mpsc::Sender::send(self, response)
            .await
            .map_err(|_| Error::StreamClosed)
    }
}
