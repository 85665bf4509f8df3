//! The delta xDS stream server.
//!
//! [`DeltaServer`] owns the collaborators shared across streams (cache,
//! callbacks, shutdown signal, channel sizing) and hands each accepted
//! stream to the per-stream processor in [`delta`]. A dedicated reader task
//! drains the transport's receiving half into a channel so the processor
//! never blocks on the gRPC layer directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::Status;

use crate::cache::ConfigWatcher;
use crate::error::Result;
use crate::message::{DeltaDiscoveryRequest, DeltaDiscoveryResponse};
use crate::resource;
use crate::stream::{DeltaRequestStream, DeltaResponseSink};

mod delta;

const DEFAULT_ADS_BUFFER_SIZE: usize = 8;
const DEFAULT_XDS_BUFFER_SIZE: usize = 1;

/// Observer hooks for stream lifecycle and traffic.
///
/// A server may run without callbacks; every invocation is gated on their
/// presence.
pub trait Callbacks: Send + Sync + 'static {
    /// Called once an incremental xDS stream is open, with the stream ID and
    /// the default type URL (empty for ADS). Returning an error ends
    /// processing and closes the stream without a matching
    /// [`on_delta_stream_closed`](Self::on_delta_stream_closed).
    fn on_delta_stream_open(
        &self,
        stream_id: i64,
        type_url: &str,
    ) -> std::result::Result<(), Status>;

    /// Called immediately prior to closing an incremental xDS stream.
    fn on_delta_stream_closed(&self, stream_id: i64);

    /// Called once a request is received on a stream, after the server has
    /// normalized its node and type URL. Returning an error ends processing
    /// and closes the stream.
    fn on_stream_delta_request(
        &self,
        stream_id: i64,
        request: &DeltaDiscoveryRequest,
    ) -> std::result::Result<(), Status>;

    /// Called immediately prior to sending a response on a stream.
    fn on_stream_delta_response(
        &self,
        stream_id: i64,
        request: &DeltaDiscoveryRequest,
        response: &DeltaDiscoveryResponse,
    );
}

impl<T> Callbacks for Arc<T>
where
    T: Callbacks + ?Sized,
{
    fn on_delta_stream_open(
        &self,
        stream_id: i64,
        type_url: &str,
    ) -> std::result::Result<(), Status> {
        (**self).on_delta_stream_open(stream_id, type_url)
    }

    fn on_delta_stream_closed(&self, stream_id: i64) {
        (**self).on_delta_stream_closed(stream_id)
    }

    fn on_stream_delta_request(
        &self,
        stream_id: i64,
        request: &DeltaDiscoveryRequest,
    ) -> std::result::Result<(), Status> {
        (**self).on_stream_delta_request(stream_id, request)
    }

    fn on_stream_delta_response(
        &self,
        stream_id: i64,
        request: &DeltaDiscoveryRequest,
        response: &DeltaDiscoveryResponse,
    ) {
        (**self).on_stream_delta_response(stream_id, request, response)
    }
}

/// Handles incremental xDS streams against a configuration cache.
pub struct DeltaServer<C> {
    cache: C,
    callbacks: Option<Arc<dyn Callbacks>>,
    shutdown: CancellationToken,
    ads_buffer_size: usize,
    xds_buffer_size: usize,
}

impl<C> DeltaServer<C>
where
    C: ConfigWatcher,
{
    /// Create a server over the given configuration cache.
    pub fn new(cache: C) -> Self {
        Self {
            cache,
            callbacks: None,
            shutdown: CancellationToken::new(),
            ads_buffer_size: DEFAULT_ADS_BUFFER_SIZE,
            xds_buffer_size: DEFAULT_XDS_BUFFER_SIZE,
        }
    }

    /// Install lifecycle and traffic callbacks.
    pub fn with_callbacks(mut self, callbacks: impl Callbacks) -> Self {
        self.callbacks = Some(Arc::new(callbacks));
        self
    }

    /// Bind the server to a cancellation token. Cancelling the token ends
    /// every stream gracefully.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Change the size of the muxed response channel used by aggregated
    /// (ADS) streams from the default 8.
    ///
    /// The buffer must hold at least one response per resource type to
    /// prevent deadlock between the cache writing and the server reading
    /// requests; values below that floor are raised to it.
    pub fn with_ads_buffer_size(mut self, size: usize) -> Self {
        self.ads_buffer_size = size.max(resource::TYPE_URLS.len());
        self
    }

    /// Change the size of the response channel used by single-type streams
    /// from the default 1.
    ///
    /// Increase this to tolerate caches that can still emit a deferred
    /// response after their cancel handle has returned.
    pub fn with_xds_buffer_size(mut self, size: usize) -> Self {
        self.xds_buffer_size = size.max(1);
        self
    }

    /// Process one incremental xDS stream to completion.
    ///
    /// `responses` and `requests` are the two halves of the bidirectional
    /// stream; `default_type_url` is either a concrete resource type URL or
    /// [`resource::ANY_TYPE`] for an aggregated stream. Returns when the
    /// client hangs up, the server shuts down, or a stream-terminal error
    /// occurs.
    pub async fn delta_stream_handler<Tx, Rx>(
        &self,
        responses: Tx,
        requests: Rx,
        default_type_url: &str,
    ) -> Result<()>
    where
        Tx: DeltaResponseSink,
        Rx: DeltaRequestStream,
    {
        let (req_tx, req_rx) = mpsc::channel(1);
        let stop = Arc::new(AtomicBool::new(false));
        tokio::spawn(read_requests(requests, req_tx, Arc::clone(&stop)));

        let result = self.process_delta(responses, req_rx, default_type_url).await;

        // the reader may still be parked in recv; the flag keeps it from
        // pushing a final request nobody will read
        stop.store(true, Ordering::Release);

        result
    }
}

/// Drains the transport's receiving half into the request channel.
async fn read_requests<Rx>(
    mut stream: Rx,
    requests: mpsc::Sender<Option<DeltaDiscoveryRequest>>,
    stop: Arc<AtomicBool>,
) where
    Rx: DeltaRequestStream,
{
    loop {
        let frame = stream.recv().await;
        if stop.load(Ordering::Acquire) {
            return;
        }
        match frame {
            Ok(frame) => {
                if requests.send(frame).await.is_err() {
                    return;
                }
            }
            // end-of-stream and transport failures read the same way to the
            // processor: dropping the sender closes the request channel
            Err(_) => return,
        }
    }
}
