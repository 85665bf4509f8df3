//! Per-stream processor for incremental (delta) xDS.
//!
//! One processor exists per stream. It is the sole consumer of the muxed
//! response channel its watches deliver on, the sole writer of stream
//! state, and the sole sender on the transport. Requests arrive through the
//! channel filled by the reader task in the parent module.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use tokio::sync::{mpsc, RwLock};
use tonic::Status;
use tracing::{debug, error};

use super::DeltaServer;
use crate::cache::{CancelWatch, ConfigWatcher, DeltaResponse};
use crate::error::Result;
use crate::message::{DeltaDiscoveryRequest, Node};
use crate::resource;
use crate::stream::{DeltaResponseSink, DeltaVersionMap, StreamState};

// Stream IDs identify streams to callbacks and are never reused within a
// process lifetime.
static STREAM_COUNT: AtomicI64 = AtomicI64::new(0);

fn next_stream_id() -> i64 {
    STREAM_COUNT.fetch_add(1, Ordering::Relaxed) + 1
}

/// Per-stream watch bookkeeping across all resource types.
///
/// Opaque resources share one muxed response channel; nonces and watch
/// cancellations are indexed by type URL. The state map sits behind a
/// readers-writer lock so the in-place unsubscribe mutation stays safe
/// against asynchronous readers.
struct Watches {
    states: RwLock<HashMap<String, StreamState>>,
    nonces: HashMap<String, String>,
    cancellations: HashMap<String, Option<CancelWatch>>,
}

impl Watches {
    fn new() -> Self {
        let states = resource::TYPE_URLS
            .iter()
            .map(|url| (url.to_string(), StreamState::default()))
            .collect();
        Self {
            states: RwLock::new(states),
            nonces: HashMap::new(),
            cancellations: HashMap::new(),
        }
    }

    /// Invoke every pending cancel handle.
    fn cancel_all(&mut self) {
        for cancel in self.cancellations.values_mut() {
            if let Some(cancel) = cancel.take() {
                cancel();
            }
        }
    }
}

impl<C> DeltaServer<C>
where
    C: ConfigWatcher,
{
    pub(super) async fn process_delta<Tx>(
        &self,
        sink: Tx,
        mut requests: mpsc::Receiver<Option<DeltaDiscoveryRequest>>,
        default_type_url: &str,
    ) -> Result<()>
    where
        Tx: DeltaResponseSink,
    {
        let stream_id = next_stream_id();

        // the muxed channel needs a buffer large enough to release every
        // producer populating it
        let buffer_size = if default_type_url == resource::ANY_TYPE {
            self.ads_buffer_size
        } else {
            self.xds_buffer_size
        };
        let (responses_tx, responses_rx) = mpsc::channel(buffer_size);

        let mut processor = DeltaProcessor {
            server: self,
            sink,
            stream_id,
            stream_nonce: 0,
            default_type_url,
            node: Node::default(),
            watches: Watches::new(),
            responses_tx,
            responses_rx,
        };

        if let Some(callbacks) = &self.callbacks {
            callbacks.on_delta_stream_open(stream_id, default_type_url)?;
        }

        let result = processor.run(&mut requests).await;
        processor.teardown();
        result
    }
}

/// The single-consumer event loop of one stream.
struct DeltaProcessor<'a, C, Tx> {
    server: &'a DeltaServer<C>,
    sink: Tx,

    stream_id: i64,
    // unique nonce generator for req-resp pairs on this stream; the server
    // ignores stale nonces. Only modified within send().
    stream_nonce: i64,
    default_type_url: &'a str,
    // the node is delta-compressed on the wire and remembered here
    node: Node,

    watches: Watches,
    responses_tx: mpsc::Sender<Box<dyn DeltaResponse>>,
    responses_rx: mpsc::Receiver<Box<dyn DeltaResponse>>,
}

impl<C, Tx> DeltaProcessor<'_, C, Tx>
where
    C: ConfigWatcher,
    Tx: DeltaResponseSink,
{
    async fn run(
        &mut self,
        requests: &mut mpsc::Receiver<Option<DeltaDiscoveryRequest>>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.server.shutdown.cancelled() => {
                    debug!("received signal to end, closing delta processor");
                    return Ok(());
                }
                // the config watcher can deliver the requested resource
                // types in any order
                resp = self.responses_rx.recv() => {
                    match resp {
                        Some(resp) => self.process(resp).await?,
                        None => return Err(Status::unavailable("delta watch closed").into()),
                    }
                }
                req = requests.recv() => {
                    match req {
                        // input stream ended or errored out
                        None => return Ok(()),
                        Some(None) => return Err(Status::unavailable("empty request").into()),
                        Some(Some(req)) => self.handle_request(req).await?,
                    }
                }
            }
        }
    }

    /// Stamp the next nonce onto the materialized response and send it.
    async fn send(&mut self, resp: &dyn DeltaResponse) -> Result<String> {
        let mut out = resp.delta_discovery_response()?;

        self.stream_nonce += 1;
        out.nonce = self.stream_nonce.to_string();
        if let Some(callbacks) = &self.server.callbacks {
            callbacks.on_stream_delta_response(self.stream_id, resp.delta_request(), &out);
        }

        let nonce = out.nonce.clone();
        self.sink.send(out).await?;
        Ok(nonce)
    }

    /// Send one response and fold it into the stream state.
    async fn process(&mut self, resp: Box<dyn DeltaResponse>) -> Result<()> {
        let nonce = self.send(resp.as_ref()).await?;

        let type_url = resp.delta_request().type_url.clone();
        self.watches.nonces.insert(type_url.clone(), nonce.clone());
        // the watch that produced this response is consumed; the next
        // request for this type registers a fresh one
        self.watches.cancellations.insert(type_url.clone(), None);

        let state = StreamState {
            nonce,
            system_version: resp.system_version()?,
            resource_versions: resp.delta_version_map()?,
        };
        self.watches.states.write().await.insert(type_url, state);

        Ok(())
    }

    /// Apply every response already enqueued without blocking.
    async fn process_all(&mut self) -> Result<()> {
        while let Ok(resp) = self.responses_rx.try_recv() {
            self.process(resp).await?;
        }
        Ok(())
    }

    async fn handle_request(&mut self, mut req: DeltaDiscoveryRequest) -> Result<()> {
        // log the error detail of a NACK; the nonce check below keeps it
        // from disturbing the active watch
        if let Some(detail) = &req.error_detail {
            error!(
                "received error from client: {} (code {})",
                detail.message, detail.code
            );
        }

        // the node field is delta-compressed: present on the first request
        // only, reattached before anything else observes the request
        match &req.node {
            Some(node) => self.node = node.clone(),
            None => req.node = Some(self.node.clone()),
        }

        let nonce = req.response_nonce.clone();

        // the type URL is required on aggregated streams, implicit otherwise
        if self.default_type_url == resource::ANY_TYPE {
            if req.type_url.is_empty() {
                return Err(Status::invalid_argument("type URL is required for ADS").into());
            }
        } else if req.type_url.is_empty() {
            req.type_url = self.default_type_url.to_string();
        }

        // drop unsubscribed resources from the tracked state before the
        // watch for this type is re-registered
        if !req.resource_names_unsubscribe.is_empty() {
            let mut states = self.watches.states.write().await;
            if let Some(state) = states.get_mut(&req.type_url) {
                unsubscribe(&req.resource_names_unsubscribe, &mut state.resource_versions);
            }
        }

        if let Some(callbacks) = &self.server.callbacks {
            callbacks.on_stream_delta_request(self.stream_id, &req)?;
        }

        // re-register the watch only when the request acks the most recent
        // response for its type or the type has not been seen on this
        // stream; a NACK or stale ack leaves the current watch in place
        let type_url = req.type_url.clone();
        if let Some(last_nonce) = self.watches.nonces.get(&type_url) {
            if *last_nonce != nonce {
                return Ok(());
            }
        }

        if let Some(cancel) = self
            .watches
            .cancellations
            .get_mut(&type_url)
            .and_then(Option::take)
        {
            cancel();
            // the producer races the cancellation: apply deltas already in
            // flight before they can land against the replacement
            // subscription
            self.process_all().await?;
        }

        let state = {
            let states = self.watches.states.read().await;
            states.get(&type_url).cloned().unwrap_or_default()
        };
        let cancel = self
            .server
            .cache
            .create_delta_watch(&req, self.responses_tx.clone(), state);
        self.watches.cancellations.insert(type_url, Some(cancel));

        Ok(())
    }

    /// Runs on every exit path after a successful stream-open callback.
    fn teardown(&mut self) {
        self.watches.cancel_all();
        if let Some(callbacks) = &self.server.callbacks {
            callbacks.on_delta_stream_closed(self.stream_id);
        }
    }
}

fn unsubscribe(names: &[String], versions: &mut DeltaVersionMap) {
    for name in names {
        debug!("unsubscribing from resource: {}", name);
        versions.remove(name);
    }
}
