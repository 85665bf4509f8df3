//! Server-side core of the incremental ([delta](https://www.envoyproxy.io/docs/envoy/latest/api-docs/xds_protocol#incremental-xds))
//! xDS configuration distribution protocol.
//!
//! The crate implements the per-stream state machine that multiplexes one
//! bidirectional configuration stream between a configuration cache and a
//! data-plane client: subscription tracking, nonce generation and ACK/NACK
//! correlation, watch lifecycles, and stream teardown. The protobuf wire
//! types, the cache behind [`cache::ConfigWatcher`], and the gRPC transport
//! behind the [`stream`] traits are collaborators supplied by the caller.

pub mod cache;
pub mod error;
pub mod message;
pub mod resource;
pub mod server;
pub mod stream;
