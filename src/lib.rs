//! A connection-scoped RSocket protocol engine: frame codec, stream-id allocation and
//! demultiplexing, per-interaction state machines for fire-and-forget, request/response,
//! request/stream and request/channel, reactive backpressure via `REQUEST_N`, keepalive
//! liveness, and optional LEASE admission control, layered over any frame-preserving byte
//! transport through the [`transport::DuplexConnection`] contract.

pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handler;
pub mod lease_manager;
pub mod multiplexer;
pub mod payload;
pub mod requester;
pub mod responder;
pub mod rsocket;
pub mod stream0;
pub mod stream_id;
pub mod transport;

pub use config::ConnectionConfig;
pub use error::{ErrorCode, RSocketError, Result};
pub use handler::{BoxFuture, BoxStream, RSocketHandler};
pub use payload::Payload;
pub use rsocket::{accept, connect, RSocket, Server};
