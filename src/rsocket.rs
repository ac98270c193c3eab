//! The public facade: [`connect`]/[`accept`] plus the [`RSocket`] handle
//! they return. `RSocket` holds no protocol state of its own — every call delegates
//! straight through to the Requester or the transport behind a cheap `Arc` clone.

use std::sync::Arc;

use futures_core::Stream;

use crate::config::ConnectionConfig;
use crate::connection::{drive_connection, ConnectionShared};
use crate::error::Result;
use crate::frame::Frame;
use crate::handler::RSocketHandler;
use crate::payload::Payload;
use crate::requester::Requester;
use crate::responder::Responder;
use crate::stream0::Stream0Handler;
use crate::stream_id::{Parity, StreamIdSupplier};
use crate::transport::{DuplexConnection, OutboundQueue};

/// The handler an initiator connection is bound with: it never serves peer-initiated
/// interactions, so every method keeps the default `Rejected`/no-op behavior.
struct NoopHandler;
impl RSocketHandler for NoopHandler {}

/// A live RSocket connection. Works identically whether obtained from [`connect`] or
/// [`accept`] — both sides of a connection may originate requests and may be asked to
/// serve them, the asymmetry is only in which end sent `SETUP`.
pub struct RSocket<T: DuplexConnection> {
    shared: Arc<ConnectionShared<T>>,
}

/// The acceptor-side alias named in the external interface table; identical to
/// [`RSocket`] in shape, since either side can originate an interaction.
pub type Server<T> = RSocket<T>;

impl<T: DuplexConnection> Clone for RSocket<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: DuplexConnection> RSocket<T> {
    pub async fn fire_and_forget(&self, payload: Payload) -> Result<()> {
        self.shared.requester.fire_and_forget(payload).await
    }

    pub async fn request_response(&self, payload: Payload) -> Result<Payload> {
        self.shared.requester.request_response(payload).await
    }

    /// `initial_n` is the caller's real downstream demand, sent as the wire frame's
    /// `initial_request_n` rather than some fixed default.
    pub async fn request_stream(
        &self,
        payload: Payload,
        initial_n: u32,
    ) -> Result<impl Stream<Item = Result<Payload>>> {
        self.shared.requester.request_stream(payload, initial_n).await
    }

    /// `initial_n` is the caller's real downstream demand for the peer's output half.
    pub async fn request_channel(
        &self,
        payloads: impl Stream<Item = Result<Payload>> + Send + Unpin + 'static,
        initial_n: u32,
    ) -> Result<impl Stream<Item = Result<Payload>>> {
        self.shared.requester.request_channel(payloads, initial_n).await
    }

    pub async fn metadata_push(&self, payload: Payload) -> Result<()> {
        self.shared.requester.metadata_push(payload).await
    }

    pub async fn close(&self) -> Result<()> {
        self.shared.transport.close().await
    }

    pub async fn on_close(&self) {
        self.shared.transport.on_close().await
    }

    pub fn availability(&self) -> f64 {
        self.shared.transport.availability()
    }
}

/// Establishes the initiator side of a connection: sends `SETUP` immediately (this side
/// never awaits an acceptance frame) and starts the connection driver task.
pub fn connect<T: DuplexConnection>(transport: Arc<T>, config: ConnectionConfig) -> RSocket<T> {
    let local_parity = Parity::for_setup_sender();
    let stream0 = Stream0Handler::new_active(config);
    let (outbound, outbound_rx) = OutboundQueue::new();
    let outbound = Arc::new(outbound);
    let lease = stream0.lease_manager_handle();

    let requester = Arc::new(Requester::new(
        outbound.clone(),
        StreamIdSupplier::new(local_parity),
        lease.clone(),
    ));
    let responder = Arc::new(Responder::new(outbound.clone(), Arc::new(NoopHandler), lease));

    let setup = stream0.make_setup_frame(None, None, bytes::Bytes::new());
    let _ = outbound.send_priority(Frame::Setup(setup));

    let shared = Arc::new(ConnectionShared {
        requester: requester.clone(),
        transport: transport.clone(),
    });

    tokio::spawn(drive_connection(
        transport,
        requester,
        responder,
        stream0,
        outbound,
        outbound_rx,
        local_parity,
    ));

    RSocket { shared }
}

/// Establishes the acceptor side of a connection: the driver task waits for an inbound
/// `SETUP` before admitting any peer-initiated stream, dispatching accepted
/// interactions into `handler`.
pub fn accept<T: DuplexConnection>(
    transport: Arc<T>,
    handler: Arc<dyn RSocketHandler>,
    config: ConnectionConfig,
) -> Server<T> {
    let local_parity = Parity::for_setup_receiver();
    let stream0 = Stream0Handler::new_awaiting_setup(config);
    let (outbound, outbound_rx) = OutboundQueue::new();
    let outbound = Arc::new(outbound);
    let lease = stream0.lease_manager_handle();

    let requester = Arc::new(Requester::new(
        outbound.clone(),
        StreamIdSupplier::new(local_parity),
        lease.clone(),
    ));
    let responder = Arc::new(Responder::new(outbound.clone(), handler, lease));

    let shared = Arc::new(ConnectionShared {
        requester: requester.clone(),
        transport: transport.clone(),
    });

    tokio::spawn(drive_connection(
        transport,
        requester,
        responder,
        stream0,
        outbound,
        outbound_rx,
        local_parity,
    ));

    RSocket { shared }
}
