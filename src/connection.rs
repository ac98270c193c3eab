//! Connection driver: the background task that ties the Duplex Connection
//! Adapter, the Connection Multiplexer, the Stream-0 Handler, the Requester, and the
//! Responder together into one running connection, plus the shared handle the
//! [`crate::rsocket`] facade delegates through.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_core::Stream;
use tracing::{debug, warn};

use crate::error::RSocketError;
use crate::frame::{Frame, KeepaliveFrame};
use crate::multiplexer::{Multiplexer, Route};
use crate::payload::Payload;
use crate::requester::Requester;
use crate::responder::Responder;
use crate::stream0::{Stream0Handler, Stream0State};
use crate::stream_id::Parity;
use crate::transport::{DuplexConnection, OutboundQueue, OutboundQueueReceiver};

/// Cheap, cloneable state behind every [`crate::rsocket::RSocket`] handle. Owns no
/// protocol state of its own — the Requester and the transport remain the sole owners of
/// theirs, per the cyclic-lifetime design note: a handle only holds sender ends.
pub struct ConnectionShared<T: DuplexConnection> {
    pub(crate) requester: Arc<Requester>,
    pub(crate) transport: Arc<T>,
}

/// Runs for the lifetime of one connection. Spawns the single writer task that drains
/// `outbound_rx` onto the transport, then loops pulling inbound frames and keepalive
/// ticks until the transport closes or a fatal protocol condition is hit, at which point
/// every outstanding stream is completed with `ClosedChannel` and the transport is closed.
pub(crate) async fn drive_connection<T: DuplexConnection>(
    transport: Arc<T>,
    requester: Arc<Requester>,
    responder: Arc<Responder>,
    mut stream0: Stream0Handler,
    outbound: Arc<OutboundQueue>,
    mut outbound_rx: OutboundQueueReceiver,
    local_parity: Parity,
) {
    let error_consumer = stream0.config().error_consumer.clone();
    let writer_transport = transport.clone();
    tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if writer_transport.send_one(frame).await.is_err() {
                break;
            }
        }
    });

    let multiplexer = Multiplexer::new(local_parity);
    let mut inbound = transport.inbound();
    let keepalive_period = Duration::from_millis(stream0.config().keepalive_period_ms as u64);
    let mut ticker = tokio::time::interval(keepalive_period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so we don't ping before the peer has a
    // chance to finish SETUP.
    ticker.tick().await;

    let fatal = loop {
        tokio::select! {
            frame = std::future::poll_fn(|cx| Pin::new(&mut inbound).poll_next(cx)) => {
                match frame {
                    Some(Ok(frame)) => {
                        if let Some(err) = dispatch(&multiplexer, &mut stream0, &requester, &responder, &outbound, frame).await {
                            break Some(err);
                        }
                    }
                    Some(Err(e)) => break Some(e),
                    None => break None,
                }
            }
            _ = ticker.tick() => {
                if stream0.should_send_keepalive() {
                    let _ = outbound
                        .send(Frame::Keepalive(KeepaliveFrame {
                            respond: true,
                            last_received_position: 0,
                            data: Bytes::new(),
                        }))
                        .await;
                    stream0.on_keepalive_sent();
                }
                if stream0.keepalive_timed_out() {
                    break Some(RSocketError::ConnectionError("keepalive timeout".into()));
                }
            }
        }
    };

    if let Some(err) = &fatal {
        warn!(error = %err, "connection driver closing on fatal error");
        // An expected shutdown error (someone else already tore this down) has nothing
        // new to report. Everything else reaches here with no caller left to return it
        // to, which is exactly what the error consumer is for.
        if !err.is_expected_on_shutdown() {
            error_consumer(err);
        }
        let _ = outbound.send_priority(Frame::error(0, err));
    } else {
        debug!("connection driver closing: transport ended");
    }
    outbound.mark_closed();
    requester.terminate_all();
    responder.terminate_all();
    let _ = transport.close().await;
}

async fn dispatch(
    mux: &Multiplexer,
    stream0: &mut Stream0Handler,
    requester: &Arc<Requester>,
    responder: &Arc<Responder>,
    outbound: &OutboundQueue,
    frame: Frame,
) -> Option<RSocketError> {
    match mux.route(&frame) {
        Route::StreamZero => dispatch_stream_zero(stream0, outbound, responder, frame).await,
        Route::RequesterInbound => {
            requester.handle_inbound(frame).await;
            None
        }
        Route::ResponderInbound => match responder.handle_inbound(frame).await {
            Ok(()) => None,
            Err(e) => Some(e),
        },
    }
}

async fn dispatch_stream_zero(
    stream0: &mut Stream0Handler,
    outbound: &OutboundQueue,
    responder: &Arc<Responder>,
    frame: Frame,
) -> Option<RSocketError> {
    match frame {
        Frame::Setup(setup) => match stream0.accept_setup(&setup) {
            Ok(()) => None,
            Err(e) => Some(e),
        },
        Frame::Keepalive(k) => {
            if stream0.on_keepalive_received(&k) {
                let _ = outbound.send_priority(stream0.make_keepalive_echo(&k));
            }
            None
        }
        Frame::Lease(l) => {
            stream0.on_lease_received(&l);
            None
        }
        Frame::Error(e) => Some(stream0.on_connection_error(&e)),
        Frame::MetadataPush(m) => {
            responder.handle_metadata_push(Payload::metadata_only(m.metadata)).await;
            None
        }
        _ => {
            if stream0.state() == Stream0State::AwaitingSetup {
                Some(stream0.reject_premature_frame())
            } else {
                None
            }
        }
    }
}
