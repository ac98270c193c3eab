//! The Duplex Connection Adapter: adapts any frame-preserving byte transport to a
//! pair of lazy frame sequences with backpressure. [`DuplexConnection`] is the contract
//! the engine drives; [`local`] and [`tcp`] are the two concrete adapters shipped here.

pub mod local;
pub mod tcp;

use std::future::Future;
use std::sync::Arc;

use futures_core::Stream;
use tokio::sync::{mpsc, Notify};

use crate::error::{RSocketError, Result};
use crate::frame::Frame;

/// Bound on the staging queue's buffered (non-priority) sends. Control frames bypass it
/// entirely via the dedicated priority lane, so this only throttles data frame producers.
const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Everything the engine needs from a transport, expressed as native async methods
/// rather than a `Sink`/`Stream` split, since every implementation here drives a single
/// underlying byte pipe sequentially.
pub trait DuplexConnection: Send + Sync + 'static {
    /// A finite stream of decoded inbound frames; ends when the transport closes.
    fn inbound(&self) -> impl Stream<Item = Result<Frame>> + Send + Unpin + 'static;

    /// Submits one frame for transmission, honoring the queue's priority lane.
    fn send_one(&self, frame: Frame) -> impl Future<Output = Result<()>> + Send;

    /// Resolves once the transport has torn down, for either side.
    fn on_close(&self) -> impl Future<Output = ()> + Send;

    /// Initiates a close of the underlying transport.
    fn close(&self) -> impl Future<Output = Result<()>> + Send;

    /// `1.0` when healthy, `0.0` once closed. Adapters may report intermediate values
    /// under backpressure.
    fn availability(&self) -> f64;
}

/// The prioritized outbound queue shared by every writer of a connection: an unbounded
/// lane for control frames (KEEPALIVE, LEASE, ERROR, CANCEL) and a bounded lane for
/// everything else, merged by a single writer task that always drains the priority lane
/// first. This is the piece C2 owns regardless of which transport sits underneath it —
/// both [`local::LocalDuplexConnection`] and [`tcp::TcpDuplexConnection`] are built on it.
pub struct OutboundQueue {
    priority_tx: mpsc::UnboundedSender<Frame>,
    data_tx: mpsc::Sender<Frame>,
    closed: Arc<Notify>,
}

/// The draining half of an [`OutboundQueue`], held by the single writer task.
pub struct OutboundQueueReceiver {
    priority_rx: mpsc::UnboundedReceiver<Frame>,
    data_rx: mpsc::Receiver<Frame>,
}

impl OutboundQueue {
    pub fn new() -> (Self, OutboundQueueReceiver) {
        let (priority_tx, priority_rx) = mpsc::unbounded_channel();
        let (data_tx, data_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        (
            Self {
                priority_tx,
                data_tx,
                closed: Arc::new(Notify::new()),
            },
            OutboundQueueReceiver {
                priority_rx,
                data_rx,
            },
        )
    }

    /// Enqueues `frame`, routing control frame types to the priority lane.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        if frame.is_control_priority() {
            self.send_priority(frame)
        } else {
            self.data_tx
                .send(frame)
                .await
                .map_err(|_| RSocketError::ClosedChannel)
        }
    }

    /// Enqueues a frame onto the priority lane regardless of its own type. Used by the
    /// engine for frames it already knows must jump the data queue (e.g. a CANCEL it
    /// generates in response to an inbound error).
    pub fn send_priority(&self, frame: Frame) -> Result<()> {
        self.priority_tx
            .send(frame)
            .map_err(|_| RSocketError::ClosedChannel)
    }

    pub fn mark_closed(&self) {
        self.closed.notify_waiters();
    }

    pub async fn closed(&self) {
        self.closed.notified().await;
    }
}

impl OutboundQueueReceiver {
    /// Pulls the next frame to write, preferring the priority lane. Returns `None` once
    /// both lanes are closed and drained.
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            if let Ok(frame) = self.priority_rx.try_recv() {
                return Some(frame);
            }
            tokio::select! {
                biased;
                frame = self.priority_rx.recv() => {
                    if frame.is_some() {
                        return frame;
                    }
                }
                frame = self.data_rx.recv() => return frame,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{CancelFrame, Frame, PayloadFrame};
    use crate::payload::Payload;

    #[tokio::test]
    async fn priority_lane_drains_before_data_lane() {
        let (queue, mut rx) = OutboundQueue::new();
        queue
            .send(Frame::Payload(PayloadFrame::next(1, Payload::new("data"))))
            .await
            .unwrap();
        queue.send(Frame::Cancel(CancelFrame { stream_id: 1 })).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, Frame::Cancel(_)));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, Frame::Payload(_)));
    }

    #[tokio::test]
    async fn recv_returns_none_once_both_lanes_drop() {
        let (queue, mut rx) = OutboundQueue::new();
        drop(queue);
        assert!(rx.recv().await.is_none());
    }
}
