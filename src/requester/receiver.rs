// ABOUTME: Per-stream receiver state the Requester dispatches inbound frames into
// ABOUTME: A sum type rather than parallel maps, per the "value-oriented lazy sequence" design note

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::{mpsc, Notify};

use crate::error::{RSocketError, Result};
use crate::payload::Payload;

use super::Requester;

/// One event delivered to a Requester-side receiver for a given stream id.
#[derive(Debug)]
pub enum StreamEvent {
    Next(Payload),
    Complete,
    Error(RSocketError),
}

/// Tracks how much of the credit we granted ourselves (via `initial_request_n`, then
/// periodic `REQUEST_N`) remains unconsumed, so the dispatcher knows when to refill.
pub struct CreditWindow {
    pub granted: u32,
    pub remaining: u32,
}

impl CreditWindow {
    pub fn new(initial: u32) -> Self {
        Self {
            granted: initial,
            remaining: initial,
        }
    }

    /// Called as each `Next` is delivered. Returns `Some(refill)` once remaining credit
    /// drops below a quarter of the last granted window.
    pub fn on_item_delivered(&mut self) -> Option<u32> {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining * 4 < self.granted {
            let refill = self.granted;
            self.remaining += refill;
            Some(refill)
        } else {
            None
        }
    }
}

/// What the Requester keeps per outstanding stream it originated.
pub enum ReceiverEntry {
    /// request_response: exactly one `Next` (or `Error`) is expected.
    Single(mpsc::Sender<StreamEvent>),
    /// request_stream: any number of `Next` until `Complete`/`Error`, gated by a local
    /// credit window that is refilled via `REQUEST_N` as it's consumed.
    Stream {
        downstream: mpsc::Sender<StreamEvent>,
        credit: CreditWindow,
    },
    /// request_channel: inbound `Next`s feed the downstream sequence the same way as
    /// `Stream`; outbound demand (REQUEST_N from the peer) is tracked by the upstream pump,
    /// which parks on `outbound_notify` between grants instead of polling the atomic.
    Channel {
        downstream: mpsc::Sender<StreamEvent>,
        credit: CreditWindow,
        outbound_credit: std::sync::Arc<std::sync::atomic::AtomicI64>,
        outbound_notify: std::sync::Arc<Notify>,
    },
}

/// Adapts an `mpsc::Receiver<StreamEvent>` to a `Stream<Item = Result<Payload>>` that ends
/// on `Complete` or `Error`, which is what every Requester-side public operation returns.
/// Dropped before reaching either — the downstream consumer losing interest — sends
/// CANCEL and drops the receiver entry.
pub struct PayloadStream {
    rx: mpsc::Receiver<StreamEvent>,
    done: bool,
    stream_id: u32,
    requester: Arc<Requester>,
}

impl PayloadStream {
    pub fn new(rx: mpsc::Receiver<StreamEvent>, stream_id: u32, requester: Arc<Requester>) -> Self {
        Self {
            rx,
            done: false,
            stream_id,
            requester,
        }
    }
}

impl Drop for PayloadStream {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let requester = self.requester.clone();
        let id = self.stream_id;
        tokio::spawn(async move {
            requester.cancel(id).await;
        });
    }
}

impl Stream for PayloadStream {
    type Item = Result<Payload>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Payload>>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(StreamEvent::Next(p))) => Poll::Ready(Some(Ok(p))),
            Poll::Ready(Some(StreamEvent::Complete)) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(StreamEvent::Error(e))) => {
                self.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(Some(Err(RSocketError::ClosedChannel)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
