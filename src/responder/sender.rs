// ABOUTME: Per-stream sender state the Responder dispatches inbound frames into
// ABOUTME: The counterpart to requester::receiver — credit lives here as a plain atomic

use std::pin::Pin;
use std::sync::atomic::AtomicI64;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::{mpsc, Notify};
use tokio::task::AbortHandle;

use crate::error::Result;
use crate::payload::Payload;

/// What the Responder keeps per inbound interaction it is actively serving. The inbound
/// feed for a channel's input half lives in `Responder::channel_inputs` instead, so
/// closing it on inbound COMPLETE doesn't disturb this entry's output-side bookkeeping.
pub enum SenderEntry {
    /// REQUEST_RESPONSE in flight: CANCEL aborts the handler's future outright.
    Unary { abort: AbortHandle },
    /// REQUEST_STREAM: emission is paced by `credit`; the pump task parks on `credit_notify`
    /// whenever it runs dry instead of polling the atomic.
    Stream {
        abort: AbortHandle,
        credit: Arc<AtomicI64>,
        credit_notify: Arc<Notify>,
    },
    /// REQUEST_CHANNEL: `credit`/`credit_notify` pace the handler's output the same way
    /// `Stream` does.
    Channel {
        abort: AbortHandle,
        credit: Arc<AtomicI64>,
        credit_notify: Arc<Notify>,
    },
}

impl SenderEntry {
    pub fn abort(&self) {
        match self {
            SenderEntry::Unary { abort } => abort.abort(),
            SenderEntry::Stream { abort, .. } => abort.abort(),
            SenderEntry::Channel { abort, .. } => abort.abort(),
        }
    }

    pub fn add_credit(&self, n: u32) {
        match self {
            SenderEntry::Stream { credit, credit_notify, .. }
            | SenderEntry::Channel { credit, credit_notify, .. } => {
                credit.fetch_add(n as i64, std::sync::atomic::Ordering::AcqRel);
                credit_notify.notify_one();
            }
            SenderEntry::Unary { .. } => {}
        }
    }
}

/// Adapts inbound PAYLOAD frames on a channel's id into the `Stream` the handler's
/// `request_channel` expects as input. Ends when the sender side closes (peer's inbound
/// COMPLETE/ERROR, or the Responder tearing the entry down).
pub struct InboundPayloads {
    rx: mpsc::Receiver<Result<Payload>>,
}

impl InboundPayloads {
    pub fn new(rx: mpsc::Receiver<Result<Payload>>) -> Self {
        Self { rx }
    }
}

impl Stream for InboundPayloads {
    type Item = Result<Payload>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
