// ABOUTME: In-process DuplexConnection pair joined by mpsc channels, for tests and demos
// ABOUTME: No framing layer needed since Frame values cross the channel directly

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::{mpsc, Notify};

use crate::error::Result;
use crate::frame::Frame;

use super::{DuplexConnection, OutboundQueue};

const CHANNEL_CAPACITY: usize = 256;

/// Adapts an `mpsc::Receiver` to [`Stream`] without pulling in a dedicated crate for it —
/// the one combinator this module needs.
struct ReceiverStream<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> Stream for ReceiverStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

/// One half of an in-process connection pair. Spawns a writer task that drains its own
/// [`OutboundQueue`] onto the peer's inbound channel.
pub struct LocalDuplexConnection {
    outbound: OutboundQueue,
    inbound_rx: tokio::sync::Mutex<Option<mpsc::Receiver<Result<Frame>>>>,
    closed: Arc<AtomicBool>,
    close_notify: Arc<Notify>,
}

impl LocalDuplexConnection {
    /// Builds a connected pair: frames sent on one side arrive as `inbound()` items on
    /// the other.
    pub fn pair() -> (Arc<LocalDuplexConnection>, Arc<LocalDuplexConnection>) {
        let (a_to_b_tx, a_to_b_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (b_to_a_tx, b_to_a_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let a = Arc::new(Self::new(a_to_b_tx, b_to_a_rx));
        let b = Arc::new(Self::new(b_to_a_tx, a_to_b_rx));
        (a, b)
    }

    fn new(outbound_tx: mpsc::Sender<Result<Frame>>, inbound_rx: mpsc::Receiver<Result<Frame>>) -> Self {
        let (outbound, mut receiver) = OutboundQueue::new();
        let closed = Arc::new(AtomicBool::new(false));
        let close_notify = Arc::new(Notify::new());
        let task_closed = closed.clone();
        let task_notify = close_notify.clone();
        tokio::spawn(async move {
            while let Some(frame) = receiver.recv().await {
                if outbound_tx.send(Ok(frame)).await.is_err() {
                    break;
                }
            }
            task_closed.store(true, Ordering::Release);
            task_notify.notify_waiters();
        });
        Self {
            outbound,
            inbound_rx: tokio::sync::Mutex::new(Some(inbound_rx)),
            closed,
            close_notify,
        }
    }
}

impl DuplexConnection for LocalDuplexConnection {
    fn inbound(&self) -> impl Stream<Item = Result<Frame>> + Send + Unpin + 'static {
        let rx = self
            .inbound_rx
            .try_lock()
            .expect("inbound() called more than once")
            .take()
            .expect("inbound() called more than once");
        ReceiverStream { rx }
    }

    fn send_one(&self, frame: Frame) -> impl Future<Output = Result<()>> + Send {
        async move { self.outbound.send(frame).await }
    }

    fn on_close(&self) -> impl Future<Output = ()> + Send {
        let closed = self.closed.clone();
        let notify = self.close_notify.clone();
        async move {
            if closed.load(Ordering::Acquire) {
                return;
            }
            notify.notified().await;
        }
    }

    fn close(&self) -> impl Future<Output = Result<()>> + Send {
        async move {
            self.outbound.mark_closed();
            self.closed.store(true, Ordering::Release);
            self.close_notify.notify_waiters();
            Ok(())
        }
    }

    fn availability(&self) -> f64 {
        if self.closed.load(Ordering::Acquire) {
            0.0
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next_frame(stream: &mut (impl Stream<Item = Result<Frame>> + Unpin)) -> Frame {
        std::future::poll_fn(|cx| Pin::new(&mut *stream).poll_next(cx))
            .await
            .expect("stream ended")
            .expect("frame error")
    }

    #[tokio::test]
    async fn frames_sent_on_one_side_arrive_on_the_other() {
        let (a, b) = LocalDuplexConnection::pair();
        let mut b_inbound = b.inbound();

        a.send_one(Frame::cancel(7)).await.unwrap();
        let frame = next_frame(&mut b_inbound).await;
        assert_eq!(frame.stream_id(), 7);
    }

    #[tokio::test]
    async fn close_drops_availability_to_zero() {
        let (a, _b) = LocalDuplexConnection::pair();
        assert_eq!(a.availability(), 1.0);
        a.close().await.unwrap();
        assert_eq!(a.availability(), 0.0);
    }
}
