//! The application contract the Responder dispatches into. An `RSocketHandler` is held
//! behind `Arc<dyn RSocketHandler>`, so its methods return boxed futures/streams rather
//! than native `impl Trait` — the one place in this crate a trait object needs a fixed
//! return type instead of one opaque type per implementation.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;

use crate::error::{RSocketError, Result};
use crate::payload::Payload;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Business logic for the peer-initiated side of a connection. Every method defaults to
/// rejecting the interaction, so a handler only needs to override what it actually serves.
pub trait RSocketHandler: Send + Sync {
    fn fire_and_forget(&self, _payload: Payload) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }

    fn request_response(&self, _payload: Payload) -> BoxFuture<'_, Result<Payload>> {
        Box::pin(async { Err(RSocketError::Rejected("request_response not supported".into())) })
    }

    fn request_stream(&self, _payload: Payload) -> BoxStream<'_, Result<Payload>> {
        Box::pin(RejectedStream::new("request_stream not supported"))
    }

    fn request_channel<'a>(&'a self, _payloads: BoxStream<'a, Result<Payload>>) -> BoxStream<'a, Result<Payload>> {
        Box::pin(RejectedStream::new("request_channel not supported"))
    }

    fn metadata_push(&self, _payload: Payload) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

/// Yields exactly one `Rejected` error, then ends — the default for unimplemented
/// stream-returning handler methods.
struct RejectedStream {
    message: Option<String>,
}

impl RejectedStream {
    fn new(message: &str) -> Self {
        Self {
            message: Some(message.to_string()),
        }
    }
}

impl Stream for RejectedStream {
    type Item = Result<Payload>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.message.take() {
            Some(message) => Poll::Ready(Some(Err(RSocketError::Rejected(message)))),
            None => Poll::Ready(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;
    impl RSocketHandler for NoopHandler {}

    #[tokio::test]
    async fn default_request_response_rejects() {
        let handler = NoopHandler;
        let err = handler.request_response(Payload::new("x")).await.unwrap_err();
        assert!(matches!(err, RSocketError::Rejected(_)));
    }

    #[tokio::test]
    async fn default_fire_and_forget_is_a_noop() {
        let handler = NoopHandler;
        handler.fire_and_forget(Payload::new("x")).await;
    }

    #[tokio::test]
    async fn default_request_stream_yields_one_rejection_then_ends() {
        use futures_core::Stream as _;
        let handler = NoopHandler;
        let mut stream = handler.request_stream(Payload::new("x"));
        let first = std::future::poll_fn(|cx| Pin::new(&mut stream).poll_next(cx)).await;
        assert!(matches!(first, Some(Err(RSocketError::Rejected(_)))));
        let second = std::future::poll_fn(|cx| Pin::new(&mut stream).poll_next(cx)).await;
        assert!(second.is_none());
    }
}
