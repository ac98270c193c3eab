//! Requester: originates interactions, owns the per-stream receiver map, and
//! translates downstream consumption into outbound `REQUEST_N`/`CANCEL` frames.

pub mod receiver;

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, trace};

use crate::error::{RSocketError, Result};
use crate::frame::{
    CreditedRequestFrame, ErrorFrame, Frame, MetadataPushFrame, PayloadFrame, RequestChannelFrame,
    RequestFnfFrame, RequestNFrame, RequestResponseFrame, RequestStreamFrame, SimpleRequestFrame,
};
use crate::lease_manager::LeaseManager;
use crate::payload::Payload;
use crate::stream_id::StreamIdSupplier;
use crate::transport::OutboundQueue;

use receiver::{CreditWindow, PayloadStream, ReceiverEntry, StreamEvent};

const RECEIVER_CHANNEL_CAPACITY: usize = 256;

pub struct Requester {
    outbound: Arc<OutboundQueue>,
    stream_ids: StreamIdSupplier,
    receivers: Mutex<HashMap<u32, ReceiverEntry>>,
    /// Shared with the connection's `Stream0Handler` so inbound LEASE frames are visible
    /// here the moment they arrive.
    lease: Arc<Mutex<LeaseManager>>,
}

impl Requester {
    pub fn new(outbound: Arc<OutboundQueue>, stream_ids: StreamIdSupplier, lease: Arc<Mutex<LeaseManager>>) -> Self {
        Self {
            outbound,
            stream_ids,
            receivers: Mutex::new(HashMap::new()),
            lease,
        }
    }

    fn alloc_stream_id(&self) -> Result<u32> {
        if !self.lease.lock().unwrap().try_admit(std::time::Instant::now()) {
            return Err(RSocketError::Rejected("no lease".into()));
        }
        let active: HashSet<u32> = self.receivers.lock().unwrap().keys().copied().collect();
        Ok(self.stream_ids.next(&active))
    }

    pub async fn fire_and_forget(&self, payload: Payload) -> Result<()> {
        let id = self.alloc_stream_id()?;
        trace!(stream_id = id, "REQUEST_FNF");
        self.outbound
            .send(Frame::RequestFnf(RequestFnfFrame(SimpleRequestFrame {
                stream_id: id,
                metadata: payload.metadata,
                data: payload.data,
            })))
            .await
    }

    pub async fn request_response(&self, payload: Payload) -> Result<Payload> {
        let id = self.alloc_stream_id()?;
        let (tx, mut rx) = mpsc::channel(1);
        self.receivers.lock().unwrap().insert(id, ReceiverEntry::Single(tx));
        trace!(stream_id = id, "REQUEST_RESPONSE");
        if let Err(e) = self
            .outbound
            .send(Frame::RequestResponse(RequestResponseFrame(SimpleRequestFrame {
                stream_id: id,
                metadata: payload.metadata,
                data: payload.data,
            })))
            .await
        {
            self.receivers.lock().unwrap().remove(&id);
            return Err(e);
        }
        match rx.recv().await {
            Some(StreamEvent::Next(p)) => Ok(p),
            Some(StreamEvent::Error(e)) => Err(e),
            _ => Err(RSocketError::ClosedChannel),
        }
    }

    /// `initial_n` is the caller's real downstream demand, forwarded verbatim as the
    /// REQUEST_STREAM frame's `initial_request_n` and as the local credit window's
    /// starting size.
    pub async fn request_stream(
        self: &Arc<Self>,
        payload: Payload,
        initial_n: u32,
    ) -> Result<impl Stream<Item = Result<Payload>>> {
        let id = self.alloc_stream_id()?;
        let (tx, rx) = mpsc::channel(RECEIVER_CHANNEL_CAPACITY);
        self.receivers.lock().unwrap().insert(
            id,
            ReceiverEntry::Stream {
                downstream: tx,
                credit: CreditWindow::new(initial_n),
            },
        );
        debug!(stream_id = id, initial_n, "REQUEST_STREAM opened");
        if let Err(e) = self
            .outbound
            .send(Frame::RequestStream(RequestStreamFrame(CreditedRequestFrame {
                stream_id: id,
                initial_request_n: initial_n,
                metadata: payload.metadata,
                data: payload.data,
                complete: false,
            })))
            .await
        {
            self.receivers.lock().unwrap().remove(&id);
            return Err(e);
        }
        Ok(PayloadStream::new(rx, id, self.clone()))
    }

    /// `upstream` drives a REQUEST_CHANNEL: its first element becomes the initial frame,
    /// subsequent elements become PAYLOAD/NEXT frames paced by the peer's REQUEST_N.
    /// `initial_n` is the caller's real downstream demand for the peer's output half,
    /// forwarded the same way as in `request_stream`.
    pub async fn request_channel(
        self: &Arc<Self>,
        mut upstream: impl Stream<Item = Result<Payload>> + Send + Unpin + 'static,
        initial_n: u32,
    ) -> Result<impl Stream<Item = Result<Payload>>> {
        let first = std::future::poll_fn(|cx| poll_stream_next(&mut upstream, cx))
            .await
            .ok_or_else(|| RSocketError::Invalid("request_channel upstream was empty".into()))??;

        let id = self.alloc_stream_id()?;
        let (tx, rx) = mpsc::channel(RECEIVER_CHANNEL_CAPACITY);
        let outbound_credit = Arc::new(AtomicI64::new(0));
        let outbound_notify = Arc::new(Notify::new());
        self.receivers.lock().unwrap().insert(
            id,
            ReceiverEntry::Channel {
                downstream: tx,
                credit: CreditWindow::new(initial_n),
                outbound_credit: outbound_credit.clone(),
                outbound_notify: outbound_notify.clone(),
            },
        );
        debug!(stream_id = id, initial_n, "REQUEST_CHANNEL opened");

        if let Err(e) = self
            .outbound
            .send(Frame::RequestChannel(RequestChannelFrame(CreditedRequestFrame {
                stream_id: id,
                initial_request_n: initial_n,
                metadata: first.metadata,
                data: first.data,
                complete: false,
            })))
            .await
        {
            self.receivers.lock().unwrap().remove(&id);
            return Err(e);
        }

        let this = self.clone();
        tokio::spawn(async move {
            this.pump_channel_upstream(id, upstream, outbound_credit, outbound_notify).await;
        });

        Ok(PayloadStream::new(rx, id, self.clone()))
    }

    async fn pump_channel_upstream(
        &self,
        id: u32,
        mut upstream: impl Stream<Item = Result<Payload>> + Send + Unpin,
        outbound_credit: Arc<AtomicI64>,
        outbound_notify: Arc<Notify>,
    ) {
        loop {
            while outbound_credit.load(Ordering::Acquire) <= 0 {
                if !self.receivers.lock().unwrap().contains_key(&id) {
                    return;
                }
                outbound_notify.notified().await;
            }
            let next = std::future::poll_fn(|cx| poll_stream_next(&mut upstream, cx)).await;
            match next {
                Some(Ok(payload)) => {
                    outbound_credit.fetch_sub(1, Ordering::AcqRel);
                    let _ = self
                        .outbound
                        .send(Frame::Payload(PayloadFrame::next(id, payload)))
                        .await;
                }
                Some(Err(e)) => {
                    let _ = self.outbound.send(Frame::error(id, &e)).await;
                    self.receivers.lock().unwrap().remove(&id);
                    return;
                }
                None => {
                    let _ = self.outbound.send(Frame::Payload(PayloadFrame::complete(id))).await;
                    return;
                }
            }
        }
    }

    pub async fn metadata_push(&self, payload: Payload) -> Result<()> {
        trace!("METADATA_PUSH");
        self.outbound
            .send(Frame::MetadataPush(MetadataPushFrame {
                metadata: payload.metadata.unwrap_or_default(),
            }))
            .await
    }

    /// Called by the connection driver for every inbound frame routed to "requester
    /// inbound" (i.e. a reply on a stream we opened).
    pub async fn handle_inbound(&self, frame: Frame) {
        let id = frame.stream_id();
        match frame {
            Frame::Payload(p) => self.on_payload(id, p).await,
            Frame::Error(e) => self.on_error(id, e),
            Frame::RequestN(RequestNFrame { request_n, .. }) => self.on_request_n(id, request_n),
            Frame::Cancel(_) => {
                // A CANCEL targeting a self-initiated id only makes sense for a channel's
                // inbound half; treat it as the peer closing the outbound pump.
                self.receivers.lock().unwrap().remove(&id);
            }
            _ => {}
        }
    }

    async fn on_payload(&self, id: u32, frame: PayloadFrame) {
        let refill = {
            let mut receivers = self.receivers.lock().unwrap();
            match receivers.get_mut(&id) {
                Some(ReceiverEntry::Single(tx)) => {
                    let tx = tx.clone();
                    receivers.remove(&id);
                    drop(receivers);
                    let _ = tx.try_send(StreamEvent::Next(frame.into_payload()));
                    return;
                }
                Some(ReceiverEntry::Stream { downstream, credit }) => {
                    let tx = downstream.clone();
                    let complete = frame.complete;
                    let refill = credit.on_item_delivered();
                    let _ = tx.try_send(StreamEvent::Next(frame.into_payload()));
                    if complete {
                        let _ = tx.try_send(StreamEvent::Complete);
                        receivers.remove(&id);
                        return;
                    }
                    refill
                }
                Some(ReceiverEntry::Channel { downstream, credit, .. }) => {
                    let tx = downstream.clone();
                    let complete = frame.complete;
                    let refill = credit.on_item_delivered();
                    let _ = tx.try_send(StreamEvent::Next(frame.into_payload()));
                    if complete {
                        let _ = tx.try_send(StreamEvent::Complete);
                        receivers.remove(&id);
                        return;
                    }
                    refill
                }
                None => return,
            }
        };
        if let Some(n) = refill {
            let _ = self.outbound.send(Frame::request_n(id, n)).await;
        }
    }

    fn on_error(&self, id: u32, frame: ErrorFrame) {
        let entry = self.receivers.lock().unwrap().remove(&id);
        let err = RSocketError::from_wire(frame.code, frame.message);
        match entry {
            Some(ReceiverEntry::Single(tx)) => {
                let _ = tx.try_send(StreamEvent::Error(err));
            }
            Some(ReceiverEntry::Stream { downstream, .. }) => {
                let _ = downstream.try_send(StreamEvent::Error(err));
            }
            Some(ReceiverEntry::Channel { downstream, .. }) => {
                let _ = downstream.try_send(StreamEvent::Error(err));
            }
            None => {}
        }
    }

    fn on_request_n(&self, id: u32, n: u32) {
        if let Some(ReceiverEntry::Channel { outbound_credit, outbound_notify, .. }) =
            self.receivers.lock().unwrap().get(&id)
        {
            outbound_credit.fetch_add(n as i64, Ordering::AcqRel);
            outbound_notify.notify_one();
        }
    }

    /// Downstream dropped its subscription: send CANCEL and drop the local entry, waking
    /// a channel's upstream pump (if any) so it notices the entry is gone and exits.
    pub async fn cancel(&self, id: u32) {
        if let Some(ReceiverEntry::Channel { outbound_notify, .. }) = self.receivers.lock().unwrap().remove(&id) {
            outbound_notify.notify_one();
        }
        let _ = self.outbound.send(Frame::cancel(id)).await;
    }

    /// Completes every outstanding receiver with `ClosedChannel`, for connection teardown.
    pub fn terminate_all(&self) {
        let mut receivers = self.receivers.lock().unwrap();
        for (_, entry) in receivers.drain() {
            match entry {
                ReceiverEntry::Single(tx) => {
                    let _ = tx.try_send(StreamEvent::Error(RSocketError::ClosedChannel));
                }
                ReceiverEntry::Stream { downstream, .. } => {
                    let _ = downstream.try_send(StreamEvent::Error(RSocketError::ClosedChannel));
                }
                ReceiverEntry::Channel { downstream, outbound_notify, .. } => {
                    let _ = downstream.try_send(StreamEvent::Error(RSocketError::ClosedChannel));
                    outbound_notify.notify_one();
                }
            }
        }
    }
}

fn poll_stream_next<S>(stream: &mut S, cx: &mut Context<'_>) -> Poll<Option<S::Item>>
where
    S: Stream + Unpin,
{
    Pin::new(stream).poll_next(cx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease_manager::LeaseConfig;
    use crate::stream_id::Parity;

    fn new_requester() -> (Arc<Requester>, crate::transport::OutboundQueueReceiver) {
        let (queue, rx) = OutboundQueue::new();
        let requester = Arc::new(Requester::new(
            Arc::new(queue),
            StreamIdSupplier::new(Parity::Odd),
            Arc::new(Mutex::new(LeaseManager::new(LeaseConfig::default()))),
        ));
        (requester, rx)
    }

    #[tokio::test]
    async fn request_response_resolves_on_matching_payload() {
        let (requester, mut rx) = new_requester();
        let requester2 = requester.clone();
        let call = tokio::spawn(async move { requester2.request_response(Payload::new("ping")).await });

        let sent = rx.recv().await.unwrap();
        let id = sent.stream_id();
        requester
            .handle_inbound(Frame::Payload(PayloadFrame::next_complete(id, Payload::new("pong"))))
            .await;

        let result = call.await.unwrap().unwrap();
        assert_eq!(result.data, bytes::Bytes::from_static(b"pong"));
    }

    #[tokio::test]
    async fn request_response_propagates_error_frame() {
        let (requester, mut rx) = new_requester();
        let requester2 = requester.clone();
        let call = tokio::spawn(async move { requester2.request_response(Payload::new("ping")).await });

        let sent = rx.recv().await.unwrap();
        let id = sent.stream_id();
        requester
            .handle_inbound(Frame::Error(ErrorFrame {
                stream_id: id,
                code: crate::error::ErrorCode::ApplicationError.as_wire(),
                message: "boom".into(),
            }))
            .await;

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, RSocketError::ApplicationError(_)));
    }

    #[tokio::test]
    async fn request_stream_forwards_callers_initial_demand_as_wire_request_n() {
        let (requester, mut rx) = new_requester();
        let _stream = requester.request_stream(Payload::new("hello"), 2).await.unwrap();

        let sent = rx.recv().await.unwrap();
        match sent {
            Frame::RequestStream(RequestStreamFrame(CreditedRequestFrame { initial_request_n, data, .. })) => {
                assert_eq!(initial_request_n, 2);
                assert_eq!(data, bytes::Bytes::from_static(b"hello"));
            }
            other => panic!("expected REQUEST_STREAM, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fire_and_forget_never_registers_a_receiver() {
        let (requester, mut rx) = new_requester();
        requester.fire_and_forget(Payload::new("x")).await.unwrap();
        let sent = rx.recv().await.unwrap();
        assert!(matches!(sent, Frame::RequestFnf(_)));
        assert!(requester.receivers.lock().unwrap().is_empty());
    }
}
