//! Responder: accepts peer-initiated interactions, dispatches them into an
//! `RSocketHandler`, and honors inbound REQUEST_N/CANCEL for whatever it emits back.

pub mod sender;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Instant;

use futures_core::Stream;
use tokio::sync::{mpsc, Notify};

use crate::error::{RSocketError, Result};
use crate::frame::{
    CancelFrame, CreditedRequestFrame, ErrorFrame, Frame, PayloadFrame, RequestNFrame,
    SimpleRequestFrame,
};
use crate::handler::{BoxStream, RSocketHandler};
use crate::lease_manager::LeaseManager;
use crate::payload::Payload;
use crate::transport::OutboundQueue;

use sender::{InboundPayloads, SenderEntry};

const RECEIVER_CHANNEL_CAPACITY: usize = 256;
const INITIAL_CHANNEL_INPUT_CREDIT: u32 = 256;

/// Per-channel input-side bookkeeping: the feed into the handler's input sequence plus the
/// credit window we've granted the peer to keep sending into it. Mirrors
/// `requester::receiver::CreditWindow`'s refill-at-a-quarter policy, kept as a separate
/// type since this side's credit is ours to grant rather than the peer's to report.
struct ChannelInput {
    tx: mpsc::Sender<Result<Payload>>,
    credit: InputCredit,
}

struct InputCredit {
    granted: u32,
    remaining: u32,
}

impl InputCredit {
    fn new(initial: u32) -> Self {
        Self {
            granted: initial,
            remaining: initial,
        }
    }

    fn on_item_delivered(&mut self) -> Option<u32> {
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

pub struct Responder {
    outbound: Arc<OutboundQueue>,
    handler: Arc<dyn RSocketHandler>,
    senders: Mutex<HashMap<u32, SenderEntry>>,
    /// REQUEST_CHANNEL only: the inbound half's feed into the handler's input sequence,
    /// kept separately from `senders` so closing it (on inbound COMPLETE) doesn't disturb
    /// the output-side bookkeeping the emission task still needs.
    channel_inputs: Mutex<HashMap<u32, ChannelInput>>,
    /// Shared with the connection's `Stream0Handler`; gates admission of peer-initiated
    /// streams against the lease we granted them.
    lease: Arc<Mutex<LeaseManager>>,
    /// Largest stream id ever accepted, used to tell "late frame for a stream we already
    /// closed" apart from "frame for an id that was never validly allocated."
    highest_seen: Mutex<u32>,
}

impl Responder {
    pub fn new(outbound: Arc<OutboundQueue>, handler: Arc<dyn RSocketHandler>, lease: Arc<Mutex<LeaseManager>>) -> Self {
        Self {
            outbound,
            handler,
            senders: Mutex::new(HashMap::new()),
            channel_inputs: Mutex::new(HashMap::new()),
            lease,
            highest_seen: Mutex::new(0),
        }
    }

    /// Dispatches one inbound frame routed to us by the multiplexer. `Err` signals a
    /// connection-fatal protocol violation the driver must close the transport over.
    pub async fn handle_inbound(self: &Arc<Self>, frame: Frame) -> Result<()> {
        match frame {
            Frame::RequestFnf(f) => self.on_request_fnf(f.0).await,
            Frame::RequestResponse(f) => self.on_request_response(f.0).await,
            Frame::RequestStream(f) => self.on_request_stream(f.0).await,
            Frame::RequestChannel(f) => self.on_request_channel(f.0).await,
            Frame::Payload(p) => self.on_payload(p).await,
            Frame::RequestN(RequestNFrame { stream_id, request_n }) => self.on_request_n(stream_id, request_n),
            Frame::Cancel(CancelFrame { stream_id }) => self.on_cancel(stream_id),
            Frame::Error(f) => self.on_inbound_error(f),
            _ => Ok(()),
        }
    }

    fn check_new_stream_id(&self, id: u32) -> Result<()> {
        if self.senders.lock().unwrap().contains_key(&id) {
            return Err(RSocketError::ConnectionError(format!("duplicate stream id {id}")));
        }
        let mut highest = self.highest_seen.lock().unwrap();
        if id > *highest {
            *highest = id;
        }
        Ok(())
    }

    /// True if the lease we granted the peer still permits this new stream; sends
    /// ERROR(REJECTED) and returns false otherwise.
    async fn admit_or_reject(&self, id: u32) -> bool {
        let admitted = self.lease.lock().unwrap().try_admit_outbound(Instant::now());
        if !admitted {
            let _ = self
                .outbound
                .send(Frame::error(id, &RSocketError::Rejected("no lease".into())))
                .await;
        }
        admitted
    }

    /// METADATA_PUSH always targets stream 0; dispatched here rather than through
    /// `handle_inbound` since the multiplexer routes it to stream-0, not to us directly.
    pub async fn handle_metadata_push(self: &Arc<Self>, payload: Payload) {
        let handler = self.handler.clone();
        tokio::spawn(async move {
            handler.metadata_push(payload).await;
        });
    }

    async fn on_request_fnf(self: &Arc<Self>, req: SimpleRequestFrame) -> Result<()> {
        self.check_new_stream_id(req.stream_id)?;
        if !self.admit_or_reject(req.stream_id).await {
            return Ok(());
        }
        let handler = self.handler.clone();
        let payload = Payload {
            metadata: req.metadata,
            data: req.data,
        };
        tokio::spawn(async move {
            handler.fire_and_forget(payload).await;
        });
        Ok(())
    }

    async fn on_request_response(self: &Arc<Self>, req: SimpleRequestFrame) -> Result<()> {
        let id = req.stream_id;
        self.check_new_stream_id(id)?;
        if !self.admit_or_reject(id).await {
            return Ok(());
        }
        let handler = self.handler.clone();
        let outbound = self.outbound.clone();
        let this = self.clone();
        let payload = Payload {
            metadata: req.metadata,
            data: req.data,
        };
        let handle = tokio::spawn(async move {
            match handler.request_response(payload).await {
                Ok(p) => {
                    let _ = outbound.send(Frame::Payload(PayloadFrame::next_complete(id, p))).await;
                }
                Err(e) => {
                    let _ = outbound.send(Frame::error(id, &e)).await;
                }
            }
            this.senders.lock().unwrap().remove(&id);
        });
        self.senders
            .lock()
            .unwrap()
            .insert(id, SenderEntry::Unary { abort: handle.abort_handle() });
        Ok(())
    }

    async fn on_request_stream(self: &Arc<Self>, req: CreditedRequestFrame) -> Result<()> {
        let id = req.stream_id;
        self.check_new_stream_id(id)?;
        if !self.admit_or_reject(id).await {
            return Ok(());
        }
        let credit = Arc::new(AtomicI64::new(req.initial_request_n as i64));
        let credit_notify = Arc::new(Notify::new());
        let payload = Payload {
            metadata: req.metadata,
            data: req.data,
        };
        let handler = self.handler.clone();
        let outbound = self.outbound.clone();
        let this = self.clone();
        let credit_for_task = credit.clone();
        let notify_for_task = credit_notify.clone();
        let handle = tokio::spawn(async move {
            let mut items = handler.request_stream(payload);
            this.pump_stream(id, &mut items, credit_for_task, &notify_for_task, &outbound).await;
            this.senders.lock().unwrap().remove(&id);
        });
        self.senders.lock().unwrap().insert(
            id,
            SenderEntry::Stream { abort: handle.abort_handle(), credit, credit_notify },
        );
        Ok(())
    }

    async fn on_request_channel(self: &Arc<Self>, req: CreditedRequestFrame) -> Result<()> {
        let id = req.stream_id;
        self.check_new_stream_id(id)?;
        if !self.admit_or_reject(id).await {
            return Ok(());
        }

        let (input_tx, input_rx) = mpsc::channel(RECEIVER_CHANNEL_CAPACITY);
        let first = Payload {
            metadata: req.metadata,
            data: req.data,
        };
        let _ = input_tx.try_send(Ok(first));
        if !req.complete {
            self.channel_inputs.lock().unwrap().insert(
                id,
                ChannelInput {
                    tx: input_tx,
                    credit: InputCredit::new(INITIAL_CHANNEL_INPUT_CREDIT),
                },
            );
            // Grants the peer's upstream pump room to send the rest of the channel
            // without waiting on per-item REQUEST_N round trips.
            let _ = self.outbound.send(Frame::request_n(id, INITIAL_CHANNEL_INPUT_CREDIT)).await;
        }
        // else: input_tx drops here, ending the handler's input after this one element.

        let credit = Arc::new(AtomicI64::new(req.initial_request_n as i64));
        let credit_notify = Arc::new(Notify::new());
        let handler = self.handler.clone();
        let outbound = self.outbound.clone();
        let this = self.clone();
        let credit_for_task = credit.clone();
        let notify_for_task = credit_notify.clone();
        let handle = tokio::spawn(async move {
            let input: BoxStream<'static, Result<Payload>> = Box::pin(InboundPayloads::new(input_rx));
            let mut output = handler.request_channel(input);
            this.pump_stream(id, &mut output, credit_for_task, &notify_for_task, &outbound).await;
            this.senders.lock().unwrap().remove(&id);
            this.channel_inputs.lock().unwrap().remove(&id);
        });
        self.senders.lock().unwrap().insert(
            id,
            SenderEntry::Channel { abort: handle.abort_handle(), credit, credit_notify },
        );
        Ok(())
    }

    async fn pump_stream(
        &self,
        id: u32,
        items: &mut BoxStream<'_, Result<Payload>>,
        credit: Arc<AtomicI64>,
        credit_notify: &Notify,
        outbound: &OutboundQueue,
    ) {
        loop {
            while credit.load(Ordering::Acquire) <= 0 {
                if !self.senders.lock().unwrap().contains_key(&id) {
                    return;
                }
                credit_notify.notified().await;
            }
            match std::future::poll_fn(|cx| poll_stream_next(items, cx)).await {
                Some(Ok(payload)) => {
                    credit.fetch_sub(1, Ordering::AcqRel);
                    let _ = outbound.send(Frame::Payload(PayloadFrame::next(id, payload))).await;
                }
                Some(Err(e)) => {
                    let _ = outbound.send(Frame::error(id, &e)).await;
                    return;
                }
                None => {
                    let _ = outbound.send(Frame::Payload(PayloadFrame::complete(id))).await;
                    return;
                }
            }
        }
    }

    async fn on_payload(&self, frame: PayloadFrame) -> Result<()> {
        let id = frame.stream_id;
        if !self.senders.lock().unwrap().contains_key(&id) {
            let highest = *self.highest_seen.lock().unwrap();
            return if id <= highest {
                Ok(())
            } else {
                Err(RSocketError::ConnectionError(format!("payload for unknown stream {id}")))
            };
        }
        let (next, complete) = (frame.next, frame.complete);
        let mut refill = None;
        if next {
            let mut inputs = self.channel_inputs.lock().unwrap();
            if let Some(entry) = inputs.get_mut(&id) {
                let _ = entry.tx.try_send(Ok(frame.into_payload()));
                refill = entry.credit.on_item_delivered();
            }
        }
        if complete {
            self.channel_inputs.lock().unwrap().remove(&id);
        }
        if let Some(n) = refill {
            let _ = self.outbound.send(Frame::request_n(id, n)).await;
        }
        Ok(())
    }

    fn on_request_n(&self, id: u32, n: u32) -> Result<()> {
        match self.senders.lock().unwrap().get(&id) {
            Some(entry) => {
                entry.add_credit(n);
                Ok(())
            }
            None => {
                let highest = *self.highest_seen.lock().unwrap();
                if id <= highest {
                    Ok(())
                } else {
                    Err(RSocketError::ConnectionError(format!("REQUEST_N for unknown stream {id}")))
                }
            }
        }
    }

    fn on_cancel(&self, id: u32) -> Result<()> {
        if let Some(entry) = self.senders.lock().unwrap().remove(&id) {
            entry.abort();
        }
        self.channel_inputs.lock().unwrap().remove(&id);
        Ok(())
    }

    /// Inbound ERROR on a channel id closes only the input side: the handler's output
    /// emission (tracked in `senders`) keeps running until it finishes on its own or is
    /// separately canceled.
    fn on_inbound_error(&self, frame: ErrorFrame) -> Result<()> {
        let id = frame.stream_id;
        if let Some(entry) = self.channel_inputs.lock().unwrap().remove(&id) {
            let _ = entry.tx.try_send(Err(RSocketError::from_wire(frame.code, frame.message)));
            return Ok(());
        }
        let highest = *self.highest_seen.lock().unwrap();
        if id <= highest || self.senders.lock().unwrap().contains_key(&id) {
            Ok(())
        } else {
            Err(RSocketError::ConnectionError(format!("ERROR for unknown stream {id}")))
        }
    }

    /// Aborts every in-flight interaction, for connection teardown.
    pub fn terminate_all(&self) {
        let mut senders = self.senders.lock().unwrap();
        for (_, entry) in senders.drain() {
            entry.abort();
        }
        self.channel_inputs.lock().unwrap().clear();
    }
}

fn poll_stream_next<S>(stream: &mut S, cx: &mut Context<'_>) -> Poll<Option<S::Item>>
where
    S: Stream + Unpin + ?Sized,
{
    Pin::new(stream).poll_next(cx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::BoxFuture;
    use crate::lease_manager::LeaseConfig;
    use bytes::Bytes;

    struct EchoHandler;
    impl RSocketHandler for EchoHandler {
        fn request_response(&self, payload: Payload) -> BoxFuture<'_, Result<Payload>> {
            Box::pin(async move { Ok(payload) })
        }
    }

    fn new_responder(handler: Arc<dyn RSocketHandler>) -> (Arc<Responder>, crate::transport::OutboundQueueReceiver) {
        let (queue, rx) = OutboundQueue::new();
        let lease = Arc::new(Mutex::new(LeaseManager::new(LeaseConfig::default())));
        (Arc::new(Responder::new(Arc::new(queue), handler, lease)), rx)
    }

    #[tokio::test]
    async fn request_response_echoes_payload_back() {
        let (responder, mut rx) = new_responder(Arc::new(EchoHandler));
        responder
            .handle_inbound(Frame::RequestResponse(crate::frame::RequestResponseFrame(SimpleRequestFrame {
                stream_id: 2,
                metadata: None,
                data: Bytes::from_static(b"ping"),
            })))
            .await
            .unwrap();

        let sent = rx.recv().await.unwrap();
        match sent {
            Frame::Payload(p) => {
                assert!(p.next && p.complete);
                assert_eq!(p.data, Bytes::from_static(b"ping"));
            }
            other => panic!("expected payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_stream_id_is_fatal() {
        let (responder, mut rx) = new_responder(Arc::new(EchoHandler));
        responder
            .handle_inbound(Frame::RequestResponse(crate::frame::RequestResponseFrame(SimpleRequestFrame {
                stream_id: 2,
                metadata: None,
                data: Bytes::new(),
            })))
            .await
            .unwrap();
        let _ = rx.recv().await;

        let err = responder
            .handle_inbound(Frame::RequestResponse(crate::frame::RequestResponseFrame(SimpleRequestFrame {
                stream_id: 2,
                metadata: None,
                data: Bytes::new(),
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, RSocketError::ConnectionError(_)));
    }

    #[tokio::test]
    async fn request_n_for_never_allocated_id_is_fatal() {
        let (responder, _rx) = new_responder(Arc::new(EchoHandler));
        let err = responder.handle_inbound(Frame::request_n(99, 1)).await.unwrap_err();
        assert!(matches!(err, RSocketError::ConnectionError(_)));
    }

    #[tokio::test]
    async fn cancel_for_unknown_id_is_tolerated() {
        let (responder, _rx) = new_responder(Arc::new(EchoHandler));
        responder.handle_inbound(Frame::cancel(42)).await.unwrap();
    }

    #[tokio::test]
    async fn accepting_a_channel_grants_the_peer_an_initial_input_window() {
        struct PassthroughHandler;
        impl RSocketHandler for PassthroughHandler {
            fn request_channel<'a>(&'a self, payloads: BoxStream<'a, Result<Payload>>) -> BoxStream<'a, Result<Payload>> {
                payloads
            }
        }
        let (responder, mut rx) = new_responder(Arc::new(PassthroughHandler));
        responder
            .handle_inbound(Frame::RequestChannel(crate::frame::RequestChannelFrame(CreditedRequestFrame {
                stream_id: 2,
                initial_request_n: 10,
                metadata: None,
                data: Bytes::from_static(b"first"),
                complete: false,
            })))
            .await
            .unwrap();

        // The first frame out is the REQUEST_N granting the peer room to keep sending
        // into the channel's input, ahead of anything the handler emits back.
        let sent = rx.recv().await.unwrap();
        match sent {
            Frame::RequestN(RequestNFrame { stream_id, request_n }) => {
                assert_eq!(stream_id, 2);
                assert_eq!(request_n, INITIAL_CHANNEL_INPUT_CREDIT);
            }
            other => panic!("expected REQUEST_N, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn inbound_error_on_a_channel_closes_only_the_input_side() {
        struct OutputNeverEndsHandler;
        impl RSocketHandler for OutputNeverEndsHandler {
            fn request_channel(&self, _payloads: BoxStream<'_, Result<Payload>>) -> BoxStream<'_, Result<Payload>> {
                struct Never;
                impl Stream for Never {
                    type Item = Result<Payload>;
                    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
                        Poll::Pending
                    }
                }
                Box::pin(Never)
            }
        }

        let (responder, mut rx) = new_responder(Arc::new(OutputNeverEndsHandler));
        responder
            .handle_inbound(Frame::RequestChannel(crate::frame::RequestChannelFrame(CreditedRequestFrame {
                stream_id: 2,
                initial_request_n: 10,
                metadata: None,
                data: Bytes::from_static(b"first"),
                complete: false,
            })))
            .await
            .unwrap();
        let _ = rx.recv().await; // the initial input-window REQUEST_N

        responder
            .handle_inbound(Frame::Error(ErrorFrame {
                stream_id: 2,
                code: crate::error::ErrorCode::ApplicationError.as_wire(),
                message: "upstream producer failed".into(),
            }))
            .await
            .unwrap();

        assert!(!responder.channel_inputs.lock().unwrap().contains_key(&2));
        assert!(responder.senders.lock().unwrap().contains_key(&2));
    }

    #[tokio::test]
    async fn default_handler_rejects_unimplemented_request_response() {
        struct Empty;
        impl RSocketHandler for Empty {}
        let (responder, mut rx) = new_responder(Arc::new(Empty));
        responder
            .handle_inbound(Frame::RequestResponse(crate::frame::RequestResponseFrame(SimpleRequestFrame {
                stream_id: 2,
                metadata: None,
                data: Bytes::new(),
            })))
            .await
            .unwrap();
        let sent = rx.recv().await.unwrap();
        assert!(matches!(sent, Frame::Error(_)));
    }
}
