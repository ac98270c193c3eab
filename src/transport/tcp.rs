// ABOUTME: TcpDuplexConnection wraps a TcpStream with 3-byte big-endian length-prefix framing
// ABOUTME: Read side buffers partial reads and parses complete frames off the front, looping until drained

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Buf, BytesMut};
use futures_core::Stream;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::error::{RSocketError, Result};
use crate::frame::codec::{peek_tcp_frame_length, put_tcp_frame_length, MAX_FRAME_SIZE};
use crate::frame::Frame;

use super::{DuplexConnection, OutboundQueue};

const READ_BUFFER_CAPACITY: usize = 4 * 1024;
const INBOUND_CHANNEL_CAPACITY: usize = 256;

/// A `DuplexConnection` backed by a raw TCP socket. Each frame on the wire is preceded by
/// a 3-byte big-endian length covering everything that follows (the 6-byte header plus
/// body) — this is purely transport framing, distinct from the metadata length prefix
/// `Frame` itself carries.
pub struct TcpDuplexConnection {
    outbound: OutboundQueue,
    closed: Arc<AtomicBool>,
    inbound_rx: tokio::sync::Mutex<Option<mpsc::Receiver<Result<Frame>>>>,
}

impl TcpDuplexConnection {
    pub fn new(socket: TcpStream) -> Arc<Self> {
        let (read_half, write_half) = socket.into_split();
        let (outbound, receiver) = OutboundQueue::new();
        let closed = Arc::new(AtomicBool::new(false));
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);

        tokio::spawn(write_loop(write_half, receiver, closed.clone()));
        tokio::spawn(read_loop(read_half, inbound_tx, closed.clone()));

        Arc::new(Self {
            outbound,
            closed,
            inbound_rx: tokio::sync::Mutex::new(Some(inbound_rx)),
        })
    }
}

async fn write_loop(
    write_half: tokio::net::tcp::OwnedWriteHalf,
    mut receiver: super::OutboundQueueReceiver,
    closed: Arc<AtomicBool>,
) {
    let mut stream = BufWriter::new(write_half);
    while let Some(frame) = receiver.recv().await {
        let encoded = match frame.encode() {
            Ok(bytes) => bytes,
            Err(_) => continue,
        };
        let mut framed = BytesMut::with_capacity(3 + encoded.len());
        if put_tcp_frame_length(&mut framed, encoded.len()).is_err() {
            continue;
        }
        framed.extend_from_slice(&encoded);
        if stream.write_all(&framed).await.is_err() || stream.flush().await.is_err() {
            break;
        }
    }
    closed.store(true, Ordering::Release);
}

/// Reads length-prefixed frames off the socket, buffering partial reads and parsing
/// whatever complete frames sit at the front of the buffer before reading more, and
/// forwards each decoded frame (or error) onto `tx`.
async fn read_loop(
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    tx: mpsc::Sender<Result<Frame>>,
    closed: Arc<AtomicBool>,
) {
    let mut buffer = BytesMut::with_capacity(READ_BUFFER_CAPACITY);
    loop {
        match parse_one(&mut buffer) {
            Some(Ok(frame)) => {
                if tx.send(Ok(frame)).await.is_err() {
                    break;
                }
                continue;
            }
            Some(Err(e)) => {
                let _ = tx.send(Err(e)).await;
                break;
            }
            None => {}
        }

        match read_half.read_buf(&mut buffer).await {
            Ok(0) => {
                if !buffer.is_empty() {
                    let _ = tx
                        .send(Err(RSocketError::ConnectionError(
                            "connection reset mid-frame".into(),
                        )))
                        .await;
                }
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                let _ = tx.send(Err(RSocketError::Transport(e))).await;
                break;
            }
        }
    }
    closed.store(true, Ordering::Release);
}

fn parse_one(buffer: &mut BytesMut) -> Option<Result<Frame>> {
    let len = peek_tcp_frame_length(buffer)?;
    if len > MAX_FRAME_SIZE {
        return Some(Err(RSocketError::Codec(
            crate::frame::FrameCodecError::FrameTooLarge(len),
        )));
    }
    if buffer.len() < 3 + len {
        return None;
    }
    buffer.advance(3);
    let body = buffer.split_to(len);
    Some(Frame::decode(&body).map_err(RSocketError::Codec))
}

/// Adapts an `mpsc::Receiver` to [`Stream`], mirroring [`super::local`]'s wrapper.
struct ReceiverStream {
    rx: mpsc::Receiver<Result<Frame>>,
}

impl Stream for ReceiverStream {
    type Item = Result<Frame>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame>>> {
        self.rx.poll_recv(cx)
    }
}

impl DuplexConnection for TcpDuplexConnection {
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
        async move {
            while !closed.load(Ordering::Acquire) {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        }
    }

    fn close(&self) -> impl Future<Output = Result<()>> + Send {
        async move {
            self.outbound.mark_closed();
            self.closed.store(true, Ordering::Release);
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
