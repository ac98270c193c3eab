// ABOUTME: Example application demonstrating an RSocket acceptor over raw TCP
// ABOUTME: Echoes REQUEST_RESPONSE/REQUEST_STREAM/REQUEST_CHANNEL payloads straight back

use argh::FromArgs;
use futures_core::Stream;
use rsocket_core::handler::{BoxFuture, BoxStream};
use rsocket_core::{accept, ConnectionConfig, Payload, Result, RSocketHandler};
use std::error::Error;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Yields a single payload, then ends — enough to demonstrate REQUEST_STREAM framing
/// without pulling in a streams-combinator crate this demo is the only user of.
struct OnceStream(Option<Result<Payload>>);

impl Stream for OnceStream {
    type Item = Result<Payload>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.0.take())
    }
}

/// Example application accepting RSocket connections and echoing every payload back
#[derive(FromArgs)]
struct CliArgs {
    /// whether or not to enable debugging
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// the address to listen on (default: 127.0.0.1:7878)
    #[argh(option)]
    bind: Option<String>,
}

struct EchoHandler;

impl RSocketHandler for EchoHandler {
    fn request_response(&self, payload: Payload) -> BoxFuture<'_, Result<Payload>> {
        Box::pin(async move { Ok(payload) })
    }

    fn request_stream(&self, payload: Payload) -> BoxStream<'_, Result<Payload>> {
        Box::pin(OnceStream(Some(Ok(payload))))
    }

    fn request_channel<'a>(&'a self, payloads: BoxStream<'a, Result<Payload>>) -> BoxStream<'a, Result<Payload>> {
        payloads
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli_args.debugging { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let bind = cli_args.bind.unwrap_or_else(|| "127.0.0.1:7878".to_owned());
    let listener = TcpListener::bind(&bind).await?;
    info!("Listening on {bind}");

    loop {
        let (socket, peer) = listener.accept().await?;
        info!("Accepted connection from {peer}");

        let transport = rsocket_core::transport::tcp::TcpDuplexConnection::new(socket);
        let server = accept(transport, Arc::new(EchoHandler), ConnectionConfig::default());

        tokio::spawn(async move {
            server.on_close().await;
            warn!("Connection from {peer} closed");
        });
    }
}
