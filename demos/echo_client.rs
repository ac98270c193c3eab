// ABOUTME: Example application demonstrating an RSocket initiator over raw TCP
// ABOUTME: Sends one REQUEST_RESPONSE and prints the echoed reply

use argh::FromArgs;
use rsocket_core::{connect, ConnectionConfig, Payload};
use std::error::Error;
use tokio::net::TcpStream;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Example application connecting to an RSocket acceptor and round-tripping one message
#[derive(FromArgs)]
struct CliArgs {
    /// whether or not to enable debugging
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// the address to connect to (default: 127.0.0.1:7878)
    #[argh(option)]
    host: Option<String>,

    /// the message to send
    #[argh(option, short = 'm')]
    message: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli_args.debugging { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let host = cli_args.host.unwrap_or_else(|| "127.0.0.1:7878".to_owned());
    let message = cli_args.message.unwrap_or_else(|| "hello from echo_client".to_owned());

    info!("Connecting to {host}");
    let socket = TcpStream::connect(&host).await?;
    let transport = rsocket_core::transport::tcp::TcpDuplexConnection::new(socket);
    let client = connect(transport, ConnectionConfig::default());

    let reply = client.request_response(Payload::new(message)).await.map_err(|e| {
        eprintln!("request_response failed: {e}");
        Box::<dyn Error>::from(e.to_string())
    })?;

    println!("Echoed back: {}", String::from_utf8_lossy(&reply.data));

    client.close().await?;
    Ok(())
}
