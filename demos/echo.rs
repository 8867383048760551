//! Echo server and client over a real WebSocket.
//!
//! Starts a [`Connector`] whose router echoes every request body, connects a
//! client connection to it and streams a few requests concurrently.
//!
//! Usage:
//!   cargo run --example echo [--debug] [--compact]

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde_json::json;
use tracing_subscriber::EnvFilter;
use ws_exchange::{
    Connection, ConnectionOptions, Connector, ConnectorEvent, IncomingRequest, Method,
    OutgoingResponse, Result, WebSocketTransport, close_code,
};

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    debug: bool,
    compact: bool,
}

impl Args {
    /// Parse command-line arguments.
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self {
            debug: args.iter().any(|a| a == "--debug"),
            compact: args.iter().any(|a| a == "--compact"),
        }
    }

    fn options(&self) -> ConnectionOptions {
        let options = if self.compact {
            ConnectionOptions::compact()
        } else {
            ConnectionOptions::new()
        };
        options.with_ping_interval(Duration::from_secs(20))
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let filter = if debug {
        "ws_exchange=debug"
    } else {
        "ws_exchange=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

fn echo(mut request: IncomingRequest, mut response: OutgoingResponse) {
    tokio::spawn(async move {
        println!("[server] {} {}", request.method(), request.path());
        response.set_header("X-Echo", request.path().to_owned());
        while let Some(chunk) = request.chunk().await? {
            response.write(chunk).await?;
        }
        response.end().await
    });
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let connector = Connector::bind(
        Connection::builder()
            .options(args.options())
            .router(echo),
    )
    .await?;
    connector.on_event(|event| match event {
        ConnectorEvent::Connected { id, .. } => println!("[server] connected {id}"),
        ConnectorEvent::Disconnected { id } => println!("[server] disconnected {id}"),
    });
    println!("[server] listening on {}", connector.ws_url());

    let (transport, events) = WebSocketTransport::connect(&connector.ws_url()).await?;
    let client = Connection::builder().options(args.options()).build()?;
    client.bind(transport, events)?;

    let mut tasks = Vec::new();
    for index in 0..3 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let mut request = client.request();
            request
                .set_method(Method::Post)
                .set_path(format!("/echo/{index}"))
                .query("lang", "en gb");
            request.write(json!({"part": 1, "of": index})).await?;
            request.end_with(json!({"part": 2, "of": index})).await?;

            let mut response = request.response().await?;
            let body = response.read_to_end().await?;
            println!(
                "[client] #{} status {} echo {:?}: {}",
                response.id(),
                response.status(),
                response.headers().get_str("X-Echo"),
                serde_json::Value::Array(body)
            );
            Result::Ok(())
        }));
    }

    for task in tasks {
        match task.await {
            Ok(Err(e)) => eprintln!("[client] exchange failed: {e}"),
            Err(e) => eprintln!("[client] task panicked: {e}"),
            Ok(Ok(())) => {}
        }
    }

    client.close(close_code::NORMAL, "done").await;
    connector.close(close_code::GOING_AWAY, "done").await;
    Ok(())
}
