//! Demo server for the reply pipeline.
//!
//! ```text
//!     Client Request
//!     ──────▶ axum router ──▶ handler ──▶ onSend hooks ──▶ finalizer ──▶ transport
//!                                                                          │
//!     Client Response ◀────────────────────────────────────────────────────┘
//! ```
//!
//! Routes:
//! - `GET /health`: JSON status document
//! - `GET /file`: streams the file given by `--file`
//! - `GET /no-content`: 204 envelope whose body is never read

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use clap::Parser;
use serde_json::json;
use tokio::net::TcpListener;

use reply_pipeline::config::{load_config, ServerConfig};
use reply_pipeline::http::{handler_fn, App, HttpServer};
use reply_pipeline::lifecycle::{wait_for_signal, Shutdown};
use reply_pipeline::observability::{init_logging, init_metrics};
use reply_pipeline::pipeline::{head_hook_fn, AppError, ByteStream, Envelope};

#[derive(Debug, Parser)]
#[command(name = "reply-pipeline", version, about = "Demo server for the reply pipeline")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,

    /// File served by `GET /file`.
    #[arg(short, long)]
    file: Option<PathBuf>,
}

fn build_app(config: &ServerConfig, file: Option<PathBuf>) -> App {
    let chunk_size = config.reply.stream_chunk_size;
    let file = file.map(Arc::new);

    let mut builder = App::builder()
        .on_send(head_hook_fn("served-by", |_request, reply, _payload| {
            reply
                .headers_mut()
                .insert(HeaderName::from_static("x-served-by"), HeaderValue::from_static(env!("CARGO_PKG_NAME")));
            Ok(None)
        }))
        .route(
            Method::GET,
            "/health",
            handler_fn(|_request| async {
                Ok::<_, AppError>(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
            }),
        )
        .route(
            Method::GET,
            "/no-content",
            handler_fn(|_request| async {
                Ok::<_, AppError>(
                    Envelope::new(StatusCode::NO_CONTENT)
                        .header(HeaderName::from_static("hello"), HeaderValue::from_static("world"))
                        .body(ByteStream::from_chunks(vec![Bytes::from_static(b"never sent")])),
                )
            }),
        );

    if let Some(path) = file {
        builder = builder.route(
            Method::GET,
            "/file",
            handler_fn(move |_request| {
                let path = Arc::clone(&path);
                async move {
                    let stream = ByteStream::open_file(path.as_path(), chunk_size).await?;
                    Ok::<_, AppError>(stream)
                }
            }),
        );
    }

    builder.build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    init_logging(&config.observability)?;

    tracing::info!("reply-pipeline v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        stream_chunk_size = config.reply.stream_chunk_size,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let app = build_app(&config, args.file);
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, app);
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    wait_for_signal().await;
    shutdown.trigger();
    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
