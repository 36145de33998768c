//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use reply_pipeline::config::ServerConfig;
use reply_pipeline::http::{App, HttpServer, RequestContext};
use reply_pipeline::lifecycle::Shutdown;
use reply_pipeline::pipeline::{ByteStream, HookResult, OnSendHook, Payload, PayloadKind, ReplyHead};

/// Stream over the given string chunks.
pub fn chunks(parts: &[&'static str]) -> ByteStream {
    ByteStream::from_chunks(parts.iter().map(|p| Bytes::from_static(p.as_bytes())).collect::<Vec<_>>())
}

/// Stream that yields `good` chunks and then fails.
pub fn failing_stream(good: &[&'static str]) -> ByteStream {
    let items: Vec<io::Result<Bytes>> = good
        .iter()
        .map(|p| Ok(Bytes::from_static(p.as_bytes())))
        .chain(std::iter::once(Err(io::Error::new(io::ErrorKind::BrokenPipe, "source went away"))))
        .collect();
    ByteStream::new(stream::iter(items))
}

/// Write `contents` to a fresh file under the system temp dir.
pub fn temp_file(contents: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("reply-pipeline-{}.bin", uuid::Uuid::new_v4()));
    std::fs::write(&path, contents).unwrap();
    path
}

/// Hook that records the kind of payload it observed.
#[derive(Clone, Default)]
pub struct KindRecorder {
    pub seen: Arc<Mutex<Vec<PayloadKind>>>,
}

impl KindRecorder {
    pub fn kinds(&self) -> Vec<PayloadKind> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl OnSendHook for KindRecorder {
    async fn on_send(&self, _request: &RequestContext, _reply: &mut ReplyHead, payload: &Payload) -> HookResult {
        self.seen.lock().unwrap().push(payload.kind());
        Ok(None)
    }

    fn name(&self) -> &str {
        "kind-recorder"
    }
}

/// A server bound to an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub task: JoinHandle<io::Result<()>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        self.task.await.unwrap().unwrap();
    }
}

/// Serve `app` on 127.0.0.1 with an OS-assigned port.
pub async fn start_server(app: App) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = ServerConfig::default();
    config.listener.bind_address = addr.to_string();
    config.timeouts.request_secs = 5;

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, app);
    let task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    TestServer { addr, shutdown, task }
}
