//! Single-read byte streams with explicit lock and consumption tracking.
//!
//! # Responsibilities
//! - Wrap a chunked byte source behind a cloneable handle
//! - Allow exactly one reader to attach (`locked`)
//! - Record when the source has been drained (`consumed`)
//! - Pipe chunks to a sink as they arrive, without buffering the whole body
//!
//! # Design Decisions
//! - Both flags are monotonic: once set they stay set for the handle's lifetime
//! - `attach_reader` is the only synchronization point (compare-exchange on `locked`)
//! - A source error mid-read still marks the stream consumed; it cannot be retried
//! - Dropping a reader early drops the source, releasing the underlying resource

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::pipeline::error::StreamError;

type Source = BoxStream<'static, io::Result<Bytes>>;

struct Shared {
    locked: AtomicBool,
    consumed: AtomicBool,
    source: Mutex<Option<Source>>,
}

/// Handle to a single-read byte source.
///
/// Clones share the same source and flags, so handler code can drain a stream
/// and later hand the same (now consumed) handle to the reply.
#[derive(Clone)]
pub struct ByteStream {
    shared: Arc<Shared>,
}

impl ByteStream {
    /// Wrap any stream of byte chunks.
    pub fn new<S>(source: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                locked: AtomicBool::new(false),
                consumed: AtomicBool::new(false),
                source: Mutex::new(Some(source.boxed())),
            }),
        }
    }

    /// Stream over an in-memory list of chunks.
    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
        I::IntoIter: Send + 'static,
    {
        Self::new(stream::iter(chunks.into_iter().map(Ok::<Bytes, io::Error>)))
    }

    /// Stream over an async reader, `chunk_size` bytes at a time.
    pub fn from_reader<R>(reader: R, chunk_size: usize) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let chunk_size = chunk_size.max(1);
        let source = stream::try_unfold(reader, move |mut reader| async move {
            let mut buf = BytesMut::with_capacity(chunk_size);
            let read = reader.read_buf(&mut buf).await?;
            if read == 0 {
                Ok::<_, io::Error>(None)
            } else {
                Ok(Some((buf.freeze(), reader)))
            }
        });
        Self::new(source)
    }

    /// Open a file for streaming.
    pub async fn open_file(path: impl AsRef<Path>, chunk_size: usize) -> io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::from_reader(file, chunk_size))
    }

    /// True once any reader has been attached.
    pub fn is_locked(&self) -> bool {
        self.shared.locked.load(Ordering::Acquire)
    }

    /// True once the source has been drained (or failed while draining).
    pub fn is_consumed(&self) -> bool {
        self.shared.consumed.load(Ordering::Acquire)
    }

    /// Check that the stream can still be read from start to end.
    ///
    /// Consumption is reported first: a drained stream is also locked.
    pub fn ensure_readable(&self) -> Result<(), StreamError> {
        if self.is_consumed() {
            return Err(StreamError::Consumed);
        }
        if self.is_locked() {
            return Err(StreamError::Locked);
        }
        Ok(())
    }

    /// Attach the one and only reader.
    pub fn attach_reader(&self) -> Result<StreamReader, StreamError> {
        if self
            .shared
            .locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StreamError::Locked);
        }

        let source = self
            .shared
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match source {
            Some(source) => Ok(StreamReader {
                source,
                shared: self.shared.clone(),
                done: false,
            }),
            None => Err(StreamError::Locked),
        }
    }

    /// Read the whole stream into memory.
    pub async fn drain_to_completion(&self) -> Result<Bytes, StreamError> {
        if self.is_consumed() {
            return Err(StreamError::Consumed);
        }
        self.attach_reader()?.read_to_end().await
    }

    /// Copy the stream into `sink` chunk by chunk. Returns the bytes written.
    pub async fn pipe_to_sink<W>(&self, sink: &mut W) -> Result<u64, StreamError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if self.is_consumed() {
            return Err(StreamError::Consumed);
        }
        self.attach_reader()?.pipe_to(sink).await
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStream")
            .field("locked", &self.is_locked())
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

/// The attached reader of a [`ByteStream`].
pub struct StreamReader {
    source: Source,
    shared: Arc<Shared>,
    done: bool,
}

impl StreamReader {
    /// Next chunk, or `None` at end of stream.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, StreamError>> {
        if self.done {
            return None;
        }
        match self.source.next().await {
            Some(Ok(chunk)) => Some(Ok(chunk)),
            Some(Err(e)) => {
                self.finish();
                Some(Err(StreamError::Io(e)))
            }
            None => {
                self.finish();
                None
            }
        }
    }

    /// Buffer every remaining chunk.
    pub async fn read_to_end(mut self) -> Result<Bytes, StreamError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Write every remaining chunk to `sink` as it arrives.
    pub async fn pipe_to<W>(mut self, sink: &mut W) -> Result<u64, StreamError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut written = 0u64;
        while let Some(chunk) = self.next_chunk().await {
            let chunk = chunk?;
            if let Err(e) = sink.write_all(&chunk).await {
                // Sink went away: stop reading, the source is dropped with `self`.
                self.finish();
                return Err(StreamError::Io(e));
            }
            written += chunk.len() as u64;
        }
        sink.flush().await?;
        Ok(written)
    }

    /// Adapt into a `Stream` for transports that poll bodies themselves.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, StreamError>> + Send + 'static {
        stream::unfold(self, |mut reader| async move {
            reader.next_chunk().await.map(|chunk| (chunk, reader))
        })
    }

    fn finish(&mut self) {
        self.done = true;
        self.shared.consumed.store(true, Ordering::Release);
    }
}

impl fmt::Debug for StreamReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamReader").field("done", &self.done).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello() -> ByteStream {
        ByteStream::from_chunks(vec![Bytes::from_static(b"hello "), Bytes::from_static(b"world")])
    }

    fn failing() -> ByteStream {
        ByteStream::new(stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "source reset")),
        ]))
    }

    #[test]
    fn test_second_attach_fails() {
        let s = hello();
        let reader = s.attach_reader().unwrap();
        assert!(s.is_locked());
        assert!(matches!(s.attach_reader(), Err(StreamError::Locked)));

        // Dropping the first reader does not unlock.
        drop(reader);
        assert!(matches!(s.attach_reader(), Err(StreamError::Locked)));
        assert!(!s.is_consumed());
    }

    #[tokio::test]
    async fn test_drain_marks_consumed() {
        let s = hello();
        let body = s.drain_to_completion().await.unwrap();
        assert_eq!(&body[..], b"hello world");
        assert!(s.is_consumed());
        assert!(s.is_locked());
        assert!(matches!(s.drain_to_completion().await, Err(StreamError::Consumed)));
        assert!(matches!(s.ensure_readable(), Err(StreamError::Consumed)));
    }

    #[tokio::test]
    async fn test_failed_drain_still_consumed() {
        let s = failing();
        let err = s.drain_to_completion().await.unwrap_err();
        assert!(matches!(err, StreamError::Io(_)));
        assert!(s.is_consumed());
        assert!(matches!(s.drain_to_completion().await, Err(StreamError::Consumed)));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let s = hello();
        let other = s.clone();
        s.drain_to_completion().await.unwrap();
        assert!(other.is_consumed());
        assert!(matches!(other.ensure_readable(), Err(StreamError::Consumed)));
    }

    #[tokio::test]
    async fn test_pipe_to_sink() {
        let s = ByteStream::from_reader(&b"chunked body here"[..], 4);
        let mut sink: Vec<u8> = Vec::new();
        let written = s.pipe_to_sink(&mut sink).await.unwrap();
        assert_eq!(written, 17);
        assert_eq!(sink, b"chunked body here");
        assert!(s.is_consumed());
    }

    #[tokio::test]
    async fn test_reader_yields_chunks_in_order() {
        let s = ByteStream::from_reader(&b"abcdefghij"[..], 4);
        let mut reader = s.attach_reader().unwrap();
        let mut chunks = Vec::new();
        while let Some(chunk) = reader.next_chunk().await {
            chunks.push(chunk.unwrap());
        }
        assert_eq!(chunks.len(), 3);
        assert_eq!(&chunks[2][..], b"ij");
        assert!(reader.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn test_locked_stream_not_drained() {
        let s = hello();
        let _reader = s.attach_reader().unwrap();
        assert!(matches!(s.ensure_readable(), Err(StreamError::Locked)));
        assert!(matches!(s.drain_to_completion().await, Err(StreamError::Locked)));
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// One chunk, then a source that never ends. Sets the flag when dropped.
    fn endless(flag: Arc<AtomicBool>) -> ByteStream {
        let guard = DropFlag(flag);
        let source = stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(b"first"))])
            .chain(stream::pending::<io::Result<Bytes>>())
            .map(move |chunk| {
                let _ = &guard;
                chunk
            });
        ByteStream::new(source)
    }

    struct BrokenSink;

    impl AsyncWrite for BrokenSink {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &[u8],
        ) -> std::task::Poll<io::Result<usize>> {
            std::task::Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer hung up")))
        }

        fn poll_flush(self: std::pin::Pin<&mut Self>, _cx: &mut std::task::Context<'_>) -> std::task::Poll<io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_sink_failure_releases_source() {
        let dropped = Arc::new(AtomicBool::new(false));
        let s = endless(dropped.clone());

        let err = s.pipe_to_sink(&mut BrokenSink).await.unwrap_err();
        assert!(matches!(err, StreamError::Io(_)));
        assert!(dropped.load(Ordering::SeqCst));
        assert!(s.is_consumed());
        assert!(matches!(s.ensure_readable(), Err(StreamError::Consumed)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_attach_has_one_winner() {
        for _ in 0..50 {
            let s = hello();
            let barrier = Arc::new(tokio::sync::Barrier::new(8));
            let tasks: Vec<_> = (0..8)
                .map(|_| {
                    let s = s.clone();
                    let barrier = barrier.clone();
                    tokio::spawn(async move {
                        barrier.wait().await;
                        s.attach_reader().is_ok()
                    })
                })
                .collect();

            let mut winners = 0;
            for task in tasks {
                if task.await.unwrap() {
                    winners += 1;
                }
            }
            assert_eq!(winners, 1);
        }
    }

    #[test]
    fn test_attach_after_poisoned_lock() {
        let s = hello();
        let shared = s.shared.clone();
        let _ = std::thread::spawn(move || {
            let _guard = shared.source.lock().unwrap();
            panic!("poison the source lock");
        })
        .join();

        assert!(s.shared.source.is_poisoned());
        assert!(s.attach_reader().is_ok());
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let err = ByteStream::open_file("/definitely/not/here.bin", 1024).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
