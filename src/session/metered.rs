//! Socket wrappers that feed the byte counters.
//!
//! These are the only places `bytes_sent` / `bytes_received` are incremented,
//! so every byte crossing the transport boundary is counted exactly once no
//! matter which component asked for the read or write.

use crate::metrics::MetricsRegistry;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Per-connection byte totals, reported when the session closes.
#[derive(Debug, Default)]
pub struct SessionTraffic {
    pub bytes_in: AtomicU64,
    pub bytes_out: AtomicU64,
}

impl SessionTraffic {
    pub fn totals(&self) -> (u64, u64) {
        (
            self.bytes_in.load(Ordering::Relaxed),
            self.bytes_out.load(Ordering::Relaxed),
        )
    }
}

pub struct Metered<S> {
    inner: S,
    metrics: Arc<MetricsRegistry>,
    traffic: Arc<SessionTraffic>,
}

impl<S> Metered<S> {
    pub fn new(inner: S, metrics: Arc<MetricsRegistry>, traffic: Arc<SessionTraffic>) -> Self {
        Self {
            inner,
            metrics,
            traffic,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Metered<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            let n = (buf.filled().len() - before) as u64;
            if n > 0 {
                this.metrics.record_bytes_received(n);
                this.traffic.bytes_in.fetch_add(n, Ordering::Relaxed);
            }
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Metered<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = poll {
            if n > 0 {
                this.metrics.record_bytes_sent(n as u64);
                this.traffic.bytes_out.fetch_add(n as u64, Ordering::Relaxed);
            }
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
