//! One client connection from accept to teardown.
//!
//! The reader side (this task) parses frames and dispatches commands; the
//! writer side is a separate task fed through a [`SessionHandle`], which is
//! also what other sessions use to deliver messages and files.

mod dispatch;
pub mod metered;
pub mod writer;

use crate::context::AppContext;
use crate::protocol::codec::FrameCodec;
use crate::utils::generate_correlation_id;
use anyhow::Result;
use futures::StreamExt;
use metered::{Metered, SessionTraffic};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use writer::{Outbound, OutboundFile};

#[derive(Debug, Clone, Error)]
#[error("session {conn_id} is closed")]
pub struct SessionClosed {
    pub conn_id: String,
}

/// Why an item could not be handed to another session without waiting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("session {0} is closed")]
    Closed(String),
    #[error("session {0} has a full outbound queue")]
    Busy(String),
}

struct HandleInner {
    conn_id: String,
    peer: SocketAddr,
    outbound: mpsc::Sender<Outbound>,
    closed: CancellationToken,
}

/// Cheap, cloneable reference to a live session's write side.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

impl SessionHandle {
    /// Create a handle and the receiving end of its outbound queue.
    pub fn new(
        conn_id: impl Into<String>,
        peer: SocketAddr,
        queue: usize,
    ) -> (Self, mpsc::Receiver<Outbound>) {
        Self::with_token(conn_id, peer, queue, CancellationToken::new())
    }

    pub(crate) fn with_token(
        conn_id: impl Into<String>,
        peer: SocketAddr,
        queue: usize,
        closed: CancellationToken,
    ) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(queue.max(1));
        let handle = Self {
            inner: Arc::new(HandleInner {
                conn_id: conn_id.into(),
                peer,
                outbound: tx,
                closed,
            }),
        };
        (handle, rx)
    }

    pub fn conn_id(&self) -> &str {
        &self.inner.conn_id
    }

    pub fn peer(&self) -> SocketAddr {
        self.inner.peer
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Ask the session to terminate. Idempotent.
    pub fn close(&self) {
        self.inner.closed.cancel();
    }

    pub async fn closed(&self) {
        self.inner.closed.cancelled().await
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.inner.closed.clone()
    }

    /// Queue one text frame for this session's own client. Waits for queue
    /// space unless the session closes.
    pub async fn send_frame(&self, text: impl Into<String>) -> Result<(), SessionClosed> {
        self.enqueue(Outbound::Frame(text.into())).await
    }

    /// Queue a text frame from another session. Never waits: a full queue is
    /// reported as [`DeliveryError::Busy`].
    pub fn try_send_frame(&self, text: impl Into<String>) -> Result<(), DeliveryError> {
        self.try_enqueue(Outbound::Frame(text.into()))
    }

    /// Queue a file header plus body as one unit. Never waits.
    pub fn try_send_file(&self, file: OutboundFile) -> Result<(), DeliveryError> {
        self.try_enqueue(Outbound::File(file))
    }

    fn try_enqueue(&self, item: Outbound) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed(self.inner.conn_id.clone()));
        }
        self.inner.outbound.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Busy(self.inner.conn_id.clone()),
            mpsc::error::TrySendError::Closed(_) => {
                DeliveryError::Closed(self.inner.conn_id.clone())
            }
        })
    }

    async fn enqueue(&self, item: Outbound) -> Result<(), SessionClosed> {
        let closed = || SessionClosed {
            conn_id: self.inner.conn_id.clone(),
        };
        if self.is_closed() {
            return Err(closed());
        }
        tokio::select! {
            sent = self.inner.outbound.send(item) => sent.map_err(|_| closed()),
            _ = self.inner.closed.cancelled() => Err(closed()),
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("conn_id", &self.inner.conn_id)
            .field("peer", &self.inner.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Reader-side state of one connection.
pub struct Session {
    handle: SessionHandle,
    username: Option<String>,
    logged_in_at: Option<Instant>,
}

/// What the reader loop does after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Close,
}

impl Session {
    pub fn new(handle: SessionHandle) -> Self {
        Self {
            handle,
            username: None,
            logged_in_at: None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    async fn run<R>(&mut self, ctx: &AppContext, frames: &mut FramedRead<R, FrameCodec>) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let frame = tokio::select! {
                frame = frames.next() => frame,
                _ = self.handle.closed() => {
                    debug!("Session closed by server");
                    return Ok(());
                }
            };
            let frame = match frame {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(e.into()),
                None => {
                    debug!("Peer closed connection");
                    return Ok(());
                }
            };
            if self.dispatch(ctx, &frame, frames).await? == Flow::Close {
                return Ok(());
            }
        }
    }

    /// Remove this connection from the registry if it still owns the entry.
    fn teardown(&mut self, ctx: &AppContext) {
        if let Some(username) = self.username.take() {
            if ctx
                .registry
                .unregister_session(&username, self.handle.conn_id())
            {
                ctx.metrics.set_sessions_online(ctx.registry.count());
            }
            let online_ms = self
                .logged_in_at
                .map(|t| t.elapsed().as_millis() as u64)
                .unwrap_or(0);
            info!(user = %username, online_ms, "User logged out");
        }
    }
}

/// Serve one accepted connection until it closes.
pub async fn handle_connection(stream: TcpStream, ctx: Arc<AppContext>) -> Result<()> {
    let peer = stream.peer_addr()?;
    let conn_id = generate_correlation_id();
    let span = info_span!("session", conn_id = %conn_id, peer = %peer);

    async move {
        let started = Instant::now();
        ctx.metrics.record_connection();
        let _ = stream.set_nodelay(true);
        debug!("Connection accepted");

        let (read_half, write_half) = stream.into_split();
        let traffic = Arc::new(SessionTraffic::default());
        let reader = Metered::new(read_half, ctx.metrics.clone(), traffic.clone());
        let writer = Metered::new(write_half, ctx.metrics.clone(), traffic.clone());

        let (handle, queue) = SessionHandle::with_token(
            conn_id.clone(),
            peer,
            ctx.config.server.outbound_queue,
            ctx.shutdown.child_token(),
        );
        let flush_timeout = Duration::from_secs(ctx.config.server.shutdown_timeout);
        let writer_task = writer::spawn_writer(
            FramedWrite::new(writer, FrameCodec::outbound()),
            queue,
            handle.token(),
            flush_timeout,
        );

        let mut frames = FramedRead::new(
            reader,
            FrameCodec::new(ctx.config.server.max_frame_length),
        );
        let mut session = Session::new(handle.clone());
        let result = session.run(&ctx, &mut frames).await;

        session.teardown(&ctx);
        handle.close();
        drop(frames);
        match writer_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Writer stopped with error"),
            Err(e) => warn!(error = %e, "Writer task panicked"),
        }

        let (bytes_in, bytes_out) = traffic.totals();
        match &result {
            Ok(()) => info!(
                bytes_in,
                bytes_out,
                duration_ms = started.elapsed().as_millis() as u64,
                "Connection closed"
            ),
            Err(e) => warn!(
                error = %e,
                bytes_in,
                bytes_out,
                duration_ms = started.elapsed().as_millis() as u64,
                "Connection closed with error"
            ),
        }
        result
    }
    .instrument(span)
    .await
}
