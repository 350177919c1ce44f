//! File relay.
//!
//! After a `FILE|receiver|name|size` frame the sender's stream carries exactly
//! `size` raw bytes. They are read straight off the sender's socket (first
//! from whatever the frame decoder already buffered) and handed to the
//! receiver's writer in bounded chunks. Whatever happens to the receiver, the
//! relay always consumes the full declared body so the sender's next frame
//! starts on a frame boundary.
//!
//! No wait in here is unbounded: sender reads and hand-offs to the receiver
//! both give up after `relay.body_timeout` without progress, and both stop
//! when the sender's own session is closed.

use crate::context::AppContext;
use crate::metrics::outcomes;
use crate::protocol::codec::FrameCodec;
use crate::protocol::{receiver_busy, receiver_offline, ServerFrame};
use crate::session::writer::OutboundFile;
use crate::session::{DeliveryError, SessionHandle};
use anyhow::{bail, Result};
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTransfer {
    pub sender: String,
    pub receiver: String,
    pub file_name: String,
    pub file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Completed,
    ReceiverOffline,
    /// The receiver's outbound queue was full; the body was discarded.
    ReceiverBusy,
    /// The receiver went away or stopped taking chunks mid-transfer; the rest
    /// of the body was drained.
    Interrupted { relayed: u64 },
    /// The sender's stream ended, failed or stalled inside the body, or its
    /// session was closed. The receiver gets a zero-padded body and
    /// `FILEABORT`; the sender's connection is done.
    Aborted { relayed: u64 },
}

/// Relay one file body from the sender's stream to the receiver.
///
/// Errors come only from discarding a body nobody will receive. On
/// [`RelayOutcome::Aborted`] the caller closes the sender's connection.
pub async fn relay<R>(
    ctx: &AppContext,
    source: &mut FramedRead<R, FrameCodec>,
    sender: &SessionHandle,
    transfer: FileTransfer,
) -> Result<RelayOutcome>
where
    R: AsyncRead + Unpin,
{
    let chunk_size = ctx.config.relay.chunk_size;
    let idle = ctx.config.relay.body_timeout();
    let cancel = sender.token();

    let Some(receiver) = ctx.registry.lookup(&transfer.receiver) else {
        return reject(ctx, source, sender, &transfer, RelayOutcome::ReceiverOffline).await;
    };

    let (body_tx, body_rx) = mpsc::channel(ctx.config.relay.body_queue.max(1));
    let file = OutboundFile {
        sender: transfer.sender.clone(),
        file_name: transfer.file_name.clone(),
        file_size: transfer.file_size,
        chunk_size,
        body: body_rx,
    };
    match receiver.try_send_file(file) {
        Ok(()) => {}
        Err(DeliveryError::Busy(_)) => {
            return reject(ctx, source, sender, &transfer, RelayOutcome::ReceiverBusy).await
        }
        Err(DeliveryError::Closed(_)) => {
            return reject(ctx, source, sender, &transfer, RelayOutcome::ReceiverOffline).await
        }
    }

    debug!(
        from = %transfer.sender,
        to = %transfer.receiver,
        file = %transfer.file_name,
        size = transfer.file_size,
        "File relay started"
    );

    let mut body = Some(body_tx);
    let mut remaining = transfer.file_size;
    let mut relayed: u64 = 0;
    while remaining > 0 {
        let want = remaining.min(chunk_size as u64) as usize;
        let chunk = match read_chunk(source, want, idle, &cancel).await {
            Ok(chunk) => chunk,
            Err(e) => {
                ctx.metrics.record_file_relay(outcomes::ABORTED);
                warn!(
                    from = %transfer.sender,
                    to = %transfer.receiver,
                    file = %transfer.file_name,
                    relayed,
                    declared = transfer.file_size,
                    error = %e,
                    "File relay aborted by sender"
                );
                return Ok(RelayOutcome::Aborted { relayed });
            }
        };
        remaining -= chunk.len() as u64;

        let Some(tx) = &body else { continue };
        let len = chunk.len() as u64;
        let handed_off = tokio::select! {
            sent = tokio::time::timeout(idle, tx.send(chunk)) => matches!(sent, Ok(Ok(()))),
            _ = cancel.cancelled() => {
                ctx.metrics.record_file_relay(outcomes::ABORTED);
                warn!(
                    from = %transfer.sender,
                    file = %transfer.file_name,
                    relayed,
                    "File relay aborted, sender session closed"
                );
                return Ok(RelayOutcome::Aborted { relayed });
            }
        };
        if handed_off {
            relayed += len;
        } else {
            // Dropping the channel lets the receiver's writer pad and move on.
            body = None;
            warn!(
                to = %transfer.receiver,
                file = %transfer.file_name,
                relayed,
                "Receiver went away mid-transfer, draining body"
            );
        }
    }

    if body.take().is_some() {
        ctx.metrics.record_file_relay(outcomes::COMPLETED);
        info!(
            from = %transfer.sender,
            to = %transfer.receiver,
            file = %transfer.file_name,
            size = transfer.file_size,
            "File relayed"
        );
        notify(
            sender,
            ServerFrame::FileSent {
                receiver: transfer.receiver,
                file_name: transfer.file_name,
            },
        )
        .await;
        Ok(RelayOutcome::Completed)
    } else {
        ctx.metrics.record_file_relay(outcomes::INTERRUPTED);
        notify(
            sender,
            ServerFrame::FileError {
                reason: format!("Transfer to [{}] was interrupted.", transfer.receiver),
            },
        )
        .await;
        Ok(RelayOutcome::Interrupted { relayed })
    }
}

/// Consume and drop `size` raw bytes from the stream.
pub async fn discard<R>(
    source: &mut FramedRead<R, FrameCodec>,
    size: u64,
    chunk_size: usize,
    idle: Duration,
    cancel: &CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut remaining = size;
    while remaining > 0 {
        let want = remaining.min(chunk_size.max(1) as u64) as usize;
        let chunk = read_chunk(source, want, idle, cancel).await?;
        remaining -= chunk.len() as u64;
    }
    Ok(())
}

/// Drain the body of a file nobody will receive and tell the sender why.
async fn reject<R>(
    ctx: &AppContext,
    source: &mut FramedRead<R, FrameCodec>,
    sender: &SessionHandle,
    transfer: &FileTransfer,
    outcome: RelayOutcome,
) -> Result<RelayOutcome>
where
    R: AsyncRead + Unpin,
{
    let relay = &ctx.config.relay;
    discard(
        source,
        transfer.file_size,
        relay.chunk_size,
        relay.body_timeout(),
        &sender.token(),
    )
    .await?;

    let (label, reason) = match outcome {
        RelayOutcome::ReceiverBusy => (
            outcomes::RECEIVER_BUSY,
            receiver_busy(&transfer.receiver),
        ),
        _ => (
            outcomes::RECEIVER_OFFLINE,
            receiver_offline(&transfer.receiver),
        ),
    };
    ctx.metrics.record_file_relay(label);
    debug!(
        from = %transfer.sender,
        to = %transfer.receiver,
        file = %transfer.file_name,
        outcome = label,
        "File not relayed"
    );
    notify(sender, ServerFrame::FileError { reason }).await;
    Ok(outcome)
}

async fn notify(sender: &SessionHandle, frame: ServerFrame) {
    if sender.send_frame(frame.to_string()).await.is_err() {
        debug!("Sender closed before relay notification");
    }
}

/// Read up to `max` raw body bytes: decoder leftovers first, then the socket.
/// Never reads past `max`, so the byte after the body stays in the stream.
async fn read_chunk<R>(
    source: &mut FramedRead<R, FrameCodec>,
    max: usize,
    idle: Duration,
    cancel: &CancellationToken,
) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let buffered = source.read_buffer_mut();
    if !buffered.is_empty() {
        let n = buffered.len().min(max);
        return Ok(buffered.split_to(n).freeze());
    }

    let mut chunk = BytesMut::zeroed(max);
    let n = tokio::select! {
        read = tokio::time::timeout(idle, source.get_mut().read(&mut chunk[..])) => match read {
            Ok(n) => n?,
            Err(_) => bail!("file body stalled for {}s", idle.as_secs()),
        },
        _ = cancel.cancelled() => bail!("connection closed during file body"),
    };
    if n == 0 {
        bail!("connection closed during file body");
    }
    chunk.truncate(n);
    Ok(chunk.freeze())
}
