//! Per-connection writer task.
//!
//! Every frame a client receives goes through one queue drained by one task,
//! so writes to a socket never interleave. A file relay is queued as a single
//! item: its header and the whole body go out before anything else.

use crate::protocol::codec::FrameCodec;
use crate::protocol::ServerFrame;
use anyhow::{bail, Result};
use bytes::Bytes;
use futures::SinkExt;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};

/// A queued item for one connection.
pub enum Outbound {
    Frame(String),
    File(OutboundFile),
}

/// Inbound file for a receiver. The body channel yields at most `file_size`
/// bytes; if it closes early the remainder is zero-padded and a `FILEABORT`
/// frame follows.
pub struct OutboundFile {
    pub sender: String,
    pub file_name: String,
    pub file_size: u64,
    pub chunk_size: usize,
    pub body: mpsc::Receiver<Bytes>,
}

/// Run the writer on its own task. However the writer ends, `closed` is
/// cancelled so the reader side stops too.
pub(crate) fn spawn_writer<W>(
    sink: FramedWrite<W, FrameCodec>,
    queue: mpsc::Receiver<Outbound>,
    closed: CancellationToken,
    flush_timeout: Duration,
) -> JoinHandle<Result<()>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(
        async move {
            let result = run_writer(sink, queue, closed.clone(), flush_timeout).await;
            if let Err(e) = &result {
                debug!(error = %e, "Writer failed, closing session");
            }
            closed.cancel();
            result
        }
        .in_current_span(),
    )
}

pub(crate) async fn run_writer<W>(
    mut sink: FramedWrite<W, FrameCodec>,
    mut queue: mpsc::Receiver<Outbound>,
    closed: CancellationToken,
    flush_timeout: Duration,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            item = queue.recv() => match item {
                Some(item) => write_item(&mut sink, item, &closed).await?,
                None => break,
            },
            _ = closed.cancelled() => {
                // Flush whatever was queued before the close, bounded in time.
                queue.close();
                let drain = async {
                    while let Some(item) = queue.recv().await {
                        write_item(&mut sink, item, &closed).await?;
                    }
                    Ok::<_, anyhow::Error>(())
                };
                match tokio::time::timeout(flush_timeout, drain).await {
                    Ok(result) => result?,
                    Err(_) => debug!("Outbound queue not flushed before close deadline"),
                }
                break;
            }
        }
    }

    let _ = sink.get_mut().shutdown().await;
    Ok(())
}

async fn write_item<W>(
    sink: &mut FramedWrite<W, FrameCodec>,
    item: Outbound,
    closed: &CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    match item {
        Outbound::Frame(text) => sink.send(text).await?,
        Outbound::File(file) => write_file(sink, file, closed).await?,
    }
    Ok(())
}

async fn write_file<W>(
    sink: &mut FramedWrite<W, FrameCodec>,
    mut file: OutboundFile,
    closed: &CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = ServerFrame::FileHeader {
        sender: file.sender.clone(),
        file_name: file.file_name.clone(),
        file_size: file.file_size,
    };
    // `send` flushes, so the codec buffer is empty before raw bytes go out.
    sink.send(header.to_string()).await?;

    let mut written: u64 = 0;
    loop {
        let chunk = tokio::select! {
            chunk = file.body.recv() => chunk,
            _ = closed.cancelled() => bail!(
                "connection closed during file transfer ({written}/{} bytes)",
                file.file_size
            ),
        };
        let Some(chunk) = chunk else { break };
        sink.get_mut().write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    if written < file.file_size {
        let missing = file.file_size - written;
        warn!(
            sender = %file.sender,
            file = %file.file_name,
            relayed = written,
            declared = file.file_size,
            "Sender vanished mid-transfer, padding body"
        );
        let zeros = vec![0u8; file.chunk_size.max(1)];
        let mut left = missing;
        while left > 0 {
            let n = left.min(zeros.len() as u64) as usize;
            sink.get_mut().write_all(&zeros[..n]).await?;
            left -= n as u64;
        }
        sink.get_mut().flush().await?;
        let abort = ServerFrame::FileAbort {
            sender: file.sender,
            file_name: file.file_name,
            relayed: written,
        };
        sink.send(abort.to_string()).await?;
    } else {
        sink.get_mut().flush().await?;
    }
    Ok(())
}
