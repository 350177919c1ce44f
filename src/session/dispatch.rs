use super::{Flow, Session};
use crate::context::AppContext;
use crate::metrics::auth_reasons;
use crate::protocol::codec::FrameCodec;
use crate::protocol::{
    parse_command, Command, ProtocolError, REPLY_ALREADY, REPLY_INVALID, REPLY_SHUTDOWN,
    REPLY_SUCCESS, HELP_TEXT,
};
use crate::registry::RegistryError;
use crate::relay::{self, FileTransfer, RelayOutcome};
use crate::router;
use crate::utils::local_timestamp;
use anyhow::Result;
use std::time::Instant;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

impl Session {
    /// Handle one complete frame. Returns whether the connection stays open.
    pub(crate) async fn dispatch<R>(
        &mut self,
        ctx: &AppContext,
        frame: &str,
        frames: &mut FramedRead<R, FrameCodec>,
    ) -> Result<Flow>
    where
        R: AsyncRead + Unpin,
    {
        let command = match parse_command(frame) {
            Ok(command) => command,
            Err(e) => {
                debug!(frame_len = frame.len(), "Unrecognized frame");
                self.reply(e.reply()).await;
                return Ok(Flow::Continue);
            }
        };
        debug!(command = command.name(), "Command received");

        match command {
            Command::Login { username, password } => self.login(ctx, username, password).await,
            Command::Logout => match self.username() {
                Some(_) => Ok(Flow::Close),
                None => {
                    self.reply(ProtocolError::NotAuthenticated.reply()).await;
                    Ok(Flow::Continue)
                }
            },
            Command::Message { receiver, text } => {
                match self.username.clone() {
                    Some(sender) => {
                        if let Some(reply) = router::route(ctx, &sender, &receiver, &text) {
                            self.reply(reply).await;
                        }
                    }
                    None => self.reply(ProtocolError::NotAuthenticated.reply()).await,
                }
                Ok(Flow::Continue)
            }
            Command::File {
                receiver,
                file_name,
                file_size,
            } => {
                let Some(sender) = self.username.clone() else {
                    // The declared body is on its way regardless.
                    let token = self.handle.token();
                    let limits = &ctx.config.relay;
                    relay::discard(
                        frames,
                        file_size,
                        limits.chunk_size,
                        limits.body_timeout(),
                        &token,
                    )
                    .await?;
                    self.reply(ProtocolError::NotAuthenticated.reply()).await;
                    return Ok(Flow::Continue);
                };
                let transfer = FileTransfer {
                    sender,
                    receiver,
                    file_name,
                    file_size,
                };
                match relay::relay(ctx, frames, &self.handle, transfer).await? {
                    RelayOutcome::Aborted { .. } => Ok(Flow::Close),
                    _ => Ok(Flow::Continue),
                }
            }
            Command::Log => {
                self.export_log(ctx).await;
                Ok(Flow::Continue)
            }
            Command::Close => {
                info!(user = self.username().unwrap_or("-"), "Shutdown requested by client");
                self.reply(REPLY_SHUTDOWN).await;
                ctx.shutdown.cancel();
                Ok(Flow::Close)
            }
            Command::Time => {
                self.reply(format!("Server time is: {}", local_timestamp())).await;
                Ok(Flow::Continue)
            }
            Command::Statistic => {
                let traffic = ctx.metrics.traffic();
                self.reply(format!(
                    "Online users: {}.\nTotal bytes sent: {} bytes.\nTotal bytes received: {} bytes",
                    ctx.registry.count(),
                    traffic.bytes_sent,
                    traffic.bytes_received
                ))
                .await;
                Ok(Flow::Continue)
            }
            Command::Help => {
                self.reply(HELP_TEXT).await;
                Ok(Flow::Continue)
            }
        }
    }

    async fn login(
        &mut self,
        ctx: &AppContext,
        username: String,
        password: Zeroizing<String>,
    ) -> Result<Flow> {
        if let Some(current) = self.username() {
            let reply = ProtocolError::AlreadyAuthenticated(current.to_string()).reply();
            self.reply(reply).await;
            return Ok(Flow::Continue);
        }

        let credentials = ctx.credentials.clone();
        let candidate = username.clone();
        // Password hashing is CPU-bound.
        let valid = tokio::task::spawn_blocking(move || {
            credentials.validate(&candidate, password.as_str())
        })
        .await?;

        if !valid {
            warn!(user = %username, "Login rejected: invalid credentials");
            ctx.metrics.record_auth_failure(auth_reasons::INVALID);
            self.reply(REPLY_INVALID).await;
            return Ok(Flow::Close);
        }

        match ctx.registry.register(&username, self.handle.clone()) {
            Ok(()) => {
                ctx.metrics.set_sessions_online(ctx.registry.count());
                self.username = Some(username.clone());
                self.logged_in_at = Some(Instant::now());
                info!(user = %username, online = ?ctx.registry.usernames(), "User logged in");
                self.reply(REPLY_SUCCESS).await;
                Ok(Flow::Continue)
            }
            Err(RegistryError::AlreadyPresent(_)) => {
                warn!(user = %username, "Login rejected: already logged in");
                ctx.metrics.record_auth_failure(auth_reasons::ALREADY);
                self.reply(REPLY_ALREADY).await;
                Ok(Flow::Close)
            }
        }
    }

    async fn export_log(&self, ctx: &AppContext) {
        let dir = &ctx.config.logging.export_dir;
        match ctx.log_buffer.export(dir).await {
            Ok(path) => {
                info!(path = %path.display(), "Log exported");
                self.reply(format!(
                    "Log command executed. Log saved to {}.",
                    path.display()
                ))
                .await;
            }
            Err(e) => {
                error!(error = %e, dir = %dir.display(), "Log export failed");
                self.reply(format!("Log export failed: {e}")).await;
            }
        }
    }

    /// Queue a reply to this client. A closed session drops it silently.
    async fn reply(&self, text: impl Into<String>) {
        if self.handle.send_frame(text).await.is_err() {
            debug!("Reply dropped, session closing");
        }
    }
}
