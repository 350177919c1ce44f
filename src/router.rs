//! Direct chat message delivery.

use crate::context::AppContext;
use crate::metrics::outcomes;
use crate::protocol::{chat_line, receiver_busy, receiver_offline};
use crate::session::DeliveryError;
use crate::utils::local_timestamp;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Delivered,
    ReceiverOffline,
    /// The receiver's outbound queue is full; the line was dropped.
    ReceiverBusy,
}

/// Deliver `text` from `sender` to `receiver`.
///
/// Returns the reply owed to the sender, if any. Success is silent.
pub fn route(ctx: &AppContext, sender: &str, receiver: &str, text: &str) -> Option<String> {
    match deliver(ctx, sender, receiver, text) {
        RouteOutcome::Delivered => None,
        RouteOutcome::ReceiverOffline => Some(receiver_offline(receiver)),
        RouteOutcome::ReceiverBusy => Some(receiver_busy(receiver)),
    }
}

/// Look up the receiver and queue the formatted line on its session without
/// waiting, so a stalled receiver never holds up the sender's read loop.
pub fn deliver(ctx: &AppContext, sender: &str, receiver: &str, text: &str) -> RouteOutcome {
    let line = chat_line(&local_timestamp(), sender, text);

    let outcome = match ctx.registry.lookup(receiver) {
        // A session that closes between lookup and enqueue counts as offline.
        Some(handle) => match handle.try_send_frame(line) {
            Ok(()) => RouteOutcome::Delivered,
            Err(DeliveryError::Busy(_)) => RouteOutcome::ReceiverBusy,
            Err(DeliveryError::Closed(_)) => RouteOutcome::ReceiverOffline,
        },
        None => RouteOutcome::ReceiverOffline,
    };

    match outcome {
        RouteOutcome::Delivered => {
            ctx.metrics.record_message(outcomes::DELIVERED);
            info!(from = %sender, to = %receiver, "Message delivered");
        }
        RouteOutcome::ReceiverOffline => {
            ctx.metrics.record_message(outcomes::RECEIVER_OFFLINE);
            debug!(from = %sender, to = %receiver, "Message receiver offline");
        }
        RouteOutcome::ReceiverBusy => {
            ctx.metrics.record_message(outcomes::RECEIVER_BUSY);
            info!(from = %sender, to = %receiver, "Message dropped, receiver queue full");
        }
    }
    outcome
}
