pub mod collectors;

/// Well-known label values for outcome counters
pub mod outcomes {
    pub const DELIVERED: &str = "delivered";
    pub const RECEIVER_OFFLINE: &str = "receiver_offline";
    pub const RECEIVER_BUSY: &str = "receiver_busy";
    pub const COMPLETED: &str = "completed";
    pub const INTERRUPTED: &str = "interrupted";
    pub const ABORTED: &str = "aborted";
}

/// Well-known reasons for auth failures
pub mod auth_reasons {
    pub const INVALID: &str = "invalid_credentials";
    pub const ALREADY: &str = "already_logged_in";
}

use collectors::{OutcomeLabel, ReasonLabel};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

/// Point-in-time view of the byte counters, as reported by `/STATISTIC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficSnapshot {
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Process-wide counters.
///
/// `bytes_sent_total` and `bytes_received_total` are only incremented by the
/// metered socket wrappers, once per byte crossing the transport boundary.
pub struct MetricsRegistry {
    pub registry: Registry,
    pub bytes_sent_total: Counter,
    pub bytes_received_total: Counter,
    pub connections_total: Counter,
    pub sessions_online: Gauge,
    pub auth_failures_total: Family<ReasonLabel, Counter>,
    pub messages_routed_total: Family<OutcomeLabel, Counter>,
    pub file_relays_total: Family<OutcomeLabel, Counter>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let bytes_sent_total = Counter::default();
        registry.register(
            "chatrelay_bytes_sent",
            "Total bytes written to client connections",
            bytes_sent_total.clone(),
        );

        let bytes_received_total = Counter::default();
        registry.register(
            "chatrelay_bytes_received",
            "Total bytes read from client connections",
            bytes_received_total.clone(),
        );

        let connections_total = Counter::default();
        registry.register(
            "chatrelay_connections",
            "Total accepted connections since start",
            connections_total.clone(),
        );

        let sessions_online = Gauge::default();
        registry.register(
            "chatrelay_sessions_online",
            "Currently authenticated sessions",
            sessions_online.clone(),
        );

        let auth_failures_total = Family::<ReasonLabel, Counter>::default();
        registry.register(
            "chatrelay_auth_failures",
            "Rejected LOGIN attempts by reason",
            auth_failures_total.clone(),
        );

        let messages_routed_total = Family::<OutcomeLabel, Counter>::default();
        registry.register(
            "chatrelay_messages_routed",
            "Chat messages by routing outcome",
            messages_routed_total.clone(),
        );

        let file_relays_total = Family::<OutcomeLabel, Counter>::default();
        registry.register(
            "chatrelay_file_relays",
            "File relays by outcome",
            file_relays_total.clone(),
        );

        Self {
            registry,
            bytes_sent_total,
            bytes_received_total,
            connections_total,
            sessions_online,
            auth_failures_total,
            messages_routed_total,
            file_relays_total,
        }
    }

    pub fn record_bytes_sent(&self, bytes: u64) {
        self.bytes_sent_total.inc_by(bytes);
    }

    pub fn record_bytes_received(&self, bytes: u64) {
        self.bytes_received_total.inc_by(bytes);
    }

    pub fn traffic(&self) -> TrafficSnapshot {
        TrafficSnapshot {
            bytes_sent: self.bytes_sent_total.get(),
            bytes_received: self.bytes_received_total.get(),
        }
    }

    pub fn record_connection(&self) {
        self.connections_total.inc();
    }

    pub fn set_sessions_online(&self, count: usize) {
        self.sessions_online.set(count as i64);
    }

    pub fn record_auth_failure(&self, reason: &str) {
        self.auth_failures_total
            .get_or_create(&ReasonLabel {
                reason: reason.to_string(),
            })
            .inc();
    }

    pub fn record_message(&self, outcome: &str) {
        self.messages_routed_total
            .get_or_create(&OutcomeLabel {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    pub fn record_file_relay(&self, outcome: &str) {
        self.file_relays_total
            .get_or_create(&OutcomeLabel {
                outcome: outcome.to_string(),
            })
            .inc();
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
