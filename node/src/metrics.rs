//! # Prometheus Metrics
//!
//! Operational metrics for the devnet, scraped at `/metrics` on the
//! metrics port. Registered in a dedicated [`prometheus::Registry`] under
//! the `xvault` namespace.
//!
//! Counters are bumped by the API handlers as operations succeed and as
//! ledger events are drained; the gauges mirror [`DevnetStatus`] and are
//! refreshed after every mutation.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

use xvault_contracts::devnet::{Delivery, DevnetStatus};
use xvault_protocol::message::MessageKind;

/// All metric handles of the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Messages handed to the router, labelled by kind.
    pub messages_sent_total: IntCounterVec,
    /// Successful deliveries.
    pub deliveries_total: IntCounter,
    /// Deliveries rejected by the receiving ledger, labelled by error class.
    pub delivery_failures_total: IntCounterVec,
    /// Ledger events drained by the API, labelled by event name.
    pub ledger_events_total: IntCounterVec,
    /// Messages waiting in the router.
    pub queue_depth: IntGauge,
    /// Source-side assets awaiting their acknowledgment.
    pub pending_deposits: IntGauge,
    /// Source-side settled shares.
    pub total_shares: IntGauge,
    /// Source-side assets under management at the last synced rate.
    pub total_assets: IntGauge,
    /// Withdrawals awaiting confirmation.
    pub pending_withdrawals: IntGauge,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("xvault".into()), None)
            .expect("failed to create prometheus registry");

        let messages_sent_total = IntCounterVec::new(
            Opts::new("messages_sent_total", "Cross-ledger messages sent, by kind"),
            &["kind"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(messages_sent_total.clone()))
            .expect("metric registration");

        let deliveries_total =
            IntCounter::new("deliveries_total", "Messages delivered to their ledger")
                .expect("metric creation");
        registry
            .register(Box::new(deliveries_total.clone()))
            .expect("metric registration");

        let delivery_failures_total = IntCounterVec::new(
            Opts::new(
                "delivery_failures_total",
                "Deliveries rejected by the receiving ledger, by error class",
            ),
            &["class"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(delivery_failures_total.clone()))
            .expect("metric registration");

        let ledger_events_total = IntCounterVec::new(
            Opts::new("ledger_events_total", "Ledger events recorded, by event name"),
            &["event"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(ledger_events_total.clone()))
            .expect("metric registration");

        let queue_depth = IntGauge::new("queue_depth", "Messages waiting in the router")
            .expect("metric creation");
        registry
            .register(Box::new(queue_depth.clone()))
            .expect("metric registration");

        let pending_deposits = IntGauge::new(
            "pending_deposits",
            "Deposited assets not yet acknowledged by the destination",
        )
        .expect("metric creation");
        registry
            .register(Box::new(pending_deposits.clone()))
            .expect("metric registration");

        let total_shares = IntGauge::new("total_shares", "Settled vault shares on the source")
            .expect("metric creation");
        registry
            .register(Box::new(total_shares.clone()))
            .expect("metric registration");

        let total_assets = IntGauge::new(
            "total_assets",
            "Source view of assets under management at the last synced rate",
        )
        .expect("metric creation");
        registry
            .register(Box::new(total_assets.clone()))
            .expect("metric registration");

        let pending_withdrawals =
            IntGauge::new("pending_withdrawals", "Withdrawals awaiting confirmation")
                .expect("metric creation");
        registry
            .register(Box::new(pending_withdrawals.clone()))
            .expect("metric registration");

        Self {
            registry,
            messages_sent_total,
            deliveries_total,
            delivery_failures_total,
            ledger_events_total,
            queue_depth,
            pending_deposits,
            total_shares,
            total_assets,
            pending_withdrawals,
        }
    }

    /// Counts one outbound message of `kind`.
    pub fn record_sent(&self, kind: MessageKind) {
        self.messages_sent_total.with_label_values(&[kind.name()]).inc();
    }

    /// Counts a delivery and the reply it triggered, if any.
    pub fn record_delivery(&self, delivery: &Delivery) {
        self.deliveries_total.inc();
        if let Some(reply) = reply_kind(delivery.kind) {
            self.record_sent(reply);
        }
    }

    /// Counts a rejected delivery.
    pub fn record_failure(&self, class: &str) {
        self.delivery_failures_total.with_label_values(&[class]).inc();
    }

    /// Counts one drained ledger event.
    pub fn record_event(&self, name: &str) {
        self.ledger_events_total.with_label_values(&[name]).inc();
    }

    /// Mirrors the devnet gauges.
    pub fn observe(&self, status: &DevnetStatus) {
        self.queue_depth.set(gauge(status.queued_messages as u64));
        self.pending_deposits.set(gauge(status.pending_deposits));
        self.total_shares.set(gauge(status.total_shares));
        self.total_assets.set(gauge(status.total_assets));
        self.pending_withdrawals
            .set(gauge(status.pending_withdrawals as u64));
    }

    /// Encodes all registered metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// The message a ledger sends back when it handles `kind`.
fn reply_kind(kind: MessageKind) -> Option<MessageKind> {
    match kind {
        MessageKind::Deposit => Some(MessageKind::DepositAck),
        MessageKind::WithdrawalRequest => Some(MessageKind::WithdrawalConfirmed),
        _ => None,
    }
}

fn gauge(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Shared metrics handle.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xvault_contracts::devnet::{Devnet, DevnetConfig};

    #[test]
    fn deliveries_count_their_replies() {
        let metrics = NodeMetrics::new();
        let mut net = Devnet::new(DevnetConfig::default()).expect("devnet");
        net.deposit(100).expect("deposit");
        metrics.record_sent(MessageKind::Deposit);
        for delivery in net.dispatch_all().expect("dispatch") {
            metrics.record_delivery(&delivery);
        }

        let sent = |kind: MessageKind| {
            metrics
                .messages_sent_total
                .with_label_values(&[kind.name()])
                .get()
        };
        assert_eq!(sent(MessageKind::Deposit), 1);
        assert_eq!(sent(MessageKind::DepositAck), 1);
        assert_eq!(metrics.deliveries_total.get(), 2);
    }

    #[test]
    fn gauges_follow_status() {
        let metrics = NodeMetrics::new();
        let mut net = Devnet::new(DevnetConfig::default()).expect("devnet");
        net.deposit(100).expect("deposit");
        metrics.observe(&net.status());
        assert_eq!(metrics.pending_deposits.get(), 100);
        assert_eq!(metrics.queue_depth.get(), 1);

        net.dispatch_all().expect("dispatch");
        metrics.observe(&net.status());
        assert_eq!(metrics.pending_deposits.get(), 0);
        assert_eq!(metrics.total_shares.get(), 80);
        assert_eq!(metrics.queue_depth.get(), 0);
    }

    #[test]
    fn encode_uses_namespace() {
        let metrics = NodeMetrics::new();
        metrics.record_failure("remote-execution");
        metrics.record_event("WithdrawalSettled");
        let text = metrics.encode().expect("encode");
        assert!(text.contains("xvault_delivery_failures_total"));
        assert!(text.contains("remote-execution"));
        assert!(text.contains("xvault_ledger_events_total"));
        assert!(text.contains("WithdrawalSettled"));
    }
}
