//! # Prometheus Metrics
//!
//! Order and settlement counters plus a latency histogram over protocol
//! calls, served at `/metrics` on the metrics port.
//!
//! Everything lives in a dedicated [`prometheus::Registry`] (prefix
//! `umbra_`) so nothing collides with the default global registry.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metric handles for the node. Cheap to clone.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Orders accepted by `propose`.
    pub orders_proposed_total: IntCounter,
    /// Orders that made it through `settle`.
    pub settlements_total: IntCounter,
    /// `settle` calls refused by a check or a ledger failure.
    pub settlement_failures_total: IntCounter,
    /// Wall time of protocol calls, labelled by operation.
    pub protocol_call_seconds: HistogramVec,
}

impl NodeMetrics {
    /// Create and register every metric.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("umbra".into()), None)?;

        let orders_proposed_total =
            IntCounter::new("orders_proposed_total", "Orders opened by a buyer")?;
        registry.register(Box::new(orders_proposed_total.clone()))?;

        let settlements_total =
            IntCounter::new("settlements_total", "Orders settled on the ledger")?;
        registry.register(Box::new(settlements_total.clone()))?;

        let settlement_failures_total = IntCounter::new(
            "settlement_failures_total",
            "Settle attempts refused by a verification check or the ledger",
        )?;
        registry.register(Box::new(settlement_failures_total.clone()))?;

        // Proof generation sits in the tens of milliseconds, BSGS at 2^32
        // in the hundreds.
        let protocol_call_seconds = HistogramVec::new(
            HistogramOpts::new("protocol_call_seconds", "Latency of protocol calls in seconds")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(protocol_call_seconds.clone()))?;

        Ok(Self {
            registry,
            orders_proposed_total,
            settlements_total,
            settlement_failures_total,
            protocol_call_seconds,
        })
    }

    /// Histogram for a single operation label.
    pub fn call_timer(&self, operation: &str) -> Histogram {
        self.protocol_call_seconds.with_label_values(&[operation])
    }

    /// Render the registry in the text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// `GET /metrics`.
pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
