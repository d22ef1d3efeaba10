//! Prometheus metrics for the laundry monitor.
//!
//! Every appliance series is labelled with `appliance`.

use crate::sensor::Published;
use laundry_core::{tags, ApplianceKind};
use prometheus::{Encoder, Gauge, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

const APPLIANCE_LABEL: &str = "appliance";

fn gauge_vec(tag: tags::Tag) -> GaugeVec {
    let gauge = GaugeVec::new(Opts::new(tag.metric, tag.help), &[APPLIANCE_LABEL])
        .expect("metric options are valid");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("metric is registered once");
    gauge
}

fn counter_vec(tag: tags::Tag) -> IntCounterVec {
    let counter = IntCounterVec::new(Opts::new(tag.metric, tag.help), &[APPLIANCE_LABEL])
        .expect("metric options are valid");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric is registered once");
    counter
}

// ============================================================================
// Appliance Metrics
// ============================================================================

pub static APPLIANCE_STATE: LazyLock<GaugeVec> = LazyLock::new(|| gauge_vec(tags::APPLIANCE_STATE));

pub static POWER_WATTS: LazyLock<GaugeVec> = LazyLock::new(|| gauge_vec(tags::POWER_WATTS));

pub static READINGS: LazyLock<IntCounterVec> = LazyLock::new(|| counter_vec(tags::READINGS));

pub static BAD_READINGS: LazyLock<IntCounterVec> =
    LazyLock::new(|| counter_vec(tags::BAD_READINGS));

pub static WAKEUPS: LazyLock<IntCounterVec> = LazyLock::new(|| counter_vec(tags::WAKEUPS));

pub static STATE_CHANGES: LazyLock<IntCounterVec> =
    LazyLock::new(|| counter_vec(tags::STATE_CHANGES));

// ============================================================================
// Bridge Metrics
// ============================================================================

/// Bridge client connection status (1 = connected, 0 = disconnected)
pub static BRIDGE_CONNECTED: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        "laundry_bridge_connected",
        "Bridge client connection status (1=connected, 0=disconnected)",
    )
    .expect("metric options are valid");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("metric is registered once");
    gauge
});

pub fn record_reading(kind: ApplianceKind, watts: f64) {
    READINGS.with_label_values(&[kind.as_str()]).inc();
    POWER_WATTS.with_label_values(&[kind.as_str()]).set(watts);
}

pub fn record_bad_reading(kind: ApplianceKind) {
    BAD_READINGS.with_label_values(&[kind.as_str()]).inc();
}

pub fn record_wakeup(kind: ApplianceKind) {
    WAKEUPS.with_label_values(&[kind.as_str()]).inc();
}

pub fn record_published(kind: ApplianceKind, published: Published) {
    APPLIANCE_STATE
        .with_label_values(&[kind.as_str()])
        .set(published.gauge_value());
    STATE_CHANGES.with_label_values(&[kind.as_str()]).inc();
}

fn readings_seen() -> u64 {
    ApplianceKind::ALL
        .iter()
        .map(|kind| READINGS.with_label_values(&[kind.as_str()]).get())
        .sum()
}

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            match request.url() {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let mut buffer = Vec::new();
                    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
                        tracing::warn!("Failed to encode metrics: {}", e);
                        let _ = request.respond(
                            Response::from_string("Internal Server Error").with_status_code(500),
                        );
                        continue;
                    }

                    let mut response = Response::from_data(buffer);
                    if let Ok(header) = tiny_http::Header::from_bytes(
                        &b"Content-Type"[..],
                        &b"text/plain; version=0.0.4"[..],
                    ) {
                        response = response.with_header(header);
                    }
                    let _ = request.respond(response);
                }
                "/health" => {
                    let _ = request.respond(Response::from_string("OK"));
                }
                "/ready" => {
                    // Ready once any appliance has seen a reading
                    if readings_seen() > 0 {
                        let _ = request.respond(Response::from_string("Ready"));
                    } else {
                        let _ = request
                            .respond(Response::from_string("Not Ready").with_status_code(503));
                    }
                }
                _ => {
                    let _ =
                        request.respond(Response::from_string("Not Found").with_status_code(404));
                }
            }
        }
    })
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    for kind in ApplianceKind::ALL {
        let label = [kind.as_str()];
        let _ = APPLIANCE_STATE.with_label_values(&label);
        let _ = POWER_WATTS.with_label_values(&label);
        let _ = READINGS.with_label_values(&label);
        let _ = BAD_READINGS.with_label_values(&label);
        let _ = WAKEUPS.with_label_values(&label);
        let _ = STATE_CHANGES.with_label_values(&label);
    }
    let _ = BRIDGE_CONNECTED.get();
}
