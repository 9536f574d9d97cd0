//! Observability
//!
//! tracing-subscriber initialization plus OpenTelemetry metric
//! instruments. Instruments are created lazily from the global meter so
//! call sites work whether or not an OTLP exporter is installed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use opentelemetry::metrics::{Counter, UpDownCounter};
use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig as _;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::Resource;
use tracing_subscriber::EnvFilter;

use crate::config::ObservabilityConfig;

static WS_CONNECTIONS_ACTIVE: OnceLock<UpDownCounter<i64>> = OnceLock::new();
static VOICE_JOINS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();

/// Hot-path atomic for RTP packet counting; flushed periodically to the
/// OTel counter to avoid per-packet instrument overhead.
static RTP_PACKETS_FORWARDED: AtomicU64 = AtomicU64::new(0);
static RTP_PACKETS_COUNTER: OnceLock<Counter<u64>> = OnceLock::new();

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the configured default filter is
/// used.
pub fn init_tracing(config: &ObservabilityConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Install the global OTLP meter provider.
///
/// Returns `None` when export is disabled; the global meter then stays
/// the no-op default and instrument calls cost nothing observable.
/// The caller must retain the provider and shut it down during graceful
/// shutdown so the final interval is flushed.
pub fn init_metrics(config: &ObservabilityConfig) -> Option<SdkMeterProvider> {
    if !config.enabled {
        return None;
    }

    let exporter = match opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to build OTLP metric exporter, metrics disabled");
            return None;
        }
    };

    let resource = Resource::builder()
        .with_service_name(config.service_name.clone())
        .build();

    let provider = SdkMeterProvider::builder()
        .with_reader(PeriodicReader::builder(exporter).build())
        .with_resource(resource)
        .build();

    global::set_meter_provider(provider.clone());

    Some(provider)
}

fn ws_connections_active() -> &'static UpDownCounter<i64> {
    WS_CONNECTIONS_ACTIVE.get_or_init(|| {
        global::meter("rc-server")
            .i64_up_down_counter("ws_connections_active")
            .with_description("Number of active control (WebSocket) connections")
            .build()
    })
}

/// Record a control connection being attached.
pub fn record_ws_connected() {
    ws_connections_active().add(1, &[]);
}

/// Record a control connection being detached.
pub fn record_ws_disconnected() {
    ws_connections_active().add(-1, &[]);
}

/// Record a successful voice channel join.
pub fn record_voice_join() {
    VOICE_JOINS_TOTAL
        .get_or_init(|| {
            global::meter("rc-server")
                .u64_counter("voice_joins_total")
                .with_description("Total voice channel joins")
                .build()
        })
        .add(1, &[]);
}

/// Count one forwarded RTP packet (hot path, atomic only).
pub fn record_rtp_forwarded() {
    RTP_PACKETS_FORWARDED.fetch_add(1, Ordering::Relaxed);
}

/// Flush the accumulated RTP packet count to the OTel counter.
///
/// Called from a periodic task in `main`.
pub fn flush_rtp_counter() {
    let count = RTP_PACKETS_FORWARDED.swap(0, Ordering::Relaxed);
    if count > 0 {
        RTP_PACKETS_COUNTER
            .get_or_init(|| {
                global::meter("rc-server")
                    .u64_counter("rtp_packets_forwarded_total")
                    .with_description("Total RTP packets forwarded between peers")
                    .build()
            })
            .add(count, &[]);
    }
}
