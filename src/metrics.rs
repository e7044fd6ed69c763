// Prometheus metrics definitions for the dinotame engine.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Exclusive resources currently held (taming session, duel, arena, boss arena).
    pub static ref ACTIVE_RESOURCES: IntGaugeVec = IntGaugeVec::new(
        Opts::new("dinotame_active_resources", "Exclusive resources currently active"),
        &["resource"],
    )
    .unwrap();

    /// Live WebSocket connections.
    pub static ref CONNECTED_WEBSOCKETS: IntGauge =
        IntGauge::new("dinotame_connected_websockets", "Live WebSocket connections").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    pub static ref TAMING_SESSIONS_TOTAL: IntCounter = IntCounter::new(
        "dinotame_taming_sessions_total",
        "Taming sessions started",
    )
    .unwrap();

    /// Knockout results, by outcome (dead, knockedOut, none).
    pub static ref KNOCKOUTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("dinotame_knockouts_total", "Knockout simulations by outcome"),
        &["outcome"],
    )
    .unwrap();

    /// Per-contributor tame attempts, by outcome (success, failed).
    pub static ref TAME_ATTEMPTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("dinotame_tame_attempts_total", "Tame attempts by outcome"),
        &["outcome"],
    )
    .unwrap();

    /// Battles fought, by mode (duel, arena, boss).
    pub static ref BATTLES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("dinotame_battles_total", "Battles fought by mode"),
        &["mode"],
    )
    .unwrap();

    /// Currency moved, by direction (earned, spent, refunded).
    pub static ref CURRENCY_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("dinotame_currency_total", "Currency moved by direction"),
        &["direction"],
    )
    .unwrap();

    /// Commands rejected with a validation error.
    pub static ref REJECTIONS_TOTAL: IntCounter = IntCounter::new(
        "dinotame_rejections_total",
        "Commands rejected",
    )
    .unwrap();

    pub static ref WEBSOCKET_MESSAGES_SENT_TOTAL: IntCounter = IntCounter::new(
        "dinotame_websocket_messages_sent_total",
        "Total WebSocket messages sent",
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Exchanges (duel) or strikes (arena, boss) per battle, by mode.
    pub static ref BATTLE_EXCHANGES: HistogramVec = HistogramVec::new(
        HistogramOpts::new("dinotame_battle_exchanges", "Exchanges per battle")
            .buckets(vec![1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 250.0, 1000.0]),
        &["mode"],
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ACTIVE_RESOURCES.clone()),
        Box::new(CONNECTED_WEBSOCKETS.clone()),
        Box::new(TAMING_SESSIONS_TOTAL.clone()),
        Box::new(KNOCKOUTS_TOTAL.clone()),
        Box::new(TAME_ATTEMPTS_TOTAL.clone()),
        Box::new(BATTLES_TOTAL.clone()),
        Box::new(CURRENCY_TOTAL.clone()),
        Box::new(REJECTIONS_TOTAL.clone()),
        Box::new(WEBSOCKET_MESSAGES_SENT_TOTAL.clone()),
        Box::new(BATTLE_EXCHANGES.clone()),
    ];

    for c in collectors {
        if let Err(e) = REGISTRY.register(c) {
            tracing::debug!("metric already registered: {e}");
        }
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
