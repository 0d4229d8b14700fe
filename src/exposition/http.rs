//! Self-monitoring HTTP exposition: a msgpack and a JSON snapshot endpoint
//! over `podwatt`'s own ambient metrics, covering the sampler's own
//! health/latency counters rather than per-pod energy data.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use metriken::Value;
use metriken_exposition::{Counter, Gauge, Snapshot, SnapshotV2};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;

use crate::collector::Collector;
use crate::config::Config;

struct CachedSnapshot {
    timestamp: Instant,
    snapshot: Snapshot,
}

/// Caches the most recent snapshot for `ttl` so a burst of scrapes doesn't
/// each force their own pass over every registered metric.
struct SnapshotCache {
    cached: Mutex<Option<CachedSnapshot>>,
    ttl: Duration,
}

impl SnapshotCache {
    fn new(ttl: Duration) -> Self {
        Self {
            cached: Mutex::new(None),
            ttl,
        }
    }

    /// Refreshes the cached snapshot if stale, then hands the up-to-date
    /// snapshot to `with_snapshot` while still holding the cache lock.
    fn with_snapshot<R>(&self, collector: &Collector, with_snapshot: impl FnOnce(&Snapshot) -> R) -> R {
        let now = Instant::now();
        let mut cached = self.cached.lock();

        let stale = match cached.as_ref() {
            None => true,
            Some(c) => now.duration_since(c.timestamp) >= self.ttl,
        };

        if stale {
            let timestamp = SystemTime::now();
            let start = Instant::now();

            let pods_tracked = collector.with_state(|s| s.registry.len());
            crate::metrics::PODS_TRACKED.set(pods_tracked as i64);

            *cached = Some(CachedSnapshot {
                timestamp: now,
                snapshot: create(timestamp, start.elapsed()),
            });
        }

        with_snapshot(&cached.as_ref().unwrap().snapshot)
    }
}

struct AppState {
    collector: Arc<Collector>,
    snapshots: SnapshotCache,
}

pub async fn serve(config: Arc<Config>, collector: Arc<Collector>) {
    let ttl = config.general().ttl();
    let state = Arc::new(AppState {
        collector,
        snapshots: SnapshotCache::new(ttl),
    });
    let listen_addr = config.general().listen_addr();
    let app = app(state);

    let listener = TcpListener::bind(listen_addr).await.expect("failed to listen");

    axum::serve(listener, app).await.expect("failed to run http server");
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/metrics/binary", get(msgpack))
        .route("/metrics/json", get(json))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(RequestDecompressionLayer::new())
                .layer(CompressionLayer::new()),
        )
}

async fn msgpack(State(state): State<Arc<AppState>>) -> Vec<u8> {
    state
        .snapshots
        .with_snapshot(&state.collector, |snapshot| rmp_serde::encode::to_vec(snapshot).expect("failed to serialize snapshot"))
}

async fn json(State(state): State<Arc<AppState>>) -> String {
    state
        .snapshots
        .with_snapshot(&state.collector, |snapshot| serde_json::to_string(snapshot).expect("failed to serialize snapshot"))
}

async fn root() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("podwatt {version}\nenergy telemetry agent, self-monitoring endpoint\n")
}

fn create(timestamp: SystemTime, duration: std::time::Duration) -> Snapshot {
    let mut s = SnapshotV2 {
        systemtime: timestamp,
        duration,
        metadata: [
            ("source".to_string(), env!("CARGO_PKG_NAME").to_string()),
            ("version".to_string(), env!("CARGO_PKG_VERSION").to_string()),
        ]
        .into(),
        counters: Vec::new(),
        gauges: Vec::new(),
        histograms: Vec::new(),
    };

    for (metric_id, metric) in metriken::metrics().iter().enumerate() {
        let Some(value) = metric.value() else {
            continue;
        };

        let mut metadata: HashMap<String, String> = [("metric".to_string(), metric.name().to_string())].into();
        for (k, v) in metric.metadata().iter() {
            metadata.insert(k.to_string(), v.to_string());
        }

        let name = format!("{metric_id}");

        match value {
            Value::Counter(value) => s.counters.push(Counter { name, value, metadata }),
            Value::Gauge(value) => s.gauges.push(Gauge { name, value, metadata }),
            Value::Other(_) => {}
        }
    }

    Snapshot::V2(s)
}
