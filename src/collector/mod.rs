//! The sampling loop and energy-attribution engine: a single background
//! task that, once per sampling period, drains BPF
//! events, aggregates them into per-pod rolling statistics, reads node
//! energy, attributes it across pods, and publishes the result under one
//! process-wide lock.

pub mod attributor;
pub mod bpf;
pub mod counter_kind;
pub mod error;
pub mod keyed_stat;
pub mod node_energy;
pub mod pod_energy;
pub mod registry;
pub mod resolvers;
pub mod rolling_stat;
pub mod sampler;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub use sampler::{Sampler, SharedState};

/// Owns the single process-wide lock over [`SharedState`]. No finer-grained
/// locking is exposed — correctness of the attribution depends on the pod
/// set and node deltas being read together.
pub struct Collector {
    state: Mutex<SharedState>,
}

impl Collector {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SharedState::new()),
        }
    }

    /// Runs the sampler forever at a fixed rate, honoring `running` as a
    /// cooperative shutdown signal checked at the start of each tick,
    /// before the lock is acquired. Ticks never overlap: if a tick's work
    /// exceeds the period, the next tick runs immediately on completion.
    pub async fn run(self: Arc<Self>, mut sampler: Sampler, period: Duration, running: Arc<AtomicBool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if !running.load(Ordering::SeqCst) {
                debug!("shutdown signal observed, stopping sampler");
                return;
            }

            let start = Instant::now();
            let (result, pods_tracked) = {
                let mut state = self.state.lock();
                let result = sampler.tick(&mut state);
                (result, state.registry.len())
            };
            let elapsed = start.elapsed();

            crate::metrics::TICK_COUNT.increment();
            crate::metrics::TICK_DURATION.set(elapsed.as_nanos() as i64);
            crate::metrics::PODS_TRACKED.set(pods_tracked as i64);

            if let Err(error) = result {
                error!("sampler tick failed: {error}");
                crate::metrics::TICK_ERRORS.increment();
            }
        }
    }

    /// Takes a consistent snapshot of the published state under the lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&SharedState) -> R) -> R {
        let state = self.state.lock();
        f(&state)
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}
