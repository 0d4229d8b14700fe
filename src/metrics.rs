//! Ambient self-monitoring metrics for the sampler itself: enough to see
//! the collector is healthy without exposing per-pod energy data.

use metriken::*;

#[metric(
    name = "podwatt_tick_count",
    description = "The number of sampler ticks that have completed"
)]
pub static TICK_COUNT: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "podwatt_tick_duration",
    description = "The amount of time the most recently completed tick took to run",
    metadata = { unit = "nanoseconds" }
)]
pub static TICK_DURATION: LazyGauge = LazyGauge::new(Gauge::default);

#[metric(
    name = "podwatt_pods_tracked",
    description = "The number of pods currently tracked by the registry"
)]
pub static PODS_TRACKED: LazyGauge = LazyGauge::new(Gauge::default);

#[metric(
    name = "podwatt_tick_errors",
    description = "The number of ticks that returned an error from the sampler"
)]
pub static TICK_ERRORS: LazyCounter = LazyCounter::new(Counter::default);
