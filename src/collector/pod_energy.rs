use std::collections::HashMap;

use crate::collector::counter_kind::CounterKind;
use crate::collector::keyed_stat::KeyedStat;
use crate::collector::rolling_stat::RollingStat;

/// Metric names understood by [`PodEnergy::to_estimator_vector`], matching
/// the estimator's fixed column order.
pub const CURR_BYTES_READ: &str = "curr_bytes_read";
pub const CURR_BYTES_WRITES: &str = "curr_bytes_writes";
pub const CURR_CACHE_MISS: &str = "curr_cache_miss";
pub const CURR_CPU_CYCLES: &str = "curr_cpu_cycles";
pub const CURR_CPU_INSTR: &str = "curr_cpu_instr";
pub const CURR_CPU_TIME: &str = "curr_cpu_time";

/// Per-pod bundle of rolling statistics: CPU time, hardware counters,
/// cgroupfs stats, kubelet stats, disk I/O, and energy attributed in each
/// of the RAPL/GPU/other energy domains.
#[derive(Debug, Clone)]
pub struct PodEnergy {
    pub pod_name: String,
    pub namespace: String,
    pub pod_id: String,

    /// Last process witnessed for this pod within a tick (last-wins).
    pub latest_cgroup_pid: u64,
    pub latest_pid: u64,
    pub latest_command: String,

    pub cpu_time: RollingStat,
    pub counter_stats: HashMap<CounterKind, RollingStat>,
    /// metric name -> per-container rolling stat, summed to a pod-level
    /// value.
    pub cgroupfs_stats: HashMap<String, KeyedStat<String>>,
    pub kubelet_stats: HashMap<String, RollingStat>,

    pub bytes_read: KeyedStat<String>,
    pub bytes_write: KeyedStat<String>,
    pub disks: u32,

    pub avg_cpu_freq: f64,
    pub curr_cpu_time_per_cpu: HashMap<u32, u64>,
    pub curr_processes: u32,

    pub energy_in_core: RollingStat,
    pub energy_in_dram: RollingStat,
    pub energy_in_uncore: RollingStat,
    pub energy_in_pkg: RollingStat,
    pub energy_in_gpu: RollingStat,
    pub energy_in_other: RollingStat,
    pub dyn_energy: RollingStat,
}

impl PodEnergy {
    pub fn new(pod_name: impl Into<String>, namespace: impl Into<String>, pod_id: impl Into<String>) -> Self {
        Self {
            pod_name: pod_name.into(),
            namespace: namespace.into(),
            pod_id: pod_id.into(),
            latest_cgroup_pid: 0,
            latest_pid: 0,
            latest_command: String::new(),
            cpu_time: RollingStat::new(),
            counter_stats: HashMap::new(),
            cgroupfs_stats: HashMap::new(),
            kubelet_stats: HashMap::new(),
            bytes_read: KeyedStat::new(),
            bytes_write: KeyedStat::new(),
            disks: 0,
            avg_cpu_freq: 0.0,
            curr_cpu_time_per_cpu: HashMap::new(),
            curr_processes: 0,
            energy_in_core: RollingStat::new(),
            energy_in_dram: RollingStat::new(),
            energy_in_uncore: RollingStat::new(),
            energy_in_pkg: RollingStat::new(),
            energy_in_gpu: RollingStat::new(),
            energy_in_other: RollingStat::new(),
            dyn_energy: RollingStat::new(),
        }
    }

    /// Clear every per-tick field ahead of a new tick's BPF drain.
    pub fn reset_curr(&mut self) {
        self.cpu_time.reset_current();
        for stat in self.counter_stats.values_mut() {
            stat.reset_current();
        }
        for stat in self.cgroupfs_stats.values_mut() {
            stat.reset_current();
        }
        for stat in self.kubelet_stats.values_mut() {
            stat.reset_current();
        }
        self.bytes_read.reset_current();
        self.bytes_write.reset_current();
        self.curr_cpu_time_per_cpu.clear();
        self.curr_processes = 0;
        self.energy_in_core.reset_current();
        self.energy_in_dram.reset_current();
        self.energy_in_uncore.reset_current();
        self.energy_in_pkg.reset_current();
        self.energy_in_gpu.reset_current();
        self.energy_in_other.reset_current();
        self.dyn_energy.reset_current();
    }

    pub fn set_latest_process(&mut self, cgroup_pid: u64, pid: u64, command: impl Into<String>) {
        self.latest_cgroup_pid = cgroup_pid;
        self.latest_pid = pid;
        self.latest_command = command.into();
    }

    pub fn add_cpu_time(&mut self, ticks: u64) {
        let _ = self.cpu_time.add_new_current(ticks);
    }

    pub fn add_counter(&mut self, kind: CounterKind, value: u64) {
        let stat = self.counter_stats.entry(kind).or_insert_with(RollingStat::new);
        let _ = stat.add_new_current(value);
    }

    /// Record one container's reading for a cgroupfs metric this tick.
    pub fn add_cgroup_stat(&mut self, name: &str, container_id: &str, value: u64) {
        let keyed = self
            .cgroupfs_stats
            .entry(name.to_string())
            .or_insert_with(KeyedStat::new);
        keyed.add_stat(container_id.to_string(), value);
    }

    pub fn add_kubelet_aggregate(&mut self, name: &str, aggregate: u64) {
        let stat = self
            .kubelet_stats
            .entry(name.to_string())
            .or_insert_with(RollingStat::new);
        stat.set_new_aggregate(aggregate);
    }

    pub fn add_io(&mut self, container_id: &str, rbytes: u64, wbytes: u64, disks: u32) {
        self.bytes_read.add_stat(container_id.to_string(), rbytes);
        self.bytes_write.add_stat(container_id.to_string(), wbytes);
        if disks > self.disks {
            self.disks = disks;
        }
    }

    pub fn set_energy_components(
        &mut self,
        core: u64,
        dram: u64,
        uncore: u64,
        pkg: u64,
        gpu: u64,
        other: u64,
        dyn_energy: u64,
    ) -> Result<(), crate::collector::error::CollectorError> {
        self.energy_in_core.add_new_current(core)?;
        self.energy_in_dram.add_new_current(dram)?;
        self.energy_in_uncore.add_new_current(uncore)?;
        self.energy_in_pkg.add_new_current(pkg)?;
        self.energy_in_gpu.add_new_current(gpu)?;
        self.energy_in_other.add_new_current(other)?;
        self.dyn_energy.add_new_current(dyn_energy)?;
        Ok(())
    }

    /// Look up this tick's `curr` value for one estimator metric by name.
    fn curr_metric(&self, name: &str) -> f64 {
        match name {
            CURR_BYTES_READ => self.bytes_read.sum_curr() as f64,
            CURR_BYTES_WRITES => self.bytes_write.sum_curr() as f64,
            CURR_CACHE_MISS => self
                .counter_stats
                .get(&CounterKind::CacheMisses)
                .map(RollingStat::get_curr)
                .unwrap_or(0) as f64,
            CURR_CPU_CYCLES => self
                .counter_stats
                .get(&CounterKind::Cycles)
                .map(RollingStat::get_curr)
                .unwrap_or(0) as f64,
            CURR_CPU_INSTR => self
                .counter_stats
                .get(&CounterKind::Instructions)
                .map(RollingStat::get_curr)
                .unwrap_or(0) as f64,
            CURR_CPU_TIME => self.cpu_time.get_curr() as f64,
            other => self
                .cgroupfs_stats
                .get(other)
                .map(KeyedStat::sum_curr)
                .or_else(|| self.kubelet_stats.get(other).map(RollingStat::get_curr))
                .unwrap_or(0) as f64,
        }
    }

    /// Project this pod's `curr` values into a fixed-order numeric vector
    /// for the external attribution model.
    pub fn to_estimator_vector(&self, metric_order: &[&str]) -> Vec<f64> {
        metric_order.iter().map(|name| self.curr_metric(name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_curr_zeroes_every_rolling_stat() {
        let mut pod = PodEnergy::new("a", "ns", "pod-a");
        pod.add_cpu_time(100);
        pod.add_counter(CounterKind::Cycles, 10);
        pod.curr_processes = 3;
        pod.curr_cpu_time_per_cpu.insert(0, 50);
        pod.set_energy_components(1, 2, 3, 4, 5, 6, 7).unwrap();

        pod.reset_curr();

        assert_eq!(pod.cpu_time.get_curr(), 0);
        assert_eq!(pod.counter_stats[&CounterKind::Cycles].get_curr(), 0);
        assert_eq!(pod.curr_processes, 0);
        assert!(pod.curr_cpu_time_per_cpu.is_empty());
        assert_eq!(pod.energy_in_core.get_curr(), 0);
        // aggr survives reset
        assert_eq!(pod.cpu_time.get_aggr(), 100);
        assert_eq!(pod.energy_in_core.get_aggr(), 1);
    }

    #[test]
    fn to_estimator_vector_projects_fixed_order() {
        let mut pod = PodEnergy::new("a", "ns", "pod-a");
        pod.add_cpu_time(42);
        pod.add_counter(CounterKind::Cycles, 7);
        pod.add_io("c1", 100, 200, 1);

        let order = [CURR_CPU_TIME, CURR_CPU_CYCLES, CURR_BYTES_READ, CURR_BYTES_WRITES];
        let vec = pod.to_estimator_vector(&order);
        assert_eq!(vec, vec![42.0, 7.0, 100.0, 200.0]);
    }

    #[test]
    fn add_io_tracks_max_disks() {
        let mut pod = PodEnergy::new("a", "ns", "pod-a");
        pod.add_io("c1", 0, 0, 2);
        pod.add_io("c2", 0, 0, 1);
        assert_eq!(pod.disks, 2);
    }

    #[test]
    fn add_cgroup_stat_sums_across_containers() {
        let mut pod = PodEnergy::new("a", "ns", "pod-a");
        pod.add_cgroup_stat("cgroupfs_cpu_usage_us", "c1", 10);
        pod.add_cgroup_stat("cgroupfs_cpu_usage_us", "c2", 20);
        assert_eq!(
            pod.cgroupfs_stats
                .get("cgroupfs_cpu_usage_us")
                .unwrap()
                .sum_curr(),
            30
        );
    }
}
