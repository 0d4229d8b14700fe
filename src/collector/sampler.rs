use std::collections::{HashMap, HashSet};

use crate::collector::attributor::{power_from_usage_ratio, sum_usage, DynamicModel};
use crate::collector::bpf::{BpfCapabilities, BpfEvent, BpfEventTable, BpfTimeTable};
use crate::collector::counter_kind::CounterKind;
use crate::collector::error::CollectorError;
use crate::collector::node_energy::NodeEnergy;
use crate::collector::pod_energy::{
    CURR_BYTES_READ, CURR_BYTES_WRITES, CURR_CACHE_MISS, CURR_CPU_CYCLES, CURR_CPU_INSTR, CURR_CPU_TIME,
};
use crate::collector::registry::{PodRegistry, SYSTEM_POD_ID};
use crate::collector::resolvers::{EnergyReader, FrequencyReader, GpuReader, KubeletReader, PodResolver};

/// Fixed column order the estimator model sees every tick. Always includes
/// the hardware-counter columns even when a given attacher build doesn't
/// report them (they simply read 0).
pub const METRIC_ORDER: [&str; 6] = [
    CURR_CPU_TIME,
    CURR_CPU_CYCLES,
    CURR_CPU_INSTR,
    CURR_CACHE_MISS,
    CURR_BYTES_READ,
    CURR_BYTES_WRITES,
];

/// The state one sampler tick reads and mutates, guarded by the single
/// process-wide mutex. Lives behind `Collector`'s lock; never constructed
/// or locked directly by the sampler itself.
#[derive(Debug, Default)]
pub struct SharedState {
    pub registry: PodRegistry,
    pub node_energy: NodeEnergy,
    pub cpu_freq_khz: HashMap<u32, u64>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Owns every external collaborator and runs one tick of the sampling and
/// attribution pipeline. Nothing here is shared state — only
/// [`SharedState`] is, and only for the duration of [`Sampler::tick`].
pub struct Sampler {
    pub pod_resolver: Box<dyn PodResolver>,
    pub kubelet_reader: Box<dyn KubeletReader>,
    pub energy_reader: Box<dyn EnergyReader>,
    pub frequency_reader: Box<dyn FrequencyReader>,
    pub gpu_reader: Box<dyn GpuReader>,
    pub dynamic_model: Box<dyn DynamicModel>,
    pub event_table: Box<dyn BpfEventTable>,
    pub time_table: Box<dyn BpfTimeTable>,
    pub capabilities: BpfCapabilities,
    /// Namespace recorded for the reserved `"system"` pod.
    pub system_namespace: String,
    /// Pod name recorded for the reserved `"system"` pod.
    pub system_process_name: String,
}

impl Sampler {
    /// Runs one full tick, in order: drain BPF events, reconcile the pod
    /// registry, read node energy, and attribute it across pods. The
    /// caller holds `state` behind the process-wide mutex for the entire
    /// call.
    pub fn tick(&mut self, state: &mut SharedState) -> Result<(), CollectorError> {
        // 1. reset current-tick fields.
        state.registry.begin_tick();
        for (_, pod) in state.registry.iter_mut() {
            pod.reset_curr();
        }
        state.node_energy.reset_curr();

        // 2. refresh frequency map.
        if self.capabilities.enable_cpu_freq {
            state.cpu_freq_khz = self.frequency_reader.get_cpu_core_frequency();
        }

        // 3. drain BPF events.
        let mut container_of: HashMap<String, String> = HashMap::new();
        let mut pod_of_pid: HashMap<u64, String> = HashMap::new();

        for raw in self.event_table.iter() {
            let event = match BpfEvent::decode(&raw) {
                Ok(event) => event,
                Err(err) => {
                    trace!("skipping malformed bpf event: {err}");
                    continue;
                }
            };

            let pod_id = self
                .pod_resolver
                .get_pod_id(event.cgroup_pid, event.pid)
                .unwrap_or_else(|_| SYSTEM_POD_ID.to_string());

            let pod_name = if pod_id == SYSTEM_POD_ID {
                self.system_process_name.clone()
            } else {
                self.pod_resolver
                    .get_pod_name(event.cgroup_pid, event.pid)
                    .unwrap_or_else(|_| event.command_str())
            };

            // namespace is only resolved on first sighting; get_or_create
            // ignores name/namespace for a pod-id it already knows about.
            let namespace = if state.registry.get(&pod_id).is_some() {
                String::new()
            } else if pod_id == SYSTEM_POD_ID {
                self.system_namespace.clone()
            } else {
                self.pod_resolver
                    .get_pod_namespace(event.cgroup_pid, event.pid)
                    .unwrap_or_else(|_| "unknown".to_string())
            };
            state.registry.mark_active(&pod_id);

            let pod = state.registry.get_or_create(&pod_id, &pod_name, &namespace);
            pod.set_latest_process(event.cgroup_pid, event.pid, event.command_str());

            let (avg_freq, total_cpu_time, active_cpus) =
                weighted_cpu_time(&event, &state.cpu_freq_khz, self.capabilities.enable_cpu_freq);

            for &cpu in &active_cpus {
                *pod.curr_cpu_time_per_cpu.entry(cpu as u32).or_insert(0) += event.cpu_time[cpu] as u64;
            }
            pod.add_cpu_time(total_cpu_time);
            pod.avg_cpu_freq = avg_freq;

            for kind in &self.capabilities.available_counters {
                let value = match kind {
                    CounterKind::Cycles => event.cpu_cycles,
                    CounterKind::Instructions => event.cpu_instructions,
                    CounterKind::CacheMisses => event.cache_misses,
                };
                pod.add_counter(*kind, value);
            }

            pod.curr_processes += 1;

            if let Ok(container_id) = self.pod_resolver.get_container_id(event.cgroup_pid, event.pid) {
                if !container_of.contains_key(&container_id) && pod_id != SYSTEM_POD_ID {
                    container_of.insert(container_id.clone(), pod_id.clone());
                    if let Ok((rbytes, wbytes, disks)) =
                        self.pod_resolver.read_cgroup_io_stat(event.cgroup_pid, event.pid)
                    {
                        pod.add_io(&container_id, rbytes, wbytes, disks);
                    }
                }
            }

            pod_of_pid.entry(event.pid).or_insert_with(|| pod_id.clone());
        }

        // 4. clear bpf tables.
        self.event_table.delete_all();
        self.time_table.delete_all();

        // 5. reconcile inactive pods.
        if state.registry.should_reconcile() {
            let live = self.pod_resolver.get_alive_pods();
            state.registry.reconcile_inactive(&live);
        }

        // 6. per-container cgroupfs stats.
        for (container_id, pod_id) in &container_of {
            if let Ok(stats) = self.pod_resolver.read_cgroupfs_stats(container_id) {
                if let Some(pod) = state.registry.get_mut(pod_id) {
                    for (name, value) in stats {
                        pod.add_cgroup_stat(&name, container_id, value);
                    }
                }
            }
        }

        // 7. kubelet stats.
        if let Ok((cpu_by_pod, mem_by_pod)) = self.kubelet_reader.get_pod_metrics() {
            for (pod_key, pod_id) in pod_key_index(&state.registry) {
                if let Some(cpu) = cpu_by_pod.get(&pod_key) {
                    if let Some(pod) = state.registry.get_mut(&pod_id) {
                        pod.add_kubelet_aggregate("kubelet_cpu", *cpu);
                    }
                }
                if let Some(mem) = mem_by_pod.get(&pod_key) {
                    if let Some(pod) = state.registry.get_mut(&pod_id) {
                        pod.add_kubelet_aggregate("kubelet_memory", *mem);
                    }
                }
            }
        }

        // 8. project pod metrics.
        let pod_ids: Vec<String> = state.registry.pod_ids();
        let pod_metric_values: Vec<Vec<f64>> = pod_ids
            .iter()
            .map(|id| state.registry.get(id).unwrap().to_estimator_vector(&METRIC_ORDER))
            .collect();

        // 9. per-pod GPU delta.
        let gpu_by_pid = self.gpu_reader.get_curr_gpu_energy_per_pid();
        let mut gpu_by_pod: HashMap<String, u64> = HashMap::new();
        for (pid, mj) in &gpu_by_pid {
            if let Some(pod_id) = pod_of_pid.get(pid) {
                *gpu_by_pod.entry(pod_id.clone()).or_insert(0) += mj;
            }
        }
        let gpu_n_delta: Vec<f64> = pod_ids
            .iter()
            .map(|id| *gpu_by_pod.get(id).unwrap_or(&0) as f64)
            .collect();

        // 10. read node energy.
        let sum_usage_map = sum_usage(&METRIC_ORDER, &pod_metric_values);
        let total_gpu_mj: u64 = gpu_by_pod.values().sum();
        let pkg_energy = self.energy_reader.get_rapl_energy();
        let sensor_energy = self.energy_reader.get_energy_from_host();

        let rapl_read_failed = pkg_energy.is_err();
        let pkg_map = pkg_energy.unwrap_or_default();
        let sensor_map = sensor_energy.unwrap_or_default();

        state
            .node_energy
            .set_values(&sensor_map, &pkg_map, total_gpu_mj, sum_usage_map.clone());

        if rapl_read_failed {
            warn!("rapl energy read failed; publishing partial node-energy state");
            return Ok(());
        }

        if pod_ids.is_empty() {
            return Ok(());
        }

        // 11. per-package totals.
        let total_core: u64 = state.node_energy.energy_in_core.sum_curr();
        let total_dram: u64 = state.node_energy.energy_in_dram.sum_curr();
        let total_uncore: u64 = state.node_energy.energy_in_uncore.sum_curr();
        let total_pkg: u64 = state.node_energy.energy_in_pkg.sum_curr();

        // 12. attribution.
        let (pod_core, pod_dram, pod_uncore, pod_pkg) =
            power_from_usage_ratio(&pod_metric_values, total_core, total_dram, total_uncore, total_pkg, &sum_usage_map);

        let core_delta: Vec<f64> = pod_core.iter().map(|v| *v as f64).collect();
        let dram_delta: Vec<f64> = pod_dram.iter().map(|v| *v as f64).collect();
        let uncore_delta: Vec<f64> = pod_uncore.iter().map(|v| *v as f64).collect();
        let pkg_delta: Vec<f64> = pod_pkg.iter().map(|v| *v as f64).collect();

        let pod_dyn = self.dynamic_model.dynamic_power(
            &METRIC_ORDER,
            &pod_metric_values,
            &core_delta,
            &dram_delta,
            &uncore_delta,
            &pkg_delta,
            &gpu_n_delta,
        );

        let pod_other = state.node_energy.energy_in_other / pod_ids.len() as u64;

        // 13. write back.
        for (i, pod_id) in pod_ids.iter().enumerate() {
            let gpu = gpu_n_delta[i].ceil() as u64;
            let dyn_energy = pod_dyn.get(i).copied().unwrap_or(0.0) as u64;
            if let Some(pod) = state.registry.get_mut(pod_id) {
                pod.set_energy_components(pod_core[i], pod_dram[i], pod_uncore[i], pod_pkg[i], gpu, pod_other, dyn_energy)?;
            }
        }

        // 14. lock release — handled by the caller dropping its guard.
        Ok(())
    }
}

/// Frequency-weighted CPU time. When frequency weighting is disabled,
/// `total_cpu_time` falls back to the event's own run-time counter and
/// `active_cpus` is simply every nonzero tick slot.
///
/// `avg_freq` is named as a weighted average but is actually an unweighted
/// mean over the CPUs with a current frequency reading; we preserve that
/// behavior rather than silently changing the derived value.
fn weighted_cpu_time(event: &BpfEvent, cpu_freq: &HashMap<u32, u64>, enable_cpu_freq: bool) -> (f64, u64, Vec<usize>) {
    if !enable_cpu_freq {
        let active_cpus: Vec<usize> = event
            .cpu_time
            .iter()
            .enumerate()
            .filter(|(_, &t)| t > 0)
            .map(|(c, _)| c)
            .collect();
        return (0.0, event.process_run_time_ns, active_cpus);
    }

    let mut total_cpu_time: u64 = 0;
    for (&cpu, _) in cpu_freq.iter() {
        if (cpu as usize) < event.cpu_time.len() {
            total_cpu_time += event.cpu_time[cpu as usize] as u64;
        }
    }

    let active_cpus: Vec<usize> = event
        .cpu_time
        .iter()
        .enumerate()
        .filter(|(_, &t)| t > 0)
        .map(|(c, _)| c)
        .collect();

    let avg_freq = if cpu_freq.is_empty() {
        0.0
    } else {
        cpu_freq.values().sum::<u64>() as f64 / cpu_freq.len() as f64
    };

    (avg_freq, total_cpu_time, active_cpus)
}

fn pod_key_index(registry: &PodRegistry) -> Vec<(String, String)> {
    registry
        .iter()
        .map(|(id, pod)| (format!("{}/{}", pod.namespace, pod.pod_name), id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::attributor::NoDynamicModel;
    use crate::collector::bpf::{StubEventTable, StubTimeTable};
    use crate::collector::node_energy::PackageEnergy;
    use std::sync::Mutex;

    struct FakeResolver {
        pod_id: Mutex<Option<String>>,
        namespace: String,
        container_id: String,
        io: (u64, u64, u32),
        cgroupfs: HashMap<String, u64>,
    }

    impl PodResolver for FakeResolver {
        fn get_pod_id(&self, _cgroup_pid: u64, _pid: u64) -> Result<String, CollectorError> {
            self.pod_id
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| CollectorError::Resolve("pod id unresolved".to_string()))
        }
        fn get_pod_name(&self, _cgroup_pid: u64, _pid: u64) -> Result<String, CollectorError> {
            Ok("a".to_string())
        }
        fn get_pod_namespace(&self, _cgroup_pid: u64, _pid: u64) -> Result<String, CollectorError> {
            Ok(self.namespace.clone())
        }
        fn get_container_id(&self, _cgroup_pid: u64, _pid: u64) -> Result<String, CollectorError> {
            Ok(self.container_id.clone())
        }
        fn read_cgroup_io_stat(&self, _cgroup_pid: u64, _pid: u64) -> Result<(u64, u64, u32), CollectorError> {
            Ok(self.io)
        }
        fn read_cgroupfs_stats(&self, _container_id: &str) -> Result<HashMap<String, u64>, CollectorError> {
            Ok(self.cgroupfs.clone())
        }
        fn get_alive_pods(&self) -> HashSet<String> {
            HashSet::new()
        }
    }

    struct FakeKubelet;
    impl KubeletReader for FakeKubelet {
        fn get_pod_metrics(&self) -> Result<(HashMap<String, u64>, HashMap<String, u64>), CollectorError> {
            Ok((HashMap::new(), HashMap::new()))
        }
    }

    struct FakeEnergy {
        pkg: HashMap<u32, PackageEnergy>,
        sensor: HashMap<String, u64>,
    }
    impl EnergyReader for FakeEnergy {
        fn get_rapl_energy(&self) -> Result<HashMap<u32, PackageEnergy>, CollectorError> {
            Ok(self.pkg.clone())
        }
        fn get_energy_from_host(&self) -> Result<HashMap<String, u64>, CollectorError> {
            Ok(self.sensor.clone())
        }
    }

    struct FakeFrequency;
    impl FrequencyReader for FakeFrequency {
        fn get_cpu_core_frequency(&self) -> HashMap<u32, u64> {
            HashMap::new()
        }
    }

    struct FakeGpu {
        by_pid: HashMap<u64, u64>,
    }
    impl GpuReader for FakeGpu {
        fn get_curr_gpu_energy_per_pid(&self) -> HashMap<u64, u64> {
            self.by_pid.clone()
        }
    }

    fn encode_event(event: &BpfEvent) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&event.cgroup_pid.to_ne_bytes());
        bytes.extend_from_slice(&event.pid.to_ne_bytes());
        bytes.extend_from_slice(&event.process_run_time_ns.to_ne_bytes());
        bytes.extend_from_slice(&event.cpu_cycles.to_ne_bytes());
        bytes.extend_from_slice(&event.cpu_instructions.to_ne_bytes());
        bytes.extend_from_slice(&event.cache_misses.to_ne_bytes());
        bytes.extend_from_slice(&event.command);
        for tick in event.cpu_time {
            bytes.extend_from_slice(&tick.to_ne_bytes());
        }
        bytes
    }

    struct OneShotEventTable {
        events: Mutex<Vec<Vec<u8>>>,
    }
    impl BpfEventTable for OneShotEventTable {
        fn iter(&self) -> Vec<Vec<u8>> {
            self.events.lock().unwrap().drain(..).collect()
        }
        fn delete_all(&mut self) {}
    }

    fn sampler_with(events: Vec<BpfEvent>, resolver: FakeResolver, gpu: FakeGpu, pkg: HashMap<u32, PackageEnergy>, sensor: HashMap<String, u64>) -> Sampler {
        Sampler {
            pod_resolver: Box::new(resolver),
            kubelet_reader: Box::new(FakeKubelet),
            energy_reader: Box::new(FakeEnergy { pkg, sensor }),
            frequency_reader: Box::new(FakeFrequency),
            gpu_reader: Box::new(gpu),
            dynamic_model: Box::new(NoDynamicModel),
            event_table: Box::new(OneShotEventTable {
                events: Mutex::new(events.iter().map(encode_event).collect()),
            }),
            time_table: Box::new(StubTimeTable),
            capabilities: BpfCapabilities {
                enable_cpu_freq: false,
                available_counters: CounterKind::ALL.to_vec(),
            },
            system_namespace: "system".to_string(),
            system_process_name: "system_processes".to_string(),
        }
    }

    #[test]
    fn single_pod_single_event_conserves_energy() {
        let event = BpfEvent {
            cgroup_pid: 100,
            pid: 1000,
            process_run_time_ns: 1_000_000,
            cpu_cycles: 10,
            cpu_instructions: 20,
            cache_misses: 5,
            ..Default::default()
        };
        let resolver = FakeResolver {
            pod_id: Mutex::new(Some("A".to_string())),
            namespace: "ns".to_string(),
            container_id: "c1".to_string(),
            io: (0, 0, 0),
            cgroupfs: HashMap::new(),
        };
        let pkg: HashMap<u32, PackageEnergy> = [(
            0u32,
            PackageEnergy {
                pkg_mj: 100,
                core_mj: 60,
                dram_mj: 30,
                uncore_mj: 10,
            },
        )]
        .into();
        let sensor: HashMap<String, u64> = [("sens0".to_string(), 150)].into();

        let mut sampler = sampler_with(vec![event], resolver, FakeGpu { by_pid: HashMap::new() }, pkg, sensor);
        let mut state = SharedState::new();

        sampler.tick(&mut state).unwrap();

        let pod = state.registry.get("A").unwrap();
        assert_eq!(pod.pod_name, "a");
        assert_eq!(pod.namespace, "ns");
        // sole pod gets the entire core/dram/uncore/pkg budget.
        assert_eq!(pod.energy_in_core.get_curr(), 60);
        assert_eq!(pod.energy_in_dram.get_curr(), 30);
        assert_eq!(pod.energy_in_uncore.get_curr(), 10);
        assert_eq!(pod.energy_in_pkg.get_curr(), 100);
        assert_eq!(pod.energy_in_other.get_curr(), 50);
    }

    #[test]
    fn gpu_energy_sums_across_pids_of_one_pod() {
        let events = vec![
            BpfEvent {
                cgroup_pid: 100,
                pid: 10,
                ..Default::default()
            },
            BpfEvent {
                cgroup_pid: 100,
                pid: 11,
                ..Default::default()
            },
        ];
        let resolver = FakeResolver {
            pod_id: Mutex::new(Some("A".to_string())),
            namespace: "ns".to_string(),
            container_id: "c1".to_string(),
            io: (0, 0, 0),
            cgroupfs: HashMap::new(),
        };
        let gpu_by_pid: HashMap<u64, u64> = [(10u64, 5u64), (11u64, 7u64)].into();

        let mut sampler = sampler_with(events, resolver, FakeGpu { by_pid: gpu_by_pid }, HashMap::new(), HashMap::new());
        let mut state = SharedState::new();

        sampler.tick(&mut state).unwrap();

        let pod = state.registry.get("A").unwrap();
        assert_eq!(pod.energy_in_gpu.get_curr(), 12);
    }

    #[test]
    fn unresolved_pod_falls_back_to_system() {
        let event = BpfEvent {
            cgroup_pid: 1,
            pid: 1,
            ..Default::default()
        };
        let resolver = FakeResolver {
            pod_id: Mutex::new(None),
            namespace: "ignored".to_string(),
            container_id: "c0".to_string(),
            io: (0, 0, 0),
            cgroupfs: HashMap::new(),
        };
        let mut sampler = sampler_with(vec![event], resolver, FakeGpu { by_pid: HashMap::new() }, HashMap::new(), HashMap::new());
        let mut state = SharedState::new();

        sampler.tick(&mut state).unwrap();

        assert!(state.registry.get(SYSTEM_POD_ID).is_some());
    }

    #[test]
    fn empty_registry_tick_only_publishes_node_energy() {
        let mut sampler = sampler_with(
            vec![],
            FakeResolver {
                pod_id: Mutex::new(None),
                namespace: "ns".to_string(),
                container_id: "c".to_string(),
                io: (0, 0, 0),
                cgroupfs: HashMap::new(),
            },
            FakeGpu { by_pid: HashMap::new() },
            HashMap::new(),
            [("sens0".to_string(), 42)].into(),
        );
        let mut state = SharedState::new();

        sampler.tick(&mut state).unwrap();

        assert!(state.registry.is_empty());
        assert_eq!(state.node_energy.energy_in_sensor.sum_curr(), 42);
    }
}
