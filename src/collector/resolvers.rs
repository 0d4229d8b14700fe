use std::collections::{HashMap, HashSet};

use crate::collector::error::CollectorError;
use crate::collector::node_energy::PackageEnergy;

/// Everything the sampler needs to know about a pod, sourced from the
/// container runtime / Kubernetes API. `podwatt` never talks to the
/// runtime or apiserver directly — it is handed an implementation of this
/// trait at startup. Identity lookups are keyed by `(cgroup_pid, pid)`
/// exactly as the BPF event reports them; a lookup failure resolves the
/// event to the reserved `"system"` pod at the call site, it is never
/// treated as fatal.
pub trait PodResolver: Send + Sync {
    fn get_pod_id(&self, cgroup_pid: u64, pid: u64) -> Result<String, CollectorError>;
    fn get_pod_name(&self, cgroup_pid: u64, pid: u64) -> Result<String, CollectorError>;
    fn get_pod_namespace(&self, cgroup_pid: u64, pid: u64) -> Result<String, CollectorError>;
    fn get_container_id(&self, cgroup_pid: u64, pid: u64) -> Result<String, CollectorError>;

    /// Reads `io.stat`-style per-container disk bytes.
    /// Returns `(read_bytes, write_bytes, disk_count)`.
    fn read_cgroup_io_stat(&self, cgroup_pid: u64, pid: u64) -> Result<(u64, u64, u32), CollectorError>;

    /// Reads the standard cgroupfs stat set (e.g. cpu/memory controller
    /// files) for one container, keyed by metric name. Populates
    /// `PodEnergy::cgroupfs_stats` via `KeyedStat::add_stat`.
    fn read_cgroupfs_stats(&self, container_id: &str) -> Result<HashMap<String, u64>, CollectorError>;

    /// The full set of pod-ids the resolver currently believes are alive.
    /// Used only when the registry's inactive-pod count crosses
    /// [`crate::collector::registry::MAX_INACTIVE_PODS`] — assumed to be
    /// an expensive call against the outside world.
    fn get_alive_pods(&self) -> HashSet<String>;
}

/// Kubelet summary API stats, read once per tick. `pod_key` is
/// `"<namespace>/<name>"`.
pub trait KubeletReader: Send + Sync {
    /// `(cpu_by_pod_key, memory_by_pod_key)`, or an error if the summary
    /// endpoint could not be read or its metric set doesn't have the
    /// expected cardinality — in which case the sampler leaves kubelet
    /// stats untouched for this tick.
    fn get_pod_metrics(&self) -> Result<(HashMap<String, u64>, HashMap<String, u64>), CollectorError>;
}

/// Node-level energy counters: RAPL package energy and whole-node sensor
/// energy.
pub trait EnergyReader: Send + Sync {
    fn get_rapl_energy(&self) -> Result<HashMap<u32, PackageEnergy>, CollectorError>;
    fn get_energy_from_host(&self) -> Result<HashMap<String, u64>, CollectorError>;
}

/// Per-CPU frequency, read once per tick.
pub trait FrequencyReader: Send + Sync {
    fn get_cpu_core_frequency(&self) -> HashMap<u32, u64>;
}

/// Per-process GPU energy, in millijoules, attributed by PID. `podwatt`
/// sums every PID belonging to a pod when aggregating this to pod
/// granularity.
pub trait GpuReader: Send + Sync {
    fn get_curr_gpu_energy_per_pid(&self) -> HashMap<u64, u64>;
}

/// Stub implementations of every external resolver: empty/no data, and a
/// `CollectorError` from every fallible lookup. A collaborator that isn't
/// wired up yet must still let the sampler run end-to-end and publish
/// zeroed node/pod state instead of failing to start.
pub mod stub {
    use super::*;

    fn unavailable(what: &str) -> CollectorError {
        CollectorError::Resolve(format!("{what}: no resolver configured"))
    }

    #[derive(Debug, Default, Clone, Copy)]
    pub struct StubPodResolver;

    impl PodResolver for StubPodResolver {
        fn get_pod_id(&self, _cgroup_pid: u64, _pid: u64) -> Result<String, CollectorError> {
            Err(unavailable("get_pod_id"))
        }
        fn get_pod_name(&self, _cgroup_pid: u64, _pid: u64) -> Result<String, CollectorError> {
            Err(unavailable("get_pod_name"))
        }
        fn get_pod_namespace(&self, _cgroup_pid: u64, _pid: u64) -> Result<String, CollectorError> {
            Err(unavailable("get_pod_namespace"))
        }
        fn get_container_id(&self, _cgroup_pid: u64, _pid: u64) -> Result<String, CollectorError> {
            Err(unavailable("get_container_id"))
        }
        fn read_cgroup_io_stat(&self, _cgroup_pid: u64, _pid: u64) -> Result<(u64, u64, u32), CollectorError> {
            Err(unavailable("read_cgroup_io_stat"))
        }
        fn read_cgroupfs_stats(&self, _container_id: &str) -> Result<HashMap<String, u64>, CollectorError> {
            Err(unavailable("read_cgroupfs_stats"))
        }
        fn get_alive_pods(&self) -> HashSet<String> {
            HashSet::new()
        }
    }

    #[derive(Debug, Default, Clone, Copy)]
    pub struct StubKubeletReader;

    impl KubeletReader for StubKubeletReader {
        fn get_pod_metrics(&self) -> Result<(HashMap<String, u64>, HashMap<String, u64>), CollectorError> {
            Err(unavailable("get_pod_metrics"))
        }
    }

    #[derive(Debug, Default, Clone, Copy)]
    pub struct StubEnergyReader;

    impl EnergyReader for StubEnergyReader {
        fn get_rapl_energy(&self) -> Result<HashMap<u32, PackageEnergy>, CollectorError> {
            Err(unavailable("get_rapl_energy"))
        }
        fn get_energy_from_host(&self) -> Result<HashMap<String, u64>, CollectorError> {
            Err(unavailable("get_energy_from_host"))
        }
    }

    #[derive(Debug, Default, Clone, Copy)]
    pub struct StubFrequencyReader;

    impl FrequencyReader for StubFrequencyReader {
        fn get_cpu_core_frequency(&self) -> HashMap<u32, u64> {
            HashMap::new()
        }
    }

    #[derive(Debug, Default, Clone, Copy)]
    pub struct StubGpuReader;

    impl GpuReader for StubGpuReader {
        fn get_curr_gpu_energy_per_pid(&self) -> HashMap<u64, u64> {
            HashMap::new()
        }
    }
}
