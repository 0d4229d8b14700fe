use std::collections::HashMap;

use crate::collector::keyed_stat::KeyedStat;
use crate::collector::rolling_stat::RollingStat;

/// One package's RAPL energy reading, in millijoules.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageEnergy {
    pub pkg_mj: u64,
    pub core_mj: u64,
    pub dram_mj: u64,
    pub uncore_mj: u64,
}

/// Node-level energy: per-package and whole-node rolling statistics for
/// sensor energy and RAPL package/core/DRAM/uncore energy.
#[derive(Debug, Clone, Default)]
pub struct NodeEnergy {
    pub energy_in_sensor: KeyedStat<String>,
    pub energy_in_pkg: KeyedStat<u32>,
    pub energy_in_core: KeyedStat<u32>,
    pub energy_in_dram: KeyedStat<u32>,
    pub energy_in_uncore: KeyedStat<u32>,
    pub energy_in_gpu: RollingStat,
    pub energy_in_other: u64,
    pub usage: HashMap<String, u64>,
}

impl NodeEnergy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset_curr(&mut self) {
        self.energy_in_sensor.reset_current();
        self.energy_in_pkg.reset_current();
        self.energy_in_core.reset_current();
        self.energy_in_dram.reset_current();
        self.energy_in_uncore.reset_current();
        self.energy_in_gpu.reset_current();
        self.energy_in_other = 0;
    }

    /// Apply a fresh read of sensor/RAPL/GPU energy and the pod-usage sum
    /// map, then derive `energy_in_other`:
    ///
    /// `other = max(0, sensor_total_curr - pkg_total_curr - total_gpu_mj)`,
    /// or `0` if no sensor reading is present at all.
    pub fn set_values(
        &mut self,
        sensor_mj: &HashMap<String, u64>,
        pkg_mj: &HashMap<u32, PackageEnergy>,
        total_gpu_mj: u64,
        pod_usage_sums: HashMap<String, u64>,
    ) {
        for (name, value) in sensor_mj {
            self.energy_in_sensor.set_aggregate(name.clone(), *value);
        }

        for (pkg_id, pkg) in pkg_mj {
            self.energy_in_pkg.set_aggregate(*pkg_id, pkg.pkg_mj);
            self.energy_in_core.set_aggregate(*pkg_id, pkg.core_mj);
            self.energy_in_dram.set_aggregate(*pkg_id, pkg.dram_mj);
            self.energy_in_uncore.set_aggregate(*pkg_id, pkg.uncore_mj);
        }

        let _ = self.energy_in_gpu.add_new_current(total_gpu_mj);

        self.usage = pod_usage_sums;

        let sensor_total = self.energy_in_sensor.sum_curr();
        let pkg_total = self.energy_in_pkg.sum_curr();

        self.energy_in_other = if sensor_mj.is_empty() {
            0
        } else {
            sensor_total
                .saturating_sub(pkg_total)
                .saturating_sub(total_gpu_mj)
        };
    }

    /// Read this tick's per-package core/DRAM/uncore deltas.
    pub fn per_pkg_deltas(&self, pkg_id: u32) -> (u64, u64, u64) {
        let core = self.energy_in_core.get(&pkg_id).map(RollingStat::get_curr).unwrap_or(0);
        let dram = self.energy_in_dram.get(&pkg_id).map(RollingStat::get_curr).unwrap_or(0);
        let uncore = self
            .energy_in_uncore
            .get(&pkg_id)
            .map(RollingStat::get_curr)
            .unwrap_or(0);
        (core, dram, uncore)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(pkg_mj: u64, core_mj: u64, dram_mj: u64, uncore_mj: u64) -> PackageEnergy {
        PackageEnergy {
            pkg_mj,
            core_mj,
            dram_mj,
            uncore_mj,
        }
    }

    #[test]
    fn derives_other_from_sensor_minus_pkg_and_gpu() {
        let mut node = NodeEnergy::new();
        let sensor: HashMap<String, u64> = [("sens0".to_string(), 150)].into();
        let pkgs: HashMap<u32, PackageEnergy> = [(0u32, pkg(100, 60, 30, 10))].into();

        node.set_values(&sensor, &pkgs, 0, HashMap::new());

        assert_eq!(node.per_pkg_deltas(0), (60, 30, 10));
        assert_eq!(node.energy_in_pkg.sum_curr(), 100);
        assert_eq!(node.energy_in_other, 50);
    }

    #[test]
    fn other_is_zero_without_a_sensor() {
        let mut node = NodeEnergy::new();
        let pkgs: HashMap<u32, PackageEnergy> = [(0u32, pkg(100, 60, 30, 10))].into();

        node.set_values(&HashMap::new(), &pkgs, 0, HashMap::new());

        assert_eq!(node.energy_in_other, 0);
    }

    #[test]
    fn other_never_goes_negative() {
        let mut node = NodeEnergy::new();
        let sensor: HashMap<String, u64> = [("sens0".to_string(), 10)].into();
        let pkgs: HashMap<u32, PackageEnergy> = [(0u32, pkg(100, 60, 30, 10))].into();

        node.set_values(&sensor, &pkgs, 0, HashMap::new());

        assert_eq!(node.energy_in_other, 0);
    }

    #[test]
    fn reset_curr_clears_every_keyed_and_scalar_field() {
        let mut node = NodeEnergy::new();
        let sensor: HashMap<String, u64> = [("sens0".to_string(), 150)].into();
        let pkgs: HashMap<u32, PackageEnergy> = [(0u32, pkg(100, 60, 30, 10))].into();
        node.set_values(&sensor, &pkgs, 5, HashMap::new());

        node.reset_curr();

        assert_eq!(node.energy_in_sensor.sum_curr(), 0);
        assert_eq!(node.energy_in_pkg.sum_curr(), 0);
        assert_eq!(node.energy_in_gpu.get_curr(), 0);
        assert_eq!(node.energy_in_other, 0);
        // aggregates are untouched by reset
        assert_eq!(node.energy_in_sensor.sum_aggr(), 150);
    }
}
