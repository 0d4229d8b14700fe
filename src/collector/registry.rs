use std::collections::{HashMap, HashSet};

use crate::collector::pod_energy::PodEnergy;

/// Reserved pod-id for non-pod host processes.
pub const SYSTEM_POD_ID: &str = "system";

/// Number of pods that must look stale in one tick before the registry asks
/// the external pod lister who is actually still alive.
pub const MAX_INACTIVE_PODS: usize = 10;

/// Owns the set of live pods keyed by stable pod-id. Inserts a `PodEnergy`
/// on first sighting and evicts inactive pods under a bounded policy so
/// that a churning workload doesn't grow the registry without bound.
#[derive(Debug, Clone, Default)]
pub struct PodRegistry {
    pods: HashMap<String, PodEnergy>,
    active_this_tick: HashSet<String>,
}

impl PodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new tick: clear the set of pods seen as active so far. Does
    /// not touch any `PodEnergy`'s own `curr` fields — that is
    /// `PodEnergy::reset_curr`'s job.
    pub fn begin_tick(&mut self) {
        self.active_this_tick.clear();
    }

    pub fn get_or_create(&mut self, pod_id: &str, pod_name: &str, namespace: &str) -> &mut PodEnergy {
        self.pods
            .entry(pod_id.to_string())
            .or_insert_with(|| PodEnergy::new(pod_name, namespace, pod_id))
    }

    pub fn get(&self, pod_id: &str) -> Option<&PodEnergy> {
        self.pods.get(pod_id)
    }

    pub fn get_mut(&mut self, pod_id: &str) -> Option<&mut PodEnergy> {
        self.pods.get_mut(pod_id)
    }

    pub fn mark_active(&mut self, pod_id: &str) {
        self.active_this_tick.insert(pod_id.to_string());
    }

    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.active_this_tick.len()
    }

    pub fn inactive_count(&self) -> usize {
        self.pods.len().saturating_sub(self.active_this_tick.len())
    }

    pub fn should_reconcile(&self) -> bool {
        self.inactive_count() > MAX_INACTIVE_PODS
    }

    /// Remove any pod-id not present in `live_pods`. `"system"` is exempt
    /// and is never removed regardless of activity.
    pub fn reconcile_inactive(&mut self, live_pods: &HashSet<String>) {
        self.pods
            .retain(|pod_id, _| pod_id == SYSTEM_POD_ID || live_pods.contains(pod_id));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PodEnergy)> {
        self.pods.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut PodEnergy)> {
        self.pods.iter_mut()
    }

    pub fn pod_ids(&self) -> Vec<String> {
        self.pods.keys().cloned().collect()
    }
}
