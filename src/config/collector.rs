use serde::Deserialize;

fn sample_period_sec() -> u64 {
    3
}

fn system_namespace() -> String {
    "unknown".to_string()
}

fn system_process_name() -> String {
    "system_processes".to_string()
}

fn enable_cpu_freq() -> bool {
    false
}

fn available_counters() -> Vec<String> {
    vec!["cpu_cycles".to_string(), "cpu_instructions".to_string(), "cache_miss".to_string()]
}

/// Sampler tuning knobs read from the `[collector]` section of the config
/// file.
#[derive(Deserialize)]
pub struct Collector {
    #[serde(default = "sample_period_sec")]
    sample_period_sec: u64,

    /// namespace recorded for the reserved "system" pod
    #[serde(default = "system_namespace")]
    system_namespace: String,

    /// pod name recorded for the reserved "system" pod, covering processes
    /// that could not be attributed to any actual pod
    #[serde(default = "system_process_name")]
    system_process_name: String,

    /// whether the attached BPF program reports per-CPU frequency weighting
    #[serde(default = "enable_cpu_freq")]
    enable_cpu_freq: bool,

    /// hardware counter names the attacher reports this build, matching
    /// `CounterKind::name()`
    #[serde(default = "available_counters")]
    available_counters: Vec<String>,
}

impl Default for Collector {
    fn default() -> Self {
        Self {
            sample_period_sec: sample_period_sec(),
            system_namespace: system_namespace(),
            system_process_name: system_process_name(),
            enable_cpu_freq: enable_cpu_freq(),
            available_counters: available_counters(),
        }
    }
}

impl Collector {
    pub fn check(&self) {
        if self.sample_period_sec == 0 {
            eprintln!("collector.sample_period_sec must be nonzero");
            std::process::exit(1);
        }
        for name in &self.available_counters {
            if parse_counter(name).is_none() {
                eprintln!("unknown counter name in collector.available_counters: {name}");
                std::process::exit(1);
            }
        }
    }

    pub fn sample_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sample_period_sec)
    }

    pub fn system_namespace(&self) -> &str {
        &self.system_namespace
    }

    pub fn system_process_name(&self) -> &str {
        &self.system_process_name
    }

    pub fn enable_cpu_freq(&self) -> bool {
        self.enable_cpu_freq
    }

    pub fn available_counters(&self) -> Vec<crate::collector::counter_kind::CounterKind> {
        self.available_counters.iter().filter_map(|n| parse_counter(n)).collect()
    }
}

fn parse_counter(name: &str) -> Option<crate::collector::counter_kind::CounterKind> {
    crate::collector::counter_kind::CounterKind::ALL
        .into_iter()
        .find(|k| k.name() == name)
}
