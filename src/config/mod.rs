use serde::Deserialize;
use std::path::Path;

mod collector;
mod general;
mod log;

pub use collector::Collector as CollectorConfig;
pub use general::General;
pub use log::Log;

/// Top-level TOML configuration, loaded once at startup: defaulted
/// sections plus a `check()` validation pass that exits the process on a
/// bad value.
#[derive(Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    general: General,
    #[serde(default)]
    log: Log,
    #[serde(default)]
    collector: CollectorConfig,
}

impl Config {
    pub fn load(path: &dyn AsRef<Path>) -> Self {
        let content = std::fs::read_to_string(path).unwrap_or_else(|e| {
            eprintln!("unable to open config file: {e}");
            std::process::exit(1);
        });

        let config: Config = toml::from_str(&content).unwrap_or_else(|e| {
            eprintln!("failed to parse config file: {e}");
            std::process::exit(1);
        });

        config.general.check();
        config.collector.check();

        config
    }

    pub fn general(&self) -> &General {
        &self.general
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    pub fn collector(&self) -> &CollectorConfig {
        &self.collector
    }
}
