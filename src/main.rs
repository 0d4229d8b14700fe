#[macro_use]
extern crate ringlog;

mod collector;
mod config;
mod exposition;
mod metrics;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use backtrace::Backtrace;
use clap::Parser;
use ringlog::{LogBuilder, MultiLogBuilder, Output, Stderr};

use collector::attributor::NoDynamicModel;
use collector::bpf::{BpfCapabilities, StubEventTable, StubTimeTable};
use collector::resolvers::stub::{StubEnergyReader, StubFrequencyReader, StubGpuReader, StubKubeletReader, StubPodResolver};
use collector::{Collector, Sampler};
use config::Config;

#[derive(Parser)]
#[command(version)]
#[command(about = "Per-node energy telemetry agent: samples RAPL/GPU/BPF counters and attributes node energy to pods", long_about = None)]
struct Args {
    /// path to the TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
}

fn main() {
    std::panic::set_hook(Box::new(|s| {
        eprintln!("{s}");
        eprintln!("{:?}", Backtrace::new());
        std::process::exit(101);
    }));

    let args = Args::parse();

    let config = Config::load(&args.config);
    let config = Arc::new(config);

    let debug_output: Box<dyn Output> = Box::new(Stderr::new());

    let level = config.log().level();

    let debug_log = if level <= ringlog::Level::Info {
        LogBuilder::new().format(ringlog::default_format)
    } else {
        LogBuilder::new()
    }
    .output(debug_output)
    .build()
    .expect("failed to initialize debug log");

    let mut log = MultiLogBuilder::new()
        .level_filter(level.to_level_filter())
        .default(debug_log)
        .build()
        .start();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("podwatt")
        .build()
        .expect("failed to launch async runtime");

    rt.spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            let _ = log.flush();
        }
    });

    let running = Arc::new(AtomicBool::new(true));

    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            if running.load(Ordering::SeqCst) {
                eprintln!("finishing in-flight tick before shutdown...");
                running.store(false, Ordering::SeqCst);
            } else {
                eprintln!("terminating...");
                std::process::exit(2);
            }
        })
        .expect("failed to set ctrl-c handler");
    }

    let collector = Arc::new(Collector::new());

    let sampler = Sampler {
        pod_resolver: Box::new(StubPodResolver),
        kubelet_reader: Box::new(StubKubeletReader),
        energy_reader: Box::new(StubEnergyReader),
        frequency_reader: Box::new(StubFrequencyReader),
        gpu_reader: Box::new(StubGpuReader),
        dynamic_model: Box::new(NoDynamicModel),
        event_table: Box::new(StubEventTable),
        time_table: Box::new(StubTimeTable),
        capabilities: BpfCapabilities {
            enable_cpu_freq: config.collector().enable_cpu_freq(),
            available_counters: config.collector().available_counters(),
        },
        system_namespace: config.collector().system_namespace().to_string(),
        system_process_name: config.collector().system_process_name().to_string(),
    };

    let period = config.collector().sample_period();

    rt.spawn(collector.clone().run(sampler, period, running));

    rt.block_on(exposition::http::serve(config, collector));
}
