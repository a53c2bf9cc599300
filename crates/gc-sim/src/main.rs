mod config;
mod logging;
mod workload;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use gc_tuner::sim::SimulatedRuntime;
use gc_tuner::Driver;

use crate::config::Cli;
use crate::workload::Workload;

const MIB: u64 = 1024 * 1024;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();
    logging::init(cli.verbose);

    let threshold = cli.threshold_bytes()?;
    let live = cli.live_bytes()?;
    let garbage_per_step = cli.garbage_bytes()?;

    if let Some(min_percent) = cli.min_percent {
        let previous = gc_tuner::set_min_gc_percent(min_percent);
        tracing::info!(previous, min_percent, "lower bound overridden");
    }
    if let Some(max_percent) = cli.max_percent {
        let previous = gc_tuner::set_max_gc_percent(max_percent);
        tracing::info!(previous, max_percent, "upper bound overridden");
    }

    let runtime = Arc::new(SimulatedRuntime::with_gc_percent(
        gc_tuner::get_default_gc_percent(),
    ));
    gc_tuner::install(runtime.clone(), Driver::Cycles(runtime.clone()))
        .map_err(|err| anyhow::anyhow!("failed to install GC tuner: {err:?}"))?;

    gc_tuner::tuning(threshold);

    tracing::info!(
        threshold_mib = cli.threshold_mib,
        live_mib = cli.live_mib,
        garbage_kib = cli.garbage_kib,
        steps = cli.steps,
        profile = ?cli.profile,
        "starting simulation"
    );

    let workload = Workload::new(
        &runtime,
        cli.profile,
        live,
        garbage_per_step,
        cli.steps,
    );

    println!("{:>6} {:>8} {:>10} {:>10} {:>8}", "cycle", "step", "live MiB", "heap MiB", "percent");
    let summary = workload.run(|record| {
        println!(
            "{:>6} {:>8} {:>10.1} {:>10.1} {:>8}",
            record.cycle,
            record.step,
            record.live as f64 / MIB as f64,
            record.heap as f64 / MIB as f64,
            record.gc_percent,
        );
    });

    gc_tuner::tuning(0);

    println!();
    println!("cycles:        {}", summary.cycles);
    println!("peak heap:     {:.1} MiB", summary.peak_heap as f64 / MIB as f64);
    println!("threshold:     {} MiB", cli.threshold_mib);
    println!("final percent: {}", summary.final_percent);
    println!(
        "within threshold: {}",
        if summary.peak_heap <= threshold { "yes" } else { "no" }
    );

    Ok(())
}
