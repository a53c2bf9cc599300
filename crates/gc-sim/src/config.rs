use anyhow::Result;
use clap::{Parser, ValueEnum};

const MIB: u64 = 1024 * 1024;
const KIB: u64 = 1024;

/// Drive the GC tuner against a simulated reclaimer and report how the
/// GC percent follows the heap.
#[derive(Debug, Clone, Parser)]
#[command(about, long_about, version)]
pub struct Cli {
    /// Live-heap ceiling the tuner works against, in MiB
    #[arg(long, env = "GC_SIM_THRESHOLD_MIB", default_value_t = 512)]
    pub threshold_mib: u64,

    /// Live heap at the start of the run, in MiB
    #[arg(long, env = "GC_SIM_LIVE_MIB", default_value_t = 64)]
    pub live_mib: u64,

    /// Garbage allocated per step, in KiB
    #[arg(long, env = "GC_SIM_GARBAGE_KIB", default_value_t = 512)]
    pub garbage_kib: u64,

    /// Number of allocation steps to simulate
    #[arg(long, env = "GC_SIM_STEPS", default_value_t = 20_000)]
    pub steps: u64,

    /// Shape of the live heap over the run
    #[arg(long, env = "GC_SIM_PROFILE", value_enum, default_value_t = Profile::Ramp)]
    pub profile: Profile,

    /// Override the process lower bound on the GC percent
    #[arg(long, env = "GC_SIM_MIN_PERCENT")]
    pub min_percent: Option<u32>,

    /// Override the process upper bound on the GC percent
    #[arg(long, env = "GC_SIM_MAX_PERCENT")]
    pub max_percent: Option<u32>,

    /// Log every tuning decision
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Tuner threshold in bytes.
    pub fn threshold_bytes(&self) -> Result<u64> {
        if self.threshold_mib == 0 {
            anyhow::bail!("--threshold-mib must be greater than zero");
        }
        to_bytes(self.threshold_mib, MIB, "threshold-mib")
    }

    pub fn live_bytes(&self) -> Result<u64> {
        to_bytes(self.live_mib, MIB, "live-mib")
    }

    pub fn garbage_bytes(&self) -> Result<u64> {
        to_bytes(self.garbage_kib, KIB, "garbage-kib")
    }
}

fn to_bytes(value: u64, unit: u64, flag: &str) -> Result<u64> {
    match value.checked_mul(unit) {
        Some(bytes) => Ok(bytes),
        None => anyhow::bail!("--{flag} {value} does not fit in 64-bit bytes"),
    }
}

/// How the live heap evolves over the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Profile {
    /// Live heap stays at its initial size.
    Steady,
    /// Live heap grows linearly to four times its initial size.
    Ramp,
    /// Live heap triples for the middle fifth of the run.
    Spike,
}

impl Profile {
    /// Live bytes at `step` of `steps`.
    pub fn live_at(self, base: u64, step: u64, steps: u64) -> u64 {
        let steps = steps.max(1);
        match self {
            Profile::Steady => base,
            Profile::Ramp => base + base * 3 * step.min(steps) / steps,
            Profile::Spike => {
                if (2 * steps / 5..3 * steps / 5).contains(&step) {
                    base * 3
                } else {
                    base
                }
            }
        }
    }
}
