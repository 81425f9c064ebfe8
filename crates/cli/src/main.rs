//! DRAM row-buffer probe CLI.
//!
//! This binary provides a single entry point for all experiments. It performs:
//! 1. **Row policy:** Scan the arena, time row-hit / no-conflict / conflict pairs and classify the page policy.
//! 2. **Row pair:** Time a same-row pair against a different-row pair at fixed offsets.
//! 3. **Copy sweep:** Time block copies across power-of-two sizes.
//!
//! Results go to stdout (summary or JSON) and, with `--output`, raw samples to a CSV file.
//! Logs go to stderr.

use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rowprobe_core::common::constants::{CSV_LABEL_HEADER, CSV_SIZE_HEADER};
use rowprobe_core::common::{ConfigError, ProbeError};
use rowprobe_core::config::PagePolicy;
use rowprobe_core::memory::{Arena, SimulatedMemory};
use rowprobe_core::probe::{self, Instruments};
use rowprobe_core::report::{
    CsvSink, to_json, write_copy_sweep, write_row_pair, write_row_policy,
};
use rowprobe_core::ProbeConfig;

#[derive(Parser, Debug)]
#[command(
    name = "rowprobe",
    author,
    version,
    about = "DRAM row-buffer policy probe",
    long_about = "Measure DRAM access latency from user space and infer the memory controller's row-buffer page policy.\n\nExamples:\n  rowprobe\n  rowprobe row-pair --trial-count 500\n  rowprobe copy-sweep --output copy.csv\n  rowprobe --simulate closed --json"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Scan for conflicting addresses and classify the page policy (default).
    RowPolicy,
    /// Time a same-row pair against a different-row pair.
    RowPair,
    /// Time block copies of increasing size.
    CopySweep,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// JSON configuration file; absent fields take defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Timed trials per configuration (overrides config and ROWPROBE_TRIAL_COUNT).
    #[arg(long, global = true)]
    trial_count: Option<usize>,

    /// Write every raw sample to this CSV file.
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Print the report as JSON instead of a summary.
    #[arg(long, global = true)]
    json: bool,

    /// Run against the simulated memory backend with the given page policy.
    #[arg(
        long,
        global = true,
        value_enum,
        num_args = 0..=1,
        default_missing_value = "open"
    )]
    simulate: Option<SimPolicy>,

    /// Enable debug logging (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum SimPolicy {
    Open,
    Closed,
}

impl From<SimPolicy> for PagePolicy {
    fn from(policy: SimPolicy) -> Self {
        match policy {
            SimPolicy::Open => Self::Open,
            SimPolicy::Closed => Self::Closed,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("cannot write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::Probe(err.into())
    }
}

impl CliError {
    /// Exit status: 1 for setup failures, 2 when measurement ran but the signal was unusable.
    const fn exit_code(&self) -> i32 {
        match self {
            Self::Probe(err) if !err.is_fatal() => 2,
            _ => 1,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.common.verbose);

    if let Err(err) = run(&cli) {
        error!(%err, "rowprobe failed");
        eprintln!("error: {err}");
        process::exit(err.exit_code());
    }
}

/// Installs a stderr subscriber; `RUST_LOG` overrides the default level.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Config file, then environment, then `--trial-count`; validated before any allocation.
fn load_config(common: &CommonArgs) -> Result<ProbeConfig, CliError> {
    let mut config = match &common.config {
        Some(path) => ProbeConfig::from_json_file(path)?,
        None => ProbeConfig::default(),
    };
    config.apply_env()?;
    if let Some(trials) = common.trial_count {
        config.set_trial_count(trials);
    }
    config.validate()?;
    Ok(config)
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(&cli.common)?;
    let command = cli.command.unwrap_or(Command::RowPolicy);

    match cli.common.simulate {
        Some(policy) => {
            let mut simulation = config.simulation.clone();
            simulation.policy = policy.into();
            let mut sim = SimulatedMemory::new(&simulation, config.arena.line_size)?;
            info!(policy = ?simulation.policy, "using simulated memory backend");
            dispatch(&mut sim, command, &cli.common, &config, None)
        }
        None => run_hardware(command, &cli.common, &config),
    }
}

#[cfg(target_arch = "x86_64")]
fn run_hardware(command: Command, common: &CommonArgs, config: &ProbeConfig) -> Result<(), CliError> {
    use std::time::Duration;

    use rowprobe_core::probe::HardwareInstruments;
    use rowprobe_core::timing::calibrate_cycles_per_ns;

    let mut hw = HardwareInstruments::new(config)?;
    let rate = calibrate_cycles_per_ns(&mut hw, 5, Duration::from_millis(10));
    if let Some(rate) = rate {
        info!(cycles_per_ns = rate, "clock calibrated");
    }
    dispatch(&mut hw, command, common, config, rate)
}

#[cfg(not(target_arch = "x86_64"))]
fn run_hardware(_: Command, _: &CommonArgs, _: &ProbeConfig) -> Result<(), CliError> {
    Err(ProbeError::UnsupportedPlatform.into())
}

fn dispatch<I: Instruments + ?Sized>(
    instruments: &mut I,
    command: Command,
    common: &CommonArgs,
    config: &ProbeConfig,
    rate: Option<f64>,
) -> Result<(), CliError> {
    match command {
        Command::RowPolicy => {
            let arena = Arena::from_config(&config.arena)?;
            let mut report = probe::row_policy(instruments, &arena, config)?;
            report.cycles_per_ns = rate;
            emit(common, &report, CSV_LABEL_HEADER, |sink| {
                write_row_policy(sink, &report)
            })
        }
        Command::RowPair => {
            let arena = Arena::from_config(&config.arena)?;
            let mut report = probe::row_pair(instruments, &arena, config)?;
            report.cycles_per_ns = rate;
            emit(common, &report, CSV_LABEL_HEADER, |sink| {
                write_row_pair(sink, &report)
            })
        }
        Command::CopySweep => {
            let mut report = probe::copy_sweep(instruments, config)?;
            report.cycles_per_ns = rate;
            emit(common, &report, CSV_SIZE_HEADER, |sink| {
                write_copy_sweep(sink, &report)
            })
        }
    }
}

/// Writes the CSV file (if requested) and prints the summary or JSON.
fn emit<T, F>(common: &CommonArgs, report: &T, header: &str, write: F) -> Result<(), CliError>
where
    T: Serialize + Display,
    F: FnOnce(&mut CsvSink<BufWriter<File>>) -> io::Result<()>,
{
    if let Some(path) = &common.output {
        let rows = write_csv(path, header, write).map_err(|source| CliError::Output {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), rows, "samples written");
    }

    if common.json {
        println!("{}", to_json(report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}

fn write_csv<F>(path: &Path, header: &str, write: F) -> io::Result<usize>
where
    F: FnOnce(&mut CsvSink<BufWriter<File>>) -> io::Result<()>,
{
    let mut sink = CsvSink::new(BufWriter::new(File::create(path)?), header)?;
    write(&mut sink)?;
    let rows = sink.rows();
    let _ = sink.into_inner()?;
    Ok(rows)
}
