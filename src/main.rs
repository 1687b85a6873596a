use anyhow::Context;
use clap::{Parser, Subcommand};
use quantum_sched::analysis::{analyze_path, parse_baseline};
use quantum_sched::process::CommandLauncher;
use quantum_sched::telemetry::{DeviceSelection, SystemProbe, TelemetryContext, TelemetryProbe};
use quantum_sched::timeseries::{CsvSink, Schema};
use quantum_sched::{RunConfig, WorkQueue};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "quantum-sched.log";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Also write logs to quantum-sched.log (level from RUST_LOG)
    #[arg(long, global = true)]
    log: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Time-slice the jobs of a config file until all of them finish.
    Run {
        /// JSON or YAML run configuration
        config: PathBuf,

        /// Directory for timeseries.csv (overrides the config)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        #[arg(long, value_enum)]
        device: Option<DeviceSelection>,

        /// Stop after this many quanta
        #[arg(long)]
        max_quanta: Option<usize>,

        /// Seconds between the termination signal and the forced kill
        #[arg(long)]
        grace_secs: Option<f64>,

        #[arg(long)]
        quantum_secs: Option<f64>,

        /// Seed for the memory lottery
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Report working, waiting and response times of recorded runs.
    Analyze {
        /// A time-series CSV or a directory of them
        path: PathBuf,

        /// Standalone run time of a job, NAME=SECONDS (repeatable)
        #[arg(long = "baseline", value_parser = parse_baseline)]
        baselines: Vec<(String, f64)>,
    },
}

fn config_log(logger: ftail::Ftail, log_file: &str) -> Result<(), ftail::error::FtailError> {
    use tracing::log::LevelFilter;
    let mut cfg_filter = LevelFilter::Info;
    if let Ok(level) = std::env::var("RUST_LOG") {
        let log_level_names: [&str; 6] = ["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"];
        let log_levels: [LevelFilter; 6] = [
            LevelFilter::Off,
            LevelFilter::Error,
            LevelFilter::Warn,
            LevelFilter::Info,
            LevelFilter::Debug,
            LevelFilter::Trace,
        ];
        let level = level.to_uppercase();
        for (name, filter) in log_level_names.iter().zip(log_levels) {
            if level.contains(name) {
                cfg_filter = filter;
            }
        }
    };
    if std::path::Path::new(log_file).exists() {
        let _ = std::fs::remove_file(log_file);
    }
    logger
        .console(cfg_filter)
        .single_file(log_file, true, cfg_filter)
        .init()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.log {
        config_log(ftail::Ftail::new(), LOG_FILE)
            .map_err(|e| anyhow::anyhow!("failed to set up file logging: {e:?}"))?;
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    }

    match args.command {
        Command::Run {
            config,
            output_dir,
            device,
            max_quanta,
            grace_secs,
            quantum_secs,
            seed,
        } => {
            let mut cfg = RunConfig::from_file(&config)?;
            if let Some(dir) = output_dir {
                cfg.output_dir = dir;
            }
            if let Some(device) = device {
                cfg.device = device;
            }
            if max_quanta.is_some() {
                cfg.max_quanta = max_quanta;
            }
            if let Some(grace) = grace_secs {
                cfg.grace_secs = grace;
            }
            if let Some(quantum) = quantum_secs {
                cfg.policy.quantum_secs = quantum;
            }
            if seed.is_some() {
                cfg.policy.seed = seed;
            }
            run(cfg).await
        }
        Command::Analyze { path, baselines } => {
            let baselines: HashMap<String, f64> = baselines.into_iter().collect();
            for analysis in analyze_path(&path, &baselines)? {
                println!("{analysis}");
            }
            Ok(())
        }
    }
}

async fn run(cfg: RunConfig) -> anyhow::Result<()> {
    cfg.validate()?;
    let policy = cfg.policy()?;
    let grace = cfg.grace()?;

    let ctx = TelemetryContext::detect(cfg.device)?;
    let probe = SystemProbe::new(ctx);
    let schema = Schema::for_capability(probe.capability());

    std::fs::create_dir_all(&cfg.output_dir)
        .with_context(|| format!("failed to create {}", cfg.output_dir.display()))?;
    let path = cfg.timeseries_path();
    let sink = CsvSink::create(&path, schema)
        .with_context(|| format!("failed to create {}", path.display()))?;
    info!(
        "scheduling {} jobs ({:?}, quantum {}s), time series in {}",
        cfg.jobs.len(),
        cfg.policy.policy_type,
        cfg.policy.quantum_secs,
        path.display()
    );

    let mut queue = WorkQueue::new(
        cfg.jobs(),
        policy,
        Box::new(CommandLauncher),
        Box::new(probe),
        Box::new(sink),
    )
    .with_grace(grace)
    .with_max_quanta(cfg.max_quanta);

    let summary = queue.run_to_completion().await?;
    info!(
        "{} quanta run, retired in order: {}",
        summary.quanta.len(),
        summary.retired.join(", ")
    );
    if !summary.is_complete() {
        warn!(
            "quantum budget spent, unfinished: {}",
            summary.unfinished.join(", ")
        );
    }
    Ok(())
}
