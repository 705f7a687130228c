use std::path::PathBuf;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cadence_core::{CheckpointKind, PhaseStatus, ScheduleName, Verdict};
use cadence_runner::{Config, Runner};

#[derive(Parser)]
#[command(name = "cadence", version)]
struct Cli {
    /// Config file (default: ./cadence.toml; built-in defaults when absent)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default cadence.toml
    Init {
        #[arg(long)]
        force: bool,
    },

    /// Validate config and check velero/kubectl are usable
    Doctor,

    /// Print when the ledger will be checked and what it must hold
    Plan {
        #[arg(long)]
        period: Option<u32>,
        #[arg(long)]
        verify_times: Option<u32>,
    },

    /// Show the current ledger of an existing schedule
    Ledger {
        #[arg(long)]
        schedule: String,
    },

    /// Run the full cadence verification against the cluster
    Run {
        #[arg(long)]
        period: Option<u32>,
        #[arg(long)]
        verify_times: Option<u32>,
        /// Target namespace (repeatable); replaces the configured list
        #[arg(long = "namespace")]
        namespaces: Vec<String>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        report_dir: Option<String>,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let cfg_path = match cli.config {
        Some(p) => p,
        None => Config::default_path(&std::env::current_dir()?),
    };

    match cli.cmd {
        Command::Init { force } => {
            if Runner::init_config(&cfg_path, force)? {
                println!("Wrote {}", cfg_path.display());
            } else {
                println!("{} already exists (use --force to overwrite)", cfg_path.display());
            }
        }
        Command::Doctor => {
            let cfg = Config::load_or_default(&cfg_path)?;
            for line in cadence_runner::doctor(&cfg)? {
                println!("ok  {line}");
            }
        }
        Command::Plan { period, verify_times } => {
            let mut cfg = Config::load_or_default(&cfg_path)?;
            if let Some(p) = period {
                cfg.run.period_minutes = p;
            }
            if let Some(v) = verify_times {
                cfg.run.verify_times = v;
            }
            let tl = cfg.timeline()?;
            println!("period {} ({}), {} cadence checks", tl.period, tl.period.cron_expr(), tl.verify_times);
            println!("alignment: up to {}s before activation", tl.alignment_bound.as_secs());
            for c in &tl.checkpoints {
                let kind = match c.kind {
                    CheckpointKind::PreWindow => "pre-window",
                    CheckpointKind::Cadence => "cadence",
                };
                println!("  +{:>5}s  {:<10} #{}  expect {}", c.offset.as_secs(), kind, c.index, c.expected_len);
            }
            println!(
                "worst case {}s before restore; deadline {}s",
                tl.worst_case_duration().as_secs(),
                cfg.deadline().as_secs()
            );
        }
        Command::Ledger { schedule } => {
            let r = Runner::open(Config::load_or_default(&cfg_path)?)?;
            let ledger = r.read_ledger(&ScheduleName::from_str(schedule))?;
            println!("{} snapshot(s)", ledger.len());
            for rec in ledger.iter() {
                println!("- {}  {}", rec.id, rec.created_at);
            }
        }
        Command::Run { period, verify_times, namespaces, seed, report_dir, json } => {
            let mut cfg = Config::load_or_default(&cfg_path)?;
            if let Some(p) = period {
                cfg.run.period_minutes = p;
            }
            if let Some(v) = verify_times {
                cfg.run.verify_times = v;
            }
            if !namespaces.is_empty() {
                cfg.run.namespaces = namespaces;
            }
            if seed.is_some() {
                cfg.run.seed = seed;
            }
            if report_dir.is_some() {
                cfg.report.dir = report_dir;
            }
            let mut r = Runner::open(cfg)?;
            info!(run_id = %r.run_id, "running");
            let report = r.run();
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for p in &report.phases {
                    let mark = match p.status {
                        PhaseStatus::Pass => "PASS",
                        PhaseStatus::Fail => "FAIL",
                        PhaseStatus::Skipped => "skip",
                    };
                    println!("{mark}  {}{}", p.phase, p.detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default());
                }
            }
            if let Verdict::Fail { phase, kind, message } = report.verdict {
                return Err(anyhow!("run {} failed in {phase} ({kind:?}): {message}", report.run_id));
            }
            println!("run {} passed", report.run_id);
        }
    }

    Ok(())
}
