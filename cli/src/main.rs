//! Custody CLI - run bank scenarios and inspect saved custodians

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use custody_bank::BankConfig;
use custody_cli::{Scenario, Simulation, StepReport, Summary};
use custody_core::{Amount, Clock, InterestRate, SystemClock};
use custody_storage::{EventJournal, SnapshotStore};
use custody_token::Keypair;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "custody")]
#[command(about = "Interest-bearing custodial bank toolkit", version)]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a TOML scenario against a fresh custodian
    Run {
        scenario: PathBuf,

        /// Bank config to use instead of the scenario's seeds
        #[arg(long)]
        config: Option<PathBuf>,

        /// Save the final custodian snapshot into this directory
        #[arg(long)]
        save_dir: Option<PathBuf>,

        /// Snapshot name
        #[arg(long, default_value = "custodian")]
        name: String,

        /// Append committed events to this sled journal
        #[arg(long)]
        journal: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interest owed on a principal after whole days
    Quote {
        #[arg(long)]
        principal: u64,

        #[arg(long)]
        days: u64,

        #[arg(long, default_value = "1")]
        numerator: u64,

        #[arg(long, default_value = "1000")]
        denominator: u64,
    },

    /// Show the books of a saved custodian
    Inspect {
        dir: PathBuf,

        #[arg(long, default_value = "custodian")]
        name: String,

        /// Timestamp pending interest is computed at (default: now)
        #[arg(long)]
        at: Option<u64>,

        #[arg(long)]
        json: bool,
    },

    /// List journaled events
    Events {
        journal: PathBuf,

        #[arg(long, default_value = "0")]
        since: u64,
    },

    /// Write a bank config file
    InitConfig {
        path: PathBuf,

        /// Seed the custodian account is derived from
        #[arg(long, default_value = "custodian")]
        custodian: String,

        /// Seed the owner account is derived from
        #[arg(long, default_value = "owner")]
        owner: String,

        #[arg(long)]
        start_paused: bool,
    },
}

#[derive(Serialize)]
struct RunOutput<'a> {
    steps: &'a [StepReport],
    summary: &'a Summary,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Run {
            scenario,
            config,
            save_dir,
            name,
            journal,
            json,
        } => {
            let plan = Scenario::load_from_file(&scenario)
                .with_context(|| format!("loading scenario {}", scenario.display()))?;
            let config = match config {
                Some(path) => BankConfig::load_from_file(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => plan.bank_config(),
            };

            let mut sim = Simulation::new(&plan, &config)?;
            let reports = sim.run(&plan.steps);
            let summary = Summary::of(sim.bank(), &sim.names(), sim.now())?;

            if json {
                let out = RunOutput {
                    steps: &reports,
                    summary: &summary,
                };
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                for r in &reports {
                    let mark = if r.ok { "ok  " } else { "FAIL" };
                    println!("{:>3} {} {:<16} {}", r.index, mark, r.action, r.detail);
                }
                println!();
                print!("{}", summary.render());
            }

            if let Some(dir) = save_dir {
                let store = SnapshotStore::open(&dir)?;
                store.save_custodian(&name, sim.bank())?;
                info!(dir = %dir.display(), %name, "snapshot saved");
            }
            if let Some(path) = journal {
                let journal = EventJournal::open(&path)?;
                let written = journal.sync_from(sim.bank().event_log())?;
                info!(path = %path.display(), written, "journal updated");
            }
        }

        Commands::Quote {
            principal,
            days,
            numerator,
            denominator,
        } => {
            let rate = InterestRate {
                numerator: numerator as Amount,
                denominator: denominator as Amount,
                ..InterestRate::default()
            };
            rate.validate()?;
            let interest = rate.interest_for(principal as Amount, days)?;
            println!("{} over {} days: {} interest", principal, days, interest);
        }

        Commands::Inspect {
            dir,
            name,
            at,
            json,
        } => {
            let store = SnapshotStore::open(&dir)?;
            let bank = store
                .load_custodian(&name)
                .with_context(|| format!("loading {} from {}", name, dir.display()))?;
            let at = at.unwrap_or_else(|| SystemClock.now());
            let summary = Summary::of(&bank, &BTreeMap::new(), at)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", summary.render());
            }
        }

        Commands::Events { journal, since } => {
            let journal = EventJournal::open(&journal)?;
            for record in journal.load_since(since)? {
                println!(
                    "{:>6} {:>12} {}",
                    record.sequence,
                    record.timestamp,
                    serde_json::to_string(&record.event)?
                );
            }
        }

        Commands::InitConfig {
            path,
            custodian,
            owner,
            start_paused,
        } => {
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            let mut config = BankConfig::new(
                Keypair::from_seed(&custodian).address(),
                Keypair::from_seed(&owner).address(),
            );
            config.start_paused = start_paused;
            config.save_to_file(&path)?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}
