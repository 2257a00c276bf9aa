//! ECMLab CLI — measure preparation commands.
//!
//! Commands:
//! - `prep` — run the full preparation pipeline from a TOML config
//! - `check` — validate measure definitions without filling markets
//! - `registry status` — report prepared/inactive/skipped measures

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ecmlab_core::measure::MeasureDef;
use ecmlab_runner::{load_measures, prepare_run, RunConfig, RunRegistry};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ecmlab",
    about = "ECMLab CLI — building-stock measure preparation"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full preparation pipeline from a TOML config file.
    Prep {
        /// Path to the run configuration.
        #[arg(long, default_value = "run.toml")]
        config: PathBuf,

        /// Refill every measure, ignoring recorded fingerprints.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Validate measure definitions without filling markets.
    Check {
        /// Path to a measure-definition JSON array.
        measures: PathBuf,
    },
    /// Registry inspection commands.
    Registry {
        #[command(subcommand)]
        action: RegistryAction,
    },
}

#[derive(Subcommand)]
enum RegistryAction {
    /// Report prepared, inactive, and skipped measures.
    Status {
        /// Output directory holding the run registry.
        #[arg(long, default_value = "outputs")]
        output_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Prep { config, force } => cmd_prep(&config, force),
        Commands::Check { measures } => cmd_check(&measures),
        Commands::Registry {
            action: RegistryAction::Status { output_dir },
        } => cmd_registry_status(&output_dir),
    }
}

fn cmd_prep(config: &PathBuf, force: bool) -> Result<()> {
    let mut cfg =
        RunConfig::from_path(config).with_context(|| format!("loading {}", config.display()))?;
    if force {
        cfg.run.force = true;
    }
    let report = prepare_run(&cfg).context("preparation run failed")?;

    println!(
        "prepared {} measure(s), reused {}, merged {} package(s)",
        report.filled.len(),
        report.reused.len(),
        report.packages.len()
    );
    for name in &report.filled {
        println!("  filled  {name}");
    }
    for name in &report.reused {
        println!("  reused  {name}");
    }
    for name in &report.packages {
        println!("  package {name}");
    }
    for skip in &report.diagnostics.skipped {
        println!("  skipped {} — {}", skip.name, skip.reason);
    }
    for (kind, entry) in &report.diagnostics.warnings {
        println!(
            "  warning {} x{} (first: {})",
            kind.as_str(),
            entry.count,
            entry.detail
        );
    }
    Ok(())
}

fn cmd_check(measures: &PathBuf) -> Result<()> {
    let defs: Vec<MeasureDef> =
        load_measures(measures).with_context(|| format!("loading {}", measures.display()))?;
    let mut bad = 0usize;
    for def in &defs {
        match def.validate() {
            Ok(()) => println!("  ok      {}", def.name),
            Err(e) => {
                bad += 1;
                println!("  invalid {} — {e}", def.name);
            }
        }
    }
    println!("{} definition(s), {} invalid", defs.len(), bad);
    if bad > 0 {
        anyhow::bail!("{bad} invalid measure definition(s)");
    }
    Ok(())
}

fn cmd_registry_status(output_dir: &PathBuf) -> Result<()> {
    let reg = RunRegistry::load(output_dir)
        .with_context(|| format!("loading registry from {}", output_dir.display()))?;
    println!(
        "{} prepared ({} active, {} inactive), {} skipped",
        reg.measures.len(),
        reg.active_count(),
        reg.inactive_count(),
        reg.skipped.len()
    );
    for (name, entry) in &reg.measures {
        let state = if entry.active { "active" } else { "inactive" };
        println!(
            "  {state:8} {name}  chains={} updated={} fp={}",
            entry.key_chains,
            entry.updated_at.format("%Y-%m-%d %H:%M"),
            &entry.fingerprint[..12.min(entry.fingerprint.len())]
        );
    }
    for skip in &reg.skipped {
        println!("  skipped  {} — {}", skip.name, skip.reason);
    }
    Ok(())
}
