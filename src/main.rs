use anyhow::{Context, Result};
use batch_decompile::backend::factory_for;
use batch_decompile::catalog::{ClassSource, JarCatalog};
use batch_decompile::cli::{Cli, Commands, Selection};
use batch_decompile::config::{batch_config, resolve_toolchain};
use batch_decompile::executor::{BatchExecutor, BatchOutcome};
use batch_decompile::matcher::{NamePattern, match_names};
use batch_decompile::sink::{self, DestinationChooser, FixedDestination, SavedOutput};
use batch_decompile::state::BatchReport;
use clap::Parser;
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command.clone() {
        Commands::List { jar_path, pattern } => {
            let pattern = match pattern {
                Some(p) => NamePattern::parse(&p)?,
                None => NamePattern::All,
            };
            for name in select_classes(&jar_path, &pattern)? {
                println!("{name}");
            }
        }
        Commands::Decompile {
            jar_path,
            selection,
            threads,
            timeout,
            decompiler,
            output,
        } => {
            let names = select_classes(&jar_path, &pattern_of(&selection)?)?;
            if names.is_empty() {
                anyhow::bail!("No classes matched in {}", jar_path.display());
            }

            let toolchain = resolve_toolchain(&cli, decompiler)?;
            let factory = factory_for(decompiler, &toolchain, &jar_path)?;
            let executor = BatchExecutor::new(batch_config(threads, timeout), factory);
            let outcome = executor
                .run(names, |progress| eprintln!("[batch-decompile] {progress}"))
                .context("Batch decompile did not complete")?;

            let mut report = outcome.report();
            let saved = save_outcome(&outcome, &FixedDestination(output));
            if let Ok(Some(saved)) = &saved {
                report.output = Some(saved_path(saved).to_string());
            }
            print_report(&report)?;
            saved?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        "batch_decompile=debug"
    } else {
        "batch_decompile=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn pattern_of(selection: &Selection) -> Result<NamePattern> {
    selection
        .to_pattern()
        .context("Invalid class selection")
}

fn select_classes(jar_path: &Path, pattern: &NamePattern) -> Result<Vec<String>> {
    let catalog = JarCatalog::new(jar_path);
    let all = catalog
        .list_all_names()
        .with_context(|| format!("Failed to list classes of {}", jar_path.display()))?;
    Ok(match_names(&all, pattern)?.into_iter().collect())
}

/// Writes the results wherever `chooser` says; `Ok(None)` when it declined.
fn save_outcome(outcome: &BatchOutcome, chooser: &dyn DestinationChooser) -> Result<Option<SavedOutput>> {
    let Some(destination) = chooser.choose(outcome.snapshot.results.len()) else {
        return Ok(None);
    };
    let saved = sink::save(outcome.snapshot.sources(), &destination)
        .with_context(|| format!("Failed to save results to {}", destination.display()))?;
    Ok(Some(saved))
}

fn saved_path(saved: &SavedOutput) -> &str {
    match saved {
        SavedOutput::SourceFile { path } | SavedOutput::Archive { path, .. } => path,
    }
}

fn print_report(report: &BatchReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
