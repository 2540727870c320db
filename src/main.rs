mod commands;
mod logging;
mod reporter;

use std::io::{self, Write};
use std::process;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, ResetArgs, UploadArgs, WorkerArgs};
use dotenv::dotenv;
use pfu::{AppConfig, Database, Strategy, UploadCoordinator};
use reporter::CliReporter;
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let args = Cli::parse();

    let guard = match &args.command {
        Some(Commands::Worker(_)) => {
            logging::init_worker_logger();
            None
        }
        _ => Some(logging::init_logger()),
    };

    let result = match args.command {
        Some(Commands::Upload(upload)) => {
            load_config(args.db).and_then(|config| run_upload(&config, &upload))
        }
        Some(Commands::Status) => load_config(args.db).and_then(|config| run_status(&config)),
        Some(Commands::Reset(reset)) => {
            load_config(args.db).and_then(|config| run_reset(&config, &reset))
        }
        Some(Commands::PrintConfig) => load_config(args.db).map(|config| {
            println!("Configuration: {:?}", config);
        }),
        Some(Commands::TruncateDb) => load_config(args.db).and_then(|config| run_truncate(&config)),
        Some(Commands::Worker(worker)) => run_worker(&worker),
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {:#}", err);
        drop(guard);
        process::exit(1);
    }
}

fn load_config(db_override: Option<String>) -> anyhow::Result<AppConfig> {
    let mut config =
        pfu::config::load_configuration().context("Error loading configuration")?;
    if let Some(path) = db_override {
        config.database_path = path;
    }
    Ok(config)
}

fn open_database(config: &AppConfig) -> anyhow::Result<Database> {
    Database::open(&config.database_path)
        .with_context(|| format!("Error opening database {}", config.database_path))
}

fn run_upload(config: &AppConfig, args: &UploadArgs) -> anyhow::Result<()> {
    if !args.root_dir.is_dir() {
        bail!(
            "The specified root directory doesn't exist: {}",
            args.root_dir.display()
        );
    }

    let strategy = Strategy::from_flags(args.concurrent, args.parallel);
    let db = open_database(config)?;
    let reporter = CliReporter::new();
    let summary =
        UploadCoordinator::new(&db, config).run(&args.root_dir, strategy, &reporter)?;

    println!();
    info!(
        "Batch {} ({}): {} new files, {} dispatched in {}",
        summary.batch_id,
        summary.strategy,
        format!("{}", summary.files_created).cyan(),
        format!("{}", summary.dispatched).cyan(),
        format!("{:.2}s", summary.duration.as_secs_f64()).green(),
    );
    info!(
        "{} completed, {} failed",
        format!("{}", summary.completed).green(),
        format!("{}", summary.failed).red(),
    );
    if summary.files_skipped > 0 {
        warn!(
            "{} files skipped: path is not valid UTF-8",
            format!("{}", summary.files_skipped).yellow()
        );
    }
    if summary.unrecorded > 0 {
        warn!(
            "{} outcomes could not be written to the store",
            format!("{}", summary.unrecorded).yellow()
        );
    }

    Ok(())
}

fn run_status(config: &AppConfig) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let counts = db.status_counts()?;

    match db.latest_batch()? {
        Some(batch) => println!(
            "Latest batch {} for {} ({})",
            batch.id, batch.root_dir, batch.status
        ),
        None => println!("No batches recorded"),
    }
    println!("  {:<12} {}", "Pending", format!("{}", counts.pending).yellow());
    println!("  {:<12} {}", "In progress", format!("{}", counts.in_progress).cyan());
    println!("  {:<12} {}", "Completed", format!("{}", counts.completed).green());
    println!("  {:<12} {}", "Failed", format!("{}", counts.failed).red());
    println!("  {:<12} {}", "Total", counts.total());

    Ok(())
}

fn run_reset(config: &AppConfig, args: &ResetArgs) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let reset = if args.all {
        db.reset_all_to_pending()?
    } else {
        db.reset_failed_to_pending()?
    };
    info!("{} records returned to pending", format!("{}", reset).yellow());
    Ok(())
}

fn run_truncate(config: &AppConfig) -> anyhow::Result<()> {
    if !prompt_confirm(
        "Are you SURE you want to COMPLETELY DELETE the Database?",
        Some(false),
    )? {
        return Ok(());
    }
    open_database(config)?.truncate_all()?;
    println!("All tables truncated");
    Ok(())
}

fn run_worker(args: &WorkerArgs) -> anyhow::Result<()> {
    pfu::scheduler::parallel::run_worker(&args.store_root).context("Worker failed")
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(default.unwrap_or(false));
        }

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
