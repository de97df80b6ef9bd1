mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use rc_core::config::Config;
use rc_core::events::EventBus;
use rc_core::{RebaseMode, MICROS_PER_SEC};
use rc_media::{inspect, StdFileSystem};
use rc_trim::{NoPlayback, NoProjectStore, TrimJobs, TrimRequest, Trimmer};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref());

    // RUST_LOG wins, then the config file, then the verbose flag.
    let env_filter = std::env::var("RUST_LOG")
        .ok()
        .or_else(|| config.logging.filter.clone())
        .unwrap_or_else(|| {
            if cli.verbose {
                "reelcut=trace,rc_trim=trace,rc_media=debug,rc_core=debug".to_string()
            } else {
                "reelcut=info,rc_trim=info,rc_media=warn,rc_core=warn".to_string()
            }
        });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { file, json } => inspect_file(&file, json),
        Commands::Trim {
            file,
            start,
            end,
            shared_anchor,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(trim_file(config, &file, start, end, shared_anchor))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
    }
}

fn format_secs(micros: u64) -> String {
    format!("{:.3}s", micros as f64 / MICROS_PER_SEC as f64)
}

fn inspect_file(file: &Path, json: bool) -> Result<()> {
    let inspection = inspect(&StdFileSystem, file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&inspection)?);
        return Ok(());
    }

    println!("File: {}", inspection.path.display());
    println!("Size: {} bytes", inspection.file_size);
    println!("Duration: {}", format_secs(inspection.duration_us));
    println!("\nTracks: {}", inspection.tracks.len());
    for track in &inspection.tracks {
        print!("  [{}] {} ({})", track.index, track.kind, track.handler);
        if let Some(ref format) = track.format {
            print!(" {}", format.codec);
            if format.width_px() > 0 {
                print!(" {}x{}", format.width_px(), format.height_px());
            }
            if let Some(lang) = format.language_code() {
                print!(" ({lang})");
            }
        } else {
            print!(" [not copied]");
        }
        println!();
        println!(
            "      {} samples, {} sync, {} bytes, {}",
            track.sample_count,
            track.sync_sample_count,
            track.total_bytes,
            format_secs(track.duration_us)
        );
    }

    Ok(())
}

async fn trim_file(
    mut config: Config,
    file: &Path,
    start: f64,
    end: f64,
    shared_anchor: bool,
) -> Result<()> {
    if shared_anchor {
        config.trim.rebase = RebaseMode::SharedAnchor;
    }

    let request = TrimRequest::from_secs(file, start, end)?;
    let jobs = TrimJobs::new(
        Arc::new(Trimmer::with_std_fs(config.trim.clone())),
        Arc::new(NoPlayback),
        Arc::new(NoProjectStore),
        Arc::new(EventBus::new(config.jobs.event_capacity)),
    );

    let handle = jobs.submit(request)?;
    let result = handle.await.context("trim task panicked")?;

    if let Err(ref e) = result {
        if !e.original_intact() {
            eprintln!("The original file is no longer at its path; recover it from the backup named below.");
        }
    }

    let outcome = result?;
    println!("Trimmed: {}", outcome.path.display());
    println!("Duration: {}", format_secs(outcome.duration_us));
    println!(
        "Tracks: {}, samples: {}, size: {} bytes",
        outcome.tracks_written, outcome.samples_written, outcome.bytes_written
    );

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("failed to read {}", p.display()))?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Minimum window: {} ms", config.trim.min_window_ms);
    println!("  Minimum output: {} bytes", config.trim.min_output_bytes);
    println!("  Rebase: {}", config.trim.rebase);
    println!("  Temp infix: {}", config.trim.temp_infix());
    println!("  Backup suffix: {}", config.trim.backup_suffix());

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &warnings {
            println!("  - {warning}");
        }
    }

    Ok(())
}
