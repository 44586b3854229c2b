mod cli;

use vmafsweep::{batch, config, report};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use std::sync::Arc;
use sweep_av::{probe_source, TokioRunner, ToolRegistry};
use tokio_util::sync::CancellationToken;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            // Verbose mode: every output line and progress update
            "vmafsweep=trace,sweep_av=trace,sweep_core=debug".to_string()
        } else {
            "vmafsweep=info,sweep_av=info,sweep_core=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            input,
            output,
            concurrency,
            extra_args,
            presets,
            crf_min,
            crf_max,
            max_attempts,
            work_dir,
            keep_encodes,
        } => {
            let overrides = config::Overrides {
                concurrency,
                extra_args,
                presets,
                crf_min,
                crf_max,
                max_attempts,
                work_dir,
                keep_encodes,
            };
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_benchmark(
                &input,
                &output,
                cli.config.as_deref(),
                overrides,
            ))
        }
        Commands::Grid {
            presets,
            crf_min,
            crf_max,
        } => {
            let overrides = config::Overrides {
                presets,
                crf_min,
                crf_max,
                ..Default::default()
            };
            print_grid(cli.config.as_deref(), overrides)
        }
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&file, cli.config.as_deref(), json))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("vmafsweep {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn run_benchmark(
    input: &Path,
    output: &Path,
    config_path: Option<&Path>,
    overrides: config::Overrides,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;
    overrides.apply(&mut config);

    let tools = ToolRegistry::discover(&config.tools);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; stopping running jobs");
            on_interrupt.cancel();
        }
    });

    let summary = batch::run_batch(
        &config,
        input,
        output,
        &tools,
        Arc::new(TokioRunner),
        &cancel,
    )
    .await?;

    println!(
        "{} jobs: {} succeeded, {} failed",
        summary.results.len(),
        summary.succeeded(),
        summary.failed()
    );
    println!("Report: {}", summary.report.display());

    if cancel.is_cancelled() {
        anyhow::bail!("Batch was interrupted");
    }
    Ok(())
}

fn print_grid(config_path: Option<&Path>, overrides: config::Overrides) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;
    overrides.apply(&mut config);
    config.validate()?;

    println!("Order,Preset,CRF");
    for job in &config.grid {
        println!("{},{},{}", job.index, job.preset, job.quality);
    }
    eprintln!(
        "{} jobs ({} presets x {} CRF levels)",
        config.grid.len(),
        config.grid.presets.len(),
        config.grid.levels()
    );

    Ok(())
}

async fn probe_file(file: &Path, config_path: Option<&Path>, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools);
    let ffprobe = tools.require("ffprobe")?;

    let info = probe_source(
        &TokioRunner,
        ffprobe,
        file,
        tools.timeout(),
        &CancellationToken::new(),
    )
    .await?;

    if json {
        let value = serde_json::json!({
            "path": info.path,
            "duration_secs": info.duration.as_secs_f64(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("File: {}", info.path.display());
        println!(
            "Duration: {} ({:.3}s)",
            report::format_processor_time(info.duration),
            info.duration.as_secs_f64()
        );
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();

        if tool.libvmaf == Some(false) {
            all_ok = false;
            println!("  ✗ ffmpeg was built without libvmaf");
        }
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them before running a benchmark.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_config_summary(&config);
            for warning in config.warnings() {
                println!("  ! {}", warning);
            }
        }
        None => {
            println!("No config file specified, using defaults");
            print_config_summary(&config::Config::default());
        }
    }

    Ok(())
}

fn print_config_summary(config: &config::Config) {
    println!(
        "  Grid: {} presets x CRF {}..={} ({} jobs)",
        config.grid.presets.len(),
        config.grid.quality_min,
        config.grid.quality_max,
        config.grid.len()
    );
    println!("  Concurrency: {}", config.batch.concurrency);
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!("  Extra args: {}", config.encode.extra_args.join(" "));
}
