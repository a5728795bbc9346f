use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use idcrop::{batch, config};
use log::{info, warn};

#[derive(Parser)]
#[command(name = "idcrop")]
#[command(version, about = "Batch-crop face photos into standardized ID portraits")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crop a photo or every photo in a directory
    Crop {
        /// Input image or directory
        input: PathBuf,
        /// Output directory (defaults to `crop/` next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write DEBUG_<name>.jpg overlays next to each output
        #[arg(long)]
        debug: bool,
        /// Remove the output directory before processing
        #[arg(long)]
        clean: bool,
        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
        /// Worker threads (0 = all cores)
        #[arg(short, long)]
        jobs: Option<usize>,
    },
    /// Print the crop plan for one image as JSON without writing anything
    Plan {
        /// Input image
        image: PathBuf,
    },
    /// Print the effective configuration, or open it in an editor
    Config {
        #[arg(long)]
        edit: bool,
    },
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Crop {
            input,
            output,
            debug,
            clean,
            recursive,
            jobs,
        } => {
            let mut cfg = config::load_config(config_path)?;
            cfg.batch.debug |= debug;
            cfg.batch.recursive |= recursive;
            if let Some(jobs) = jobs {
                cfg.batch.workers = jobs;
            }
            crop(&cfg, &input, output, clean)
        }
        Commands::Plan { image } => {
            let cfg = config::load_config(config_path)?;
            plan(&cfg, &image)
        }
        Commands::Config { edit } => {
            if edit {
                open_config(config_path)
            } else {
                let cfg = config::load_config(config_path)?;
                print!("{}", toml::to_string_pretty(&cfg)?);
                Ok(())
            }
        }
    }
}

fn crop(cfg: &config::Config, input: &Path, output: Option<PathBuf>, clean: bool) -> Result<()> {
    let output_dir =
        output.unwrap_or_else(|| batch::default_output_dir(input, &cfg.batch.output_dir_name));

    if clean {
        batch::clean_output_dir(&output_dir, input)?;
    }

    let inputs = batch::collect_inputs(
        input,
        &cfg.batch.extensions,
        cfg.batch.recursive,
        Some(&output_dir),
    )?;
    if inputs.is_empty() {
        anyhow::bail!("No supported images found in {}", input.display());
    }

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;

    let root = if input.is_file() {
        input.parent().unwrap_or(Path::new("."))
    } else {
        input
    };
    let jobs = batch::plan_outputs(&inputs, root, &output_dir, cfg.output.format, &cfg.naming);

    let pipeline = batch::load_pipeline(cfg)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_handler = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        cancel_handler.store(true, Ordering::SeqCst);
    })
    .map_err(|err| anyhow::anyhow!("ctrlc handler: {err}"))?;

    let opts = batch::BatchOptions::from_config(cfg);
    let summary = batch::run_batch(&pipeline, &jobs, &opts, &cancel)?;

    if cfg.batch.summary {
        let path = batch::write_summary(&summary, &output_dir)?;
        info!("Summary written to {}", path.display());
    }

    info!(
        "Processed {}: {} cropped, {} need review, {} failed, {} skipped",
        summary.total, summary.cropped, summary.needs_review, summary.failed, summary.skipped
    );
    info!("Output directory: {}", output_dir.display());

    if cancel.load(Ordering::SeqCst) {
        warn!("Batch cancelled before all photos were dispatched");
    }
    if summary.succeeded() == 0 {
        anyhow::bail!("No photo was cropped successfully");
    }
    Ok(())
}

fn plan(cfg: &config::Config, image_path: &Path) -> Result<()> {
    let pipeline = batch::load_pipeline(cfg)?;
    let img = image::open(image_path)
        .with_context(|| format!("opening {}", image_path.display()))?;
    let plan = pipeline
        .plan(&img)
        .with_context(|| format!("planning crop for {}", image_path.display()))?;
    for warning in &plan.warnings {
        warn!("{}", warning);
    }
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn open_config(path: Option<&Path>) -> Result<()> {
    let config_path = path.unwrap_or(&config::CONFIG_PATH);
    if !config_path.exists() {
        config::save_config(&config::Config::default(), Some(config_path))
            .context("Failed to write default config")?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
