use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use idcrop_vision::{
    executor, overlay, CropError, CropWarning, OutputFormat, Pipeline, YuNetDetector,
};
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::Config;
use crate::naming::{self, NamingConfig};

/// Load the detector once and assemble the shared per-photo pipeline.
pub fn load_pipeline(cfg: &Config) -> Result<Pipeline> {
    let detector = YuNetDetector::load(
        &cfg.detection.model_path,
        cfg.detection.confidence_threshold as f32,
        cfg.detection.nms_threshold,
    )
    .context("Failed to load face detector")?;
    Ok(Pipeline::new(
        Box::new(detector),
        cfg.selector(),
        cfg.crop_config(),
    ))
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.trim_start_matches('.').eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Gather input photos from a file or directory, sorted by path.
///
/// Hidden entries are skipped, and so is `exclude` (the output directory).
pub fn collect_inputs(
    input: &Path,
    extensions: &[String],
    recursive: bool,
    exclude: Option<&Path>,
) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        anyhow::bail!("input not found: {}", input.display());
    }

    let exclude = exclude.and_then(|p| p.canonicalize().ok());
    let mut found = Vec::new();
    let mut pending = vec![input.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries =
            std::fs::read_dir(&dir).with_context(|| format!("reading {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if is_hidden(&path) {
                continue;
            }
            if path.is_dir() {
                let excluded = exclude.is_some() && path.canonicalize().ok() == exclude;
                if recursive && !excluded {
                    pending.push(path);
                }
            } else if has_extension(&path, extensions) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

/// `<dir>/<name>` for a directory input, `<parent>/<name>` for a file.
pub fn default_output_dir(input: &Path, name: &str) -> PathBuf {
    let base = if input.is_file() {
        input.parent().unwrap_or(Path::new(".")).to_path_buf()
    } else {
        input.to_path_buf()
    };
    base.join(name)
}

/// Remove a previous run's output directory.
///
/// Refuses when `output_dir` is `input` or one of its ancestors, so source
/// photos are never deleted. Returns whether anything was removed.
pub fn clean_output_dir(output_dir: &Path, input: &Path) -> Result<bool> {
    if !output_dir.exists() {
        return Ok(false);
    }
    let out = output_dir
        .canonicalize()
        .with_context(|| format!("resolving {}", output_dir.display()))?;
    let src = input
        .canonicalize()
        .with_context(|| format!("resolving {}", input.display()))?;
    if src.starts_with(&out) {
        anyhow::bail!(
            "refusing to clean {}: it contains the input {}",
            output_dir.display(),
            input.display()
        );
    }

    info!("Removing output directory {}", output_dir.display());
    std::fs::remove_dir_all(&out).with_context(|| format!("removing {}", out.display()))?;
    Ok(true)
}

/// Map each input to a unique output path under `output_dir`, mirroring
/// subdirectories below `root`.
///
/// Stems are renamed by [`naming::output_stem`]. Inputs that end up sharing a
/// stem (`a.png`, `a.jpg`) get the source extension appended.
pub fn plan_outputs(
    inputs: &[PathBuf],
    root: &Path,
    output_dir: &Path,
    format: OutputFormat,
    names: &NamingConfig,
) -> Vec<(PathBuf, PathBuf)> {
    let mut taken = HashSet::new();
    inputs
        .iter()
        .map(|input| {
            let relative_dir = input
                .parent()
                .and_then(|p| p.strip_prefix(root).ok())
                .unwrap_or(Path::new(""));
            let dir = output_dir.join(relative_dir);
            let stem = input
                .file_stem()
                .map(|s| naming::output_stem(&s.to_string_lossy(), names))
                .unwrap_or_else(|| "photo".to_string());

            let mut candidate = dir.join(format!("{stem}.{}", format.extension()));
            if !taken.insert(candidate.clone()) {
                let src_ext = input
                    .extension()
                    .map(|e| e.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                let mut n = 1;
                candidate = dir.join(format!("{stem}_{src_ext}.{}", format.extension()));
                while !taken.insert(candidate.clone()) {
                    n += 1;
                    candidate = dir.join(format!("{stem}_{src_ext}_{n}.{}", format.extension()));
                }
            }
            (input.clone(), candidate)
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub format: OutputFormat,
    pub quality: u8,
    pub debug: bool,
    /// 0 uses every available core.
    pub workers: usize,
}

impl BatchOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            format: cfg.output.format,
            quality: cfg.quality(),
            debug: cfg.batch.debug,
            workers: cfg.batch.workers,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoStatus {
    Cropped,
    /// Cropped after a shift or shrink; worth a manual look.
    NeedsReview,
    Failed,
    /// Not started because the batch was cancelled.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhotoReport {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub status: PhotoStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<CropWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub cropped: usize,
    pub needs_review: usize,
    pub failed: usize,
    pub skipped: usize,
    pub photos: Vec<PhotoReport>,
}

impl BatchSummary {
    fn from_reports(photos: Vec<PhotoReport>) -> Self {
        let count = |s: PhotoStatus| photos.iter().filter(|p| p.status == s).count();
        Self {
            total: photos.len(),
            cropped: count(PhotoStatus::Cropped),
            needs_review: count(PhotoStatus::NeedsReview),
            failed: count(PhotoStatus::Failed),
            skipped: count(PhotoStatus::Skipped),
            photos,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.cropped + self.needs_review
    }
}

/// Decode, crop, encode and write a single photo.
pub fn process_photo(
    pipeline: &Pipeline,
    input: &Path,
    output: &Path,
    opts: &BatchOptions,
) -> Result<Vec<CropWarning>, CropError> {
    let source = image::open(input).map_err(|e| CropError::Decode(e.to_string()))?;
    let outcome = pipeline.crop(&source)?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| CropError::EncodeError(format!("{}: {e}", parent.display())))?;
    }
    executor::save(&outcome.image, output, opts.format, opts.quality)?;

    if opts.debug {
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let debug_path = output.with_file_name(format!("DEBUG_{stem}.jpg"));
        let canvas = overlay::render(&source, &outcome.plan);
        executor::save(&canvas, &debug_path, OutputFormat::Jpeg, opts.quality)?;
    }

    Ok(outcome.plan.warnings)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Crop every `(input, output)` job on a worker pool.
///
/// Per-photo failures are recorded, never propagated. Once `cancel` is set no
/// new photo starts; in-flight photos run to completion.
pub fn run_batch(
    pipeline: &Pipeline,
    jobs: &[(PathBuf, PathBuf)],
    opts: &BatchOptions,
    cancel: &AtomicBool,
) -> Result<BatchSummary> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.workers)
        .build()
        .context("Failed to build worker pool")?;
    info!(
        "Processing {} photo(s) on {} worker(s)",
        jobs.len(),
        pool.current_num_threads()
    );

    let total = jobs.len();
    let reports: Vec<PhotoReport> = pool.install(|| {
        jobs.par_iter()
            .enumerate()
            .map(|(idx, (input, output))| {
                let progress = format!("[{}/{}]", idx + 1, total);
                if cancel.load(Ordering::SeqCst) {
                    return PhotoReport {
                        input: input.clone(),
                        output: None,
                        status: PhotoStatus::Skipped,
                        warnings: Vec::new(),
                        error_kind: None,
                        error: None,
                    };
                }

                match process_photo(pipeline, input, output, opts) {
                    Ok(warnings) => {
                        let status = if warnings.is_empty() {
                            info!("{} [DONE] {} -> {}", progress, file_name(input), file_name(output));
                            PhotoStatus::Cropped
                        } else {
                            let notes: Vec<String> = warnings.iter().map(|w| w.to_string()).collect();
                            warn!(
                                "{} [REVIEW] {} -> {} ({})",
                                progress,
                                file_name(input),
                                file_name(output),
                                notes.join("; ")
                            );
                            PhotoStatus::NeedsReview
                        };
                        PhotoReport {
                            input: input.clone(),
                            output: Some(output.clone()),
                            status,
                            warnings,
                            error_kind: None,
                            error: None,
                        }
                    }
                    Err(e) => {
                        warn!("{} [FAIL] {}: {}", progress, file_name(input), e);
                        PhotoReport {
                            input: input.clone(),
                            output: None,
                            status: PhotoStatus::Failed,
                            warnings: Vec::new(),
                            error_kind: Some(e.kind().to_string()),
                            error: Some(e.to_string()),
                        }
                    }
                }
            })
            .collect()
    });

    Ok(BatchSummary::from_reports(reports))
}

pub fn write_summary(summary: &BatchSummary, output_dir: &Path) -> Result<PathBuf> {
    let path = output_dir.join("summary.json");
    let data = serde_json::to_string_pretty(summary)?;
    std::fs::write(&path, data).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}
