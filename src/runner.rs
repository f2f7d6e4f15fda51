use crate::encode::{self, EncodeConfig, EncodeJob, InputSpec, JobResult};
use crate::probe;
use crate::progress::{fmt_compact_duration, ProgressConfig};
use crate::titles::{self, MediaFile};

use anyhow::{bail, Result};
use indicatif::HumanBytes;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
struct RunSummary {
    converted: usize,
    failed: usize,
    skipped: usize,
    input_bytes: u64,
    output_bytes: u64,
}

/// Entry point below the CLI: directory input runs the batch per title,
/// file input converts that one file.
pub fn run(
    input: &Path,
    output: Option<&Path>,
    cfg: &EncodeConfig,
    progress_cfg: ProgressConfig,
) -> Result<()> {
    if input.is_dir() {
        run_directory(input, output, cfg, progress_cfg)
    } else if input.is_file() {
        run_single_file(input, output, cfg, progress_cfg)
    } else {
        bail!(
            "input path {} is neither a file nor a directory",
            input.display()
        );
    }
}

fn run_directory(
    dir: &Path,
    output: Option<&Path>,
    cfg: &EncodeConfig,
    progress_cfg: ProgressConfig,
) -> Result<()> {
    let titles = titles::discover_titles(dir)?;
    if titles.is_empty() {
        println!("No VOB files found in {}", dir.display());
        return Ok(());
    }

    let out_dir = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| dir.join("converted"));
    std::fs::create_dir_all(&out_dir)?;

    let mut summary = RunSummary::default();
    for title in titles {
        let parts = titles::parts_for_title(dir, title)?;
        if parts.is_empty() {
            // Every part was a menu stub; nothing to convert.
            continue;
        }

        let input_bytes: u64 = parts.iter().map(|p| p.size).sum();
        let duration = probe::total_duration(&cfg.ffprobe_bin, &parts);
        println!(
            "Title {:02}: {} part(s), {} input, duration {}",
            title,
            parts.len(),
            HumanBytes(input_bytes),
            if duration > 0 {
                fmt_compact_duration(duration)
            } else {
                "unknown".to_string()
            }
        );

        let output_path = out_dir.join(format!("title_{:02}.{}", title, cfg.container_ext));
        let job = EncodeJob {
            label: format!("title {:02}", title),
            input: input_spec(parts),
            output: output_path,
            total_duration_secs: duration,
            input_bytes,
        };
        run_one(&job, cfg, progress_cfg, &mut summary)?;
    }

    println!(
        "Converted {} title(s), {} failed, {} skipped ({} -> {})",
        summary.converted,
        summary.failed,
        summary.skipped,
        HumanBytes(summary.input_bytes),
        HumanBytes(summary.output_bytes),
    );
    Ok(())
}

fn run_single_file(
    file: &Path,
    output: Option<&Path>,
    cfg: &EncodeConfig,
    progress_cfg: ProgressConfig,
) -> Result<()> {
    let media = titles::single_media_file(file)?;
    let duration = probe::probe_duration(&cfg.ffprobe_bin, file);

    let out_dir = output
        .map(Path::to_path_buf)
        .or_else(|| file.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&out_dir)?;

    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let label = file
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| stem.clone());

    println!(
        "{}: {} input, duration {}",
        label,
        HumanBytes(media.size),
        if duration > 0 {
            fmt_compact_duration(duration)
        } else {
            "unknown".to_string()
        }
    );

    let job = EncodeJob {
        label,
        input: InputSpec::Single(media.path.clone()),
        output: out_dir.join(format!("{}.{}", stem, cfg.container_ext)),
        total_duration_secs: duration,
        input_bytes: media.size,
    };
    let mut summary = RunSummary::default();
    run_one(&job, cfg, progress_cfg, &mut summary)?;
    Ok(())
}

/// One sequential job; failures are reported and contained so a bad
/// title never aborts the batch.
fn run_one(
    job: &EncodeJob,
    cfg: &EncodeConfig,
    progress_cfg: ProgressConfig,
    summary: &mut RunSummary,
) -> Result<()> {
    match encode::run_encode(job, cfg, progress_cfg)? {
        JobResult::Skipped => {
            summary.skipped += 1;
            println!("  skipped: {} already exists", job.output.display());
        }
        JobResult::Succeeded {
            input_bytes,
            output_bytes,
        } => {
            summary.converted += 1;
            summary.input_bytes += input_bytes;
            summary.output_bytes += output_bytes;
            println!(
                "  done: {} ({} -> {}{})",
                job.output.display(),
                HumanBytes(input_bytes),
                HumanBytes(output_bytes),
                saved_suffix(input_bytes, output_bytes),
            );
        }
        JobResult::Failed { log_tail } => {
            summary.failed += 1;
            eprintln!("  FAILED: {}", job.label);
            for line in log_tail {
                eprintln!("    {}", line);
            }
        }
    }
    Ok(())
}

fn input_spec(parts: Vec<MediaFile>) -> InputSpec {
    if parts.len() == 1 {
        InputSpec::Single(parts.into_iter().next().expect("one part").path)
    } else {
        InputSpec::Concat(parts.into_iter().map(|p| p.path).collect())
    }
}

fn saved_suffix(input_bytes: u64, output_bytes: u64) -> String {
    if input_bytes == 0 || output_bytes >= input_bytes {
        return String::new();
    }
    let saved = 100 - output_bytes * 100 / input_bytes;
    format!(", {}% smaller", saved)
}
