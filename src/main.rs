mod encode;
mod probe;
mod progress;
mod runner;
mod titles;
mod util;

use anyhow::{Context, Result};
use clap::Parser;
use encode::EncodeConfig;
use progress::{ProgressConfig, ProgressMode};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "vob2mp4",
    version,
    about = "Batch-convert DVD VOB titles into compressed MP4 files"
)]
struct Cli {
    /// Directory of VOB files (batch mode) or a single media file.
    #[arg(default_value = ".")]
    input: PathBuf,

    /// Output directory. Defaults to <INPUT>/converted for directories,
    /// or the input file's own directory.
    output: Option<PathBuf>,

    /// Progress display mode: auto (TTY-aware), rich, plain, quiet.
    #[arg(long, value_enum, default_value_t = ProgressMode::Auto)]
    progress: ProgressMode,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = EncodeConfig::default();

    util::ensure_tool_available(&cfg.ffmpeg_bin).context("ffmpeg not found in PATH")?;
    util::ensure_tool_available(&cfg.ffprobe_bin).context("ffprobe not found in PATH")?;

    runner::run(
        &cli.input,
        cli.output.as_deref(),
        &cfg,
        ProgressConfig::new(cli.progress),
    )
}
