use crate::progress::{ProgressConfig, ProgressRenderer, ProgressState};

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Fixed encoding parameters. Compile-time defaults, passed explicitly so
/// tests can inject alternate tools and codecs.
#[derive(Debug, Clone)]
pub struct EncodeConfig {
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub video_codec: String,
    /// CRF quality factor, lower = higher quality.
    pub quality: u32,
    pub preset: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub container_ext: String,
    pub log_tail_lines: usize,
    /// Maps a part path into the concat manifest. Native paths pass
    /// through untouched; platforms that need POSIX-style translation
    /// plug in here.
    pub manifest_path: fn(&Path) -> String,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            video_codec: "libx264".to_string(),
            quality: 23,
            preset: "medium".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
            container_ext: "mp4".to_string(),
            log_tail_lines: 12,
            manifest_path: native_manifest_path,
        }
    }
}

pub fn native_manifest_path(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Direct file, or ordered parts fed through ffmpeg's concat demuxer as
/// one continuous virtual input. Part order is playback order.
#[derive(Debug, Clone)]
pub enum InputSpec {
    Single(PathBuf),
    Concat(Vec<PathBuf>),
}

#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub label: String,
    pub input: InputSpec,
    pub output: PathBuf,
    /// Summed part durations in whole seconds; 0 if probing failed.
    pub total_duration_secs: u64,
    pub input_bytes: u64,
}

#[derive(Debug)]
pub enum JobResult {
    /// Output already existed; the transcoder was never invoked.
    Skipped,
    Succeeded {
        input_bytes: u64,
        output_bytes: u64,
    },
    Failed {
        log_tail: Vec<String>,
    },
}

/// Per-job temporary artifacts, named after the output path so leftovers
/// from an earlier interrupted job cannot collide. Removed on drop, which
/// covers success, failure and unwinding on operator interrupt.
struct JobTemps {
    manifest: PathBuf,
    log: PathBuf,
}

impl JobTemps {
    fn for_output(output: &Path) -> Self {
        Self {
            manifest: append_ext(output, "concat.txt"),
            log: append_ext(output, "log"),
        }
    }
}

impl Drop for JobTemps {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.manifest);
        let _ = fs::remove_file(&self.log);
    }
}

fn append_ext(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Runs one job through the external transcoder: Pending -> Running ->
/// {Succeeded, Failed}, or straight to Skipped when the output already
/// exists (re-runs never overwrite).
pub fn run_encode(
    job: &EncodeJob,
    cfg: &EncodeConfig,
    progress_cfg: ProgressConfig,
) -> Result<JobResult> {
    if job.output.exists() {
        return Ok(JobResult::Skipped);
    }

    let temps = JobTemps::for_output(&job.output);

    let log_file = File::create(&temps.log)
        .with_context(|| format!("creating transcode log {}", temps.log.display()))?;

    let mut cmd = Command::new(&cfg.ffmpeg_bin);
    cmd.arg("-hide_banner")
        .arg("-nostats")
        .arg("-loglevel")
        .arg("error")
        .arg("-y");

    match &job.input {
        InputSpec::Single(path) => {
            cmd.arg("-i").arg(path);
        }
        InputSpec::Concat(parts) => {
            write_concat_manifest(&temps.manifest, parts, cfg.manifest_path)?;
            cmd.arg("-f")
                .arg("concat")
                .arg("-safe")
                .arg("0")
                .arg("-i")
                .arg(&temps.manifest);
        }
    }

    cmd.arg("-c:v")
        .arg(&cfg.video_codec)
        .arg("-crf")
        .arg(cfg.quality.to_string())
        .arg("-preset")
        .arg(&cfg.preset)
        .arg("-c:a")
        .arg(&cfg.audio_codec)
        .arg("-b:a")
        .arg(&cfg.audio_bitrate)
        .arg("-movflags")
        .arg("+faststart")
        .arg("-progress")
        .arg("pipe:1")
        .arg(&job.output)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::from(log_file));

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn {}", cfg.ffmpeg_bin))?;
    let stdout = child.stdout.take().context("transcoder stdout not captured")?;

    // The child is the producer, this loop the only consumer; state is
    // rendered at each sync marker until the stream closes.
    let mut state = ProgressState::new();
    let mut renderer = ProgressRenderer::new(job.label.clone(), progress_cfg);
    for line in BufReader::new(stdout).lines() {
        let line = line.context("reading transcoder progress stream")?;
        if state.apply(&line, job.total_duration_secs) {
            renderer.render(&state);
        }
    }
    let status = child.wait().context("waiting for transcoder")?;
    renderer.finish();

    if status.success() {
        let output_bytes = fs::metadata(&job.output).map(|m| m.len()).unwrap_or(0);
        Ok(JobResult::Succeeded {
            input_bytes: job.input_bytes,
            output_bytes,
        })
    } else {
        Ok(JobResult::Failed {
            log_tail: tail_lines(&temps.log, cfg.log_tail_lines),
        })
    }
    // temps dropped here: manifest and log are gone on every path.
}

/// One `file '...'` line per part, in playback order. Single quotes are
/// escaped the way the concat demuxer expects.
fn write_concat_manifest(
    manifest: &Path,
    parts: &[PathBuf],
    map_path: fn(&Path) -> String,
) -> Result<()> {
    let mut out = File::create(manifest)
        .with_context(|| format!("creating concat manifest {}", manifest.display()))?;
    for part in parts {
        let mapped = map_path(part).replace('\'', "'\\''");
        writeln!(out, "file '{}'", mapped)?;
    }
    Ok(())
}

fn tail_lines(path: &Path, count: usize) -> Vec<String> {
    let Ok(text) = fs::read_to_string(path) else {
        return Vec::new();
    };
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].iter().map(|l| l.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{ProgressConfig, ProgressMode};
    use tempfile::TempDir;

    fn quiet() -> ProgressConfig {
        ProgressConfig::new(ProgressMode::Quiet)
    }

    fn job_with(input: InputSpec, output: PathBuf) -> EncodeJob {
        EncodeJob {
            label: "title 01".to_string(),
            input,
            output,
            total_duration_secs: 100,
            input_bytes: 42,
        }
    }

    #[test]
    fn concat_manifest_preserves_order_and_escapes_quotes() {
        let tmp = TempDir::new().expect("tempdir");
        let manifest = tmp.path().join("m.txt");
        let parts = vec![
            PathBuf::from("/discs/VTS_01_1.VOB"),
            PathBuf::from("/discs/o'brien/VTS_01_2.VOB"),
        ];
        write_concat_manifest(&manifest, &parts, native_manifest_path).expect("write");

        let text = fs::read_to_string(&manifest).expect("read");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "file '/discs/VTS_01_1.VOB'",
                "file '/discs/o'\\''brien/VTS_01_2.VOB'",
            ]
        );
    }

    #[test]
    fn existing_output_skips_without_invoking_the_transcoder() {
        let tmp = TempDir::new().expect("tempdir");
        let output = tmp.path().join("title_01.mp4");
        fs::write(&output, b"already converted").expect("write output");

        // A nonexistent binary would fail the spawn, so reaching Skipped
        // proves no process was launched.
        let cfg = EncodeConfig {
            ffmpeg_bin: "ffmpeg-binary-that-does-not-exist".to_string(),
            ..EncodeConfig::default()
        };
        let job = job_with(InputSpec::Single(tmp.path().join("VTS_01_1.VOB")), output);

        let result = run_encode(&job, &cfg, quiet()).expect("run");
        assert!(matches!(result, JobResult::Skipped));
    }

    #[cfg(unix)]
    #[test]
    fn failed_transcode_cleans_up_manifest_and_log() {
        let tmp = TempDir::new().expect("tempdir");
        let output = tmp.path().join("title_01.mp4");

        let cfg = EncodeConfig {
            ffmpeg_bin: "false".to_string(),
            ..EncodeConfig::default()
        };
        let parts = vec![
            tmp.path().join("VTS_01_1.VOB"),
            tmp.path().join("VTS_01_2.VOB"),
        ];
        let job = job_with(InputSpec::Concat(parts), output.clone());

        let result = run_encode(&job, &cfg, quiet()).expect("run");
        assert!(matches!(result, JobResult::Failed { .. }));
        assert!(!output.exists());

        let leftovers: Vec<PathBuf> = fs::read_dir(tmp.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .map(|e| e.path())
            .collect();
        assert!(
            leftovers.is_empty(),
            "temporary artifacts must not outlive the job: {:?}",
            leftovers
        );
    }

    #[cfg(unix)]
    #[test]
    fn successful_transcode_reports_sizes_and_cleans_up() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().expect("tempdir");
        let output = tmp.path().join("out").join("title_01.mp4");
        fs::create_dir_all(output.parent().unwrap()).expect("mkdir");

        // Stand-in transcoder: emits a progress stream on stdout and
        // writes the output file named as its final argument.
        let fake = tmp.path().join("fake-ffmpeg.sh");
        fs::write(
            &fake,
            "#!/bin/sh\n\
             for last in \"$@\"; do :; done\n\
             echo 'out_time=00:00:50.000000'\n\
             echo 'fps=30.0'\n\
             echo 'speed=2.00x'\n\
             echo 'progress=continue'\n\
             echo 'progress=end'\n\
             printf 'encoded' > \"$last\"\n",
        )
        .expect("write fake transcoder");
        fs::set_permissions(&fake, fs::Permissions::from_mode(0o755)).expect("chmod");

        let cfg = EncodeConfig {
            ffmpeg_bin: fake.to_string_lossy().into_owned(),
            ..EncodeConfig::default()
        };
        let job = job_with(InputSpec::Single(tmp.path().join("VTS_01_1.VOB")), output.clone());

        let result = run_encode(&job, &cfg, quiet()).expect("run");
        match result {
            JobResult::Succeeded {
                input_bytes,
                output_bytes,
            } => {
                assert_eq!(input_bytes, 42);
                assert_eq!(output_bytes, "encoded".len() as u64);
            }
            other => panic!("expected success, got {:?}", other),
        }
        assert!(output.exists());
        assert!(!append_ext(&output, "log").exists());
        assert!(!append_ext(&output, "concat.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn failure_surfaces_the_diagnostic_tail() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().expect("tempdir");
        let output = tmp.path().join("title_02.mp4");

        let fake = tmp.path().join("fake-ffmpeg.sh");
        fs::write(
            &fake,
            "#!/bin/sh\n\
             echo 'ignored noise' >&2\n\
             echo 'VTS_02_1.VOB: Invalid data found' >&2\n\
             exit 1\n",
        )
        .expect("write fake transcoder");
        fs::set_permissions(&fake, fs::Permissions::from_mode(0o755)).expect("chmod");

        let cfg = EncodeConfig {
            ffmpeg_bin: fake.to_string_lossy().into_owned(),
            log_tail_lines: 1,
            ..EncodeConfig::default()
        };
        let job = job_with(InputSpec::Single(tmp.path().join("VTS_02_1.VOB")), output);

        match run_encode(&job, &cfg, quiet()).expect("run") {
            JobResult::Failed { log_tail } => {
                assert_eq!(log_tail, vec!["VTS_02_1.VOB: Invalid data found"]);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn tail_of_missing_log_is_empty() {
        assert!(tail_lines(Path::new("/no/such/log"), 5).is_empty());
    }
}
