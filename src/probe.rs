use crate::titles::MediaFile;
use serde::Deserialize;
use std::path::Path;
use std::process::Command;

#[derive(Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Declared container duration in whole seconds (truncated).
///
/// Any failure (tool error, missing format section, `N/A`, unparsable
/// value) degrades to 0 so progress percentage and ETA degrade instead
/// of failing the job.
pub fn probe_duration(ffprobe_bin: &str, path: &Path) -> u64 {
    let output = Command::new(ffprobe_bin)
        .args(["-v", "error", "-print_format", "json", "-show_format"])
        .arg(path)
        .output();
    match output {
        Ok(out) if out.status.success() => {
            parse_probe_duration(&String::from_utf8_lossy(&out.stdout))
        }
        _ => 0,
    }
}

/// Sum of per-part durations; a part that cannot be probed contributes 0.
pub fn total_duration(ffprobe_bin: &str, parts: &[MediaFile]) -> u64 {
    parts
        .iter()
        .map(|part| probe_duration(ffprobe_bin, &part.path))
        .sum()
}

fn parse_probe_duration(json: &str) -> u64 {
    serde_json::from_str::<ProbeOutput>(json)
        .ok()
        .and_then(|probe| probe.format)
        .and_then(|format| format.duration)
        .and_then(|duration| duration.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(|secs| secs as u64)
        .unwrap_or(0)
}
