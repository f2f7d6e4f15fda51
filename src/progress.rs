use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::time::{Duration, Instant};

/// Cells in the rich progress bar.
pub const BAR_WIDTH: usize = 38;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lower")]
pub enum ProgressMode {
    Auto,
    Rich,
    Plain,
    Quiet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedProgressMode {
    Rich,
    Plain,
    Quiet,
}

#[derive(Debug, Clone, Copy)]
pub struct ProgressConfig {
    pub mode: ProgressMode,
    pub plain_interval: Duration,
    tty_override: Option<bool>,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            mode: ProgressMode::Auto,
            plain_interval: Duration::from_secs(2),
            tty_override: None,
        }
    }
}

impl ProgressConfig {
    pub fn new(mode: ProgressMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    #[cfg(test)]
    pub fn with_tty_override(mut self, is_tty: bool) -> Self {
        self.tty_override = Some(is_tty);
        self
    }

    pub fn resolve_mode(self) -> ResolvedProgressMode {
        self.mode.resolve(
            self.tty_override
                .unwrap_or_else(|| std::io::stderr().is_terminal()),
        )
    }
}

impl ProgressMode {
    fn resolve(self, stderr_is_tty: bool) -> ResolvedProgressMode {
        match self {
            ProgressMode::Auto => {
                if stderr_is_tty {
                    ResolvedProgressMode::Rich
                } else {
                    ResolvedProgressMode::Plain
                }
            }
            ProgressMode::Rich => ResolvedProgressMode::Rich,
            ProgressMode::Plain => ResolvedProgressMode::Plain,
            ProgressMode::Quiet => ResolvedProgressMode::Quiet,
        }
    }
}

/// Running state fed by ffmpeg's `-progress` key=value stream.
///
/// Only the consumer of the pipe mutates this; it is reset for each job.
/// fps/speed stay `None` until the transcoder reports a real value, so
/// "not yet known" renders as a placeholder instead of a numeric zero.
#[derive(Debug, Default)]
pub struct ProgressState {
    pub out_time_secs: u64,
    pub fps: Option<f64>,
    pub speed: Option<f64>,
    pub percent: u64,
}

impl ProgressState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one stream line. Returns true on a synchronization marker
    /// (`progress=...`), meaning the state is consistent and a frame
    /// should be rendered now.
    ///
    /// Percent is recomputed only at sync markers; with an unusable
    /// total duration of 0 it stays frozen at its last value.
    pub fn apply(&mut self, line: &str, total_secs: u64) -> bool {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("out_time=") {
            if let Some(secs) = parse_hms(value) {
                // Out-of-order timestamps never move the position backwards.
                self.out_time_secs = self.out_time_secs.max(secs);
            }
            false
        } else if let Some(value) = line.strip_prefix("fps=") {
            if let Some(fps) = parse_positive(value) {
                self.fps = Some(fps);
            }
            false
        } else if let Some(value) = line.strip_prefix("speed=") {
            if let Some(speed) = parse_positive(value.trim_end_matches('x')) {
                self.speed = Some(speed);
            }
            false
        } else if line.starts_with("progress=") {
            if total_secs > 0 {
                self.percent = (self.out_time_secs * 100 / total_secs).min(100);
            }
            true
        } else {
            false
        }
    }
}

/// `HH:MM:SS[.frac]` to whole seconds; the fraction is discarded.
/// Empty, `N/A` and negative-looking values are rejected so a transient
/// bogus timestamp from the transcoder leaves the state unchanged.
fn parse_hms(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() || value == "N/A" || value.starts_with('-') {
        return None;
    }
    let clock = value.split('.').next().unwrap_or_default();
    let mut fields = clock.splitn(3, ':');
    let h: u64 = fields.next()?.parse().ok()?;
    let m: u64 = fields.next()?.parse().ok()?;
    let s: u64 = fields.next()?.parse().ok()?;
    Some(h * 3600 + m * 60 + s)
}

fn parse_positive(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() || value == "N/A" {
        return None;
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}

/// `eta = elapsed * (100 - percent) / percent`, in whole seconds.
/// Defined only strictly inside the job: at 0% there is nothing to
/// extrapolate from and at 100% there is nothing left.
pub fn compute_eta(percent: u64, elapsed_secs: u64) -> Option<u64> {
    if percent == 0 || percent >= 100 || elapsed_secs == 0 {
        return None;
    }
    Some(elapsed_secs * (100 - percent) / percent)
}

/// Compact duration: `1h 04m 32s` / `4m 32s` / `32s`.
pub fn fmt_compact_duration(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{}h {:02}m {:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

pub fn fmt_fps(fps: Option<f64>) -> String {
    fps.map(|v| format!("{:.1}", v)).unwrap_or_else(|| "--".to_string())
}

pub fn fmt_speed(speed: Option<f64>) -> String {
    speed
        .map(|v| format!("{:.2}x", v))
        .unwrap_or_else(|| "?".to_string())
}

pub fn fmt_eta(eta: Option<u64>) -> String {
    eta.map(fmt_compact_duration)
        .unwrap_or_else(|| "--".to_string())
}

/// In-place single-line renderer for one encode job.
pub struct ProgressRenderer {
    label: String,
    mode: ResolvedProgressMode,
    bar: Option<ProgressBar>,
    started: Instant,
    plain_interval: Duration,
    last_plain_emit: Option<Instant>,
}

impl ProgressRenderer {
    pub fn new(label: impl Into<String>, config: ProgressConfig) -> Self {
        let label = label.into();
        let mode = config.resolve_mode();

        let bar = if mode == ResolvedProgressMode::Rich {
            let pb = ProgressBar::new(100);
            pb.set_style(
                ProgressStyle::with_template(&format!(
                    "{{prefix:>10}} {{bar:{BAR_WIDTH}}} {{pos:>3}}% {{msg}}"
                ))
                .expect("valid progress template")
                .progress_chars("█░"),
            );
            pb.set_prefix(label.clone());
            Some(pb)
        } else {
            None
        };

        Self {
            label,
            mode,
            bar,
            started: Instant::now(),
            plain_interval: config.plain_interval,
            last_plain_emit: None,
        }
    }

    /// Redraws the frame from the current parser state. Called at each
    /// synchronization marker.
    pub fn render(&mut self, state: &ProgressState) {
        let eta = compute_eta(state.percent, self.started.elapsed().as_secs());
        match self.mode {
            ResolvedProgressMode::Rich => {
                if let Some(bar) = &self.bar {
                    bar.set_position(state.percent);
                    bar.set_message(format!(
                        "fps {}  speed {}  eta {}",
                        fmt_fps(state.fps),
                        fmt_speed(state.speed),
                        fmt_eta(eta)
                    ));
                }
            }
            ResolvedProgressMode::Plain => {
                let now = Instant::now();
                let due = self
                    .last_plain_emit
                    .map_or(true, |last| now.duration_since(last) >= self.plain_interval);
                if due {
                    self.last_plain_emit = Some(now);
                    eprintln!(
                        "[PROGRESS] {} {:>3}% fps={} speed={} eta={}",
                        self.label,
                        state.percent,
                        fmt_fps(state.fps),
                        fmt_speed(state.speed),
                        fmt_eta(eta)
                    );
                }
            }
            ResolvedProgressMode::Quiet => {}
        }
    }

    /// Final redraw when the stream ends: percent is forced to 100 so the
    /// displayed bar always reaches completion.
    pub fn finish(self) {
        let elapsed = fmt_compact_duration(self.started.elapsed().as_secs());
        match self.mode {
            ResolvedProgressMode::Rich => {
                if let Some(bar) = &self.bar {
                    bar.set_position(100);
                    bar.finish_with_message(format!("elapsed {}", elapsed));
                }
            }
            ResolvedProgressMode::Plain => {
                eprintln!("[PROGRESS] {} 100% elapsed={}", self.label, elapsed);
            }
            ResolvedProgressMode::Quiet => {}
        }
    }
}
