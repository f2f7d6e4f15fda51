use anyhow::{bail, Context, Result};
use std::process::Command;

/// Preflight check that an external tool answers `-version` before any
/// job runs.
pub fn ensure_tool_available(bin: &str) -> Result<()> {
    let out = Command::new(bin)
        .arg("-version")
        .output()
        .with_context(|| format!("failed to run {} -version", bin))?;
    if !out.status.success() {
        bail!("{} exists but returned non-zero on -version", bin);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_is_an_error() {
        assert!(ensure_tool_available("transcoder-that-does-not-exist").is_err());
    }
}
