use anyhow::Result;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Parts smaller than this are DVD menu fragments, not program content.
pub const STUB_MIN_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct MediaFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Typed (title, part) key extracted from a `VTS_<title>_<part>.VOB` name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VobName {
    pub title: u32,
    pub part: u32,
}

/// Parses `VTS_01_2.VOB` (case-insensitive) into its title/part numbers.
/// Anything else (`VIDEO_TS.VOB`, `VTS_01.VOB`, non-numeric keys) is not
/// a title part and yields `None`.
pub fn parse_vob_name(name: &str) -> Option<VobName> {
    let lower = name.to_ascii_lowercase();
    let rest = lower.strip_prefix("vts_")?;
    let rest = rest.strip_suffix(".vob")?;
    let (title, part) = rest.split_once('_')?;
    Some(VobName {
        title: parse_number(title)?,
        part: parse_number(part)?,
    })
}

fn parse_number(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Unique title numbers present in `dir`, numerically ascending
/// (title 2 sorts before title 10).
pub fn discover_titles(dir: &Path) -> Result<Vec<u32>> {
    let mut titles = BTreeSet::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.path().is_file() {
            continue;
        }
        if let Some(vob) = parse_vob_name(&entry.file_name().to_string_lossy()) {
            titles.insert(vob.title);
        }
    }
    Ok(titles.into_iter().collect())
}

/// All non-stub parts of one title, sorted by part number ascending.
/// Concatenation order depends on this sort; filesystem listing order is
/// never trusted. May return an empty vec if every part is a stub.
pub fn parts_for_title(dir: &Path, title: u32) -> Result<Vec<MediaFile>> {
    let mut parts: Vec<(u32, MediaFile)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(vob) = parse_vob_name(&entry.file_name().to_string_lossy()) else {
            continue;
        };
        if vob.title != title {
            continue;
        }
        let size = entry.metadata()?.len();
        if size < STUB_MIN_BYTES {
            continue;
        }
        parts.push((vob.part, MediaFile { path, size }));
    }
    parts.sort_by_key(|(part, _)| *part);
    Ok(parts.into_iter().map(|(_, media)| media).collect())
}

/// Degenerate single-file mode: one arbitrary media file, no grouping and
/// no stub filtering.
pub fn single_media_file(path: &Path) -> Result<MediaFile> {
    let size = std::fs::metadata(path)?.len();
    Ok(MediaFile {
        path: path.to_path_buf(),
        size,
    })
}
