//! Parsing of the OS mount table (`mount` output)
//!
//! Rows look like `<source> on <target> (<options>)` on macOS and
//! `<source> on <target> type <fs> (<options>)` on Linux. A mountpoint counts
//! as active only when it equals a row's target exactly.

use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub source: String,
    pub target: String,
    pub options: String,
}

/// Row layout of the host's `mount` output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// macOS and the BSDs: no filesystem type column
    Bsd,
    /// `type <fs>` between the target and the options
    Linux,
}

impl TableFormat {
    pub fn host() -> Self {
        if cfg!(target_os = "linux") {
            TableFormat::Linux
        } else {
            TableFormat::Bsd
        }
    }
}

/// Parse one row, `None` for lines that are not mount rows
///
/// The options are the last parenthesized group and the target follows the
/// last ` on ` before them, so a source containing ` on ` still parses.
pub fn parse_line(line: &str, format: TableFormat) -> Option<MountEntry> {
    let (head, options) = match line.rfind(" (") {
        Some(idx) => (&line[..idx], line[idx + 2..].trim_end_matches(')')),
        None => (line, ""),
    };
    let (source, mut target) = head.rsplit_once(" on ")?;
    if format == TableFormat::Linux {
        if let Some(idx) = target.rfind(" type ") {
            target = &target[..idx];
        }
    }
    if source.is_empty() || target.is_empty() {
        return None;
    }
    Some(MountEntry {
        source: source.to_string(),
        target: target.to_string(),
        options: options.to_string(),
    })
}

pub fn parse_mount_table(table: &str, format: TableFormat) -> Vec<MountEntry> {
    table
        .lines()
        .filter_map(|line| parse_line(line, format))
        .collect()
}

/// True when `mountpoint` is the exact target of an active mount
pub fn is_target_mounted(table: &str, mountpoint: &Path) -> bool {
    let wanted = mountpoint.to_string_lossy();
    let wanted = trim_trailing_slash(&wanted);
    parse_mount_table(table, TableFormat::host())
        .iter()
        .any(|entry| trim_trailing_slash(&entry.target) == wanted)
}

fn trim_trailing_slash(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}
