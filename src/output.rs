//! CLI output formatting.
//!
//! Every `format_*` function returns lines (or a single line) without
//! printing, so the layout can be tested; the `print_*` wrappers write them
//! to stdout.
//!
//! # Output Format
//!
//! ## Compress
//!
//! ```text
//! IMG_0001.jpg
//!     Output: /home/me/.cache/boxing/.compress/compress-1f0c….jpg (296.1 KB)
//! IMG_0002.jpg
//!     Output: unchanged (under budget)
//! broken.jpg
//!     Failed: keeping original
//!
//! 1 cached, 1 passed through, 1 encoded (3 total), 1 failed
//! ```
//!
//! With `--json`, one object per source:
//!
//! ```text
//! {"source":"IMG_0001.jpg","status":"compressed","output":"/…/compress-1f0c….jpg","bytes":303211}
//! ```

use crate::address::ContentAddresser;
use crate::cache::CacheStats;
use crate::request::CompressionOutcome;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Human-readable byte size: `512 B`, `296.1 KB`, `1.4 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let b = bytes as f64;
    if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

fn display_name(source: &Path) -> String {
    source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| source.display().to_string())
}

fn file_len(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}

/// Header line plus one indented status line for a finished request.
pub fn format_outcome(source: &Path, outcome: &CompressionOutcome) -> Vec<String> {
    let status = match outcome {
        CompressionOutcome::Success(path) if path == source => {
            "    Output: unchanged (under budget)".to_string()
        }
        CompressionOutcome::Success(path) => match file_len(path) {
            Some(len) => format!("    Output: {} ({})", path.display(), format_bytes(len)),
            None => format!("    Output: {}", path.display()),
        },
        CompressionOutcome::Failure => "    Failed: keeping original".to_string(),
    };
    vec![display_name(source), status]
}

#[derive(Serialize)]
struct OutcomeRecord<'a> {
    source: &'a Path,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<&'a Path>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes: Option<u64>,
}

/// One JSON object describing a finished request.
pub fn format_outcome_json(source: &Path, outcome: &CompressionOutcome) -> String {
    let record = match outcome {
        CompressionOutcome::Success(path) => OutcomeRecord {
            source,
            status: if path == source { "unchanged" } else { "compressed" },
            output: Some(path.as_path()),
            bytes: file_len(path),
        },
        CompressionOutcome::Failure => OutcomeRecord {
            source,
            status: "failed",
            output: None,
            bytes: None,
        },
    };
    // Only a non-UTF-8 path can fail here
    serde_json::to_string(&record).unwrap_or_default()
}

/// Cache key and output path a source maps to.
pub fn format_key(source: &Path, addresser: &ContentAddresser) -> Vec<String> {
    let key = addresser.key_for(source);
    let output: PathBuf = addresser.path_for_key(&key);
    vec![
        display_name(source),
        format!("    Key: {}", key),
        format!("    Output: {}", output.display()),
    ]
}

/// Final summary line.
pub fn format_stats(stats: &CacheStats) -> String {
    stats.to_string()
}

pub fn print_outcome(source: &Path, outcome: &CompressionOutcome, json: bool) {
    if json {
        println!("{}", format_outcome_json(source, outcome));
    } else {
        for line in format_outcome(source, outcome) {
            println!("{}", line);
        }
    }
}

pub fn print_key(source: &Path, addresser: &ContentAddresser) {
    for line in format_key(source, addresser) {
        println!("{}", line);
    }
}

pub fn print_stats(stats: &CacheStats) {
    println!();
    println!("{}", format_stats(stats));
}
