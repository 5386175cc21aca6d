// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Component M: Discord attachment ingest. A thin collaborator — the
//! network fetch of the attachment bytes is the caller's job; this module
//! decides whether bytes look like text, truncates them for prompt
//! inclusion, and optionally extracts a `.zip` through a subprocess.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Extensions treated as "probably text" regardless of sniffing.
const ALLOWED_TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "rs", "py", "js", "ts", "tsx", "jsx", "json", "toml", "yaml", "yml", "sh", "bash", "go", "java", "c",
    "h", "cpp", "hpp", "rb", "log", "csv", "diff", "patch", "cfg", "ini", "env",
];

/// Above this fraction of non-printable bytes in the sample, content is
/// treated as binary and rejected.
const BINARY_CONTROL_BYTE_THRESHOLD: f64 = 0.30;

/// How many leading bytes are sampled to decide binary-ness.
const SNIFF_SAMPLE_LEN: usize = 4096;

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("attachment rejected: looks binary")]
    LooksBinary,
    #[error("attachment exceeds size cap of {cap} bytes")]
    TooLarge { cap: usize },
    #[error("attachment destination escapes the allowed upload root")]
    PathEscape,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip extraction failed: {0}")]
    ZipExtraction(String),
}

/// How a file's text should be truncated when it doesn't fit the prompt's
/// per-file char budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationMode {
    Head,
    Tail,
    HeadTail,
}

/// Picks a truncation mode by filename extension heuristic: log-like files
/// (where the newest content is at the bottom) favor the tail; structured
/// source and config favor the head; everything else gets a bit of both.
pub fn truncation_mode_for(filename: &str) -> TruncationMode {
    let ext = Path::new(filename).extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
    match ext.as_str() {
        "log" | "csv" => TruncationMode::Tail,
        "rs" | "py" | "js" | "ts" | "go" | "json" | "toml" | "yaml" | "yml" | "md" => TruncationMode::Head,
        _ => TruncationMode::HeadTail,
    }
}

/// Truncates `text` to at most `budget` chars using `mode`, inserting a
/// marker at the elision point.
pub fn truncate_text(text: &str, budget: usize, mode: TruncationMode) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= budget {
        return text.to_string();
    }
    const ELISION: &str = "\n...[truncated]...\n";
    match mode {
        TruncationMode::Head => {
            let head: String = chars[..budget].iter().collect();
            format!("{head}{ELISION}")
        }
        TruncationMode::Tail => {
            let tail: String = chars[chars.len() - budget..].iter().collect();
            format!("{ELISION}{tail}")
        }
        TruncationMode::HeadTail => {
            let half = budget / 2;
            let head: String = chars[..half].iter().collect();
            let tail: String = chars[chars.len() - half..].iter().collect();
            format!("{head}{ELISION}{tail}")
        }
    }
}

/// True if `filename`'s extension is on the text allow-list.
pub fn extension_allowed(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| ALLOWED_TEXT_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Byte-sampling binary sniff: rejects content whose control-byte density
/// in the first [`SNIFF_SAMPLE_LEN`] bytes exceeds the documented 30%
/// threshold. A null byte anywhere in the sample is an instant reject.
pub fn looks_binary(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(SNIFF_SAMPLE_LEN)];
    if sample.is_empty() {
        return false;
    }
    if sample.contains(&0) {
        return true;
    }
    let control_count = sample.iter().filter(|&&b| b < 0x09 || (b > 0x0d && b < 0x20)).count();
    (control_count as f64 / sample.len() as f64) > BINARY_CONTROL_BYTE_THRESHOLD
}

/// Validates an inbound attachment against the size cap and binary sniff
/// before it is written to disk.
pub fn validate(filename: &str, bytes: &[u8], max_bytes: usize) -> Result<(), AttachmentError> {
    if bytes.len() > max_bytes {
        return Err(AttachmentError::TooLarge { cap: max_bytes });
    }
    if !extension_allowed(filename) && looks_binary(bytes) {
        return Err(AttachmentError::LooksBinary);
    }
    Ok(())
}

/// Writes validated bytes into `<uploads_dir>/attachments/<filename>`,
/// refusing to write outside `allow_roots`.
pub async fn store(
    attachments_dir: &Path,
    filename: &str,
    bytes: &[u8],
    allow_roots: &[PathBuf],
) -> Result<PathBuf, AttachmentError> {
    let dest = attachments_dir.join(sanitize_filename(filename));
    if !relay_storage::paths::is_under_allowed_root(&dest, allow_roots) {
        return Err(AttachmentError::PathEscape);
    }
    tokio::fs::create_dir_all(attachments_dir).await?;
    let mut file = tokio::fs::File::create(&dest).await?;
    file.write_all(bytes).await?;
    Ok(dest)
}

/// Strips path separators and leading dots so an attachment name can never
/// climb out of its destination directory.
fn sanitize_filename(filename: &str) -> String {
    let base = Path::new(filename).file_name().and_then(|n| n.to_str()).unwrap_or("attachment");
    base.trim_start_matches('.').replace(['/', '\\'], "_")
}

/// Extracts `zip_path` into `dest_dir` via the `unzip` subprocess,
/// enforcing `max_entry_bytes` per entry by listing the archive first and
/// refusing to extract if any entry would exceed the cap.
pub async fn extract_zip(zip_path: &Path, dest_dir: &Path, max_entry_bytes: u64) -> Result<Vec<PathBuf>, AttachmentError> {
    let listing = Command::new("unzip").arg("-l").arg(zip_path).stdout(Stdio::piped()).output().await?;
    if !listing.status.success() {
        return Err(AttachmentError::ZipExtraction("unzip -l failed".to_string()));
    }
    let listing_text = String::from_utf8_lossy(&listing.stdout);
    for line in listing_text.lines() {
        if let Some(size) = line.split_whitespace().next().and_then(|s| s.parse::<u64>().ok()) {
            if size > max_entry_bytes {
                return Err(AttachmentError::ZipExtraction(format!("entry exceeds {max_entry_bytes} byte cap")));
            }
        }
    }

    tokio::fs::create_dir_all(dest_dir).await?;
    let status = Command::new("unzip")
        .arg("-o")
        .arg(zip_path)
        .arg("-d")
        .arg(dest_dir)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .status()
        .await?;
    if !status.success() {
        return Err(AttachmentError::ZipExtraction(format!("unzip exited {status}")));
    }

    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dest_dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        entries.push(entry.path());
    }
    Ok(entries)
}

#[cfg(test)]
#[path = "attachments_tests.rs"]
mod tests;
