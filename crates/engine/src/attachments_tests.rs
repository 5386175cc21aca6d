// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn extension_allowed_matches_known_text_extensions() {
    assert!(extension_allowed("notes.md"));
    assert!(extension_allowed("main.RS"));
    assert!(!extension_allowed("photo.png"));
    assert!(!extension_allowed("noext"));
}

#[test]
fn looks_binary_detects_null_byte() {
    assert!(looks_binary(b"hello\x00world"));
}

#[test]
fn looks_binary_detects_high_control_byte_density() {
    let mostly_control: Vec<u8> = (0..100).map(|i| if i % 2 == 0 { 0x01 } else { b'a' }).collect();
    assert!(looks_binary(&mostly_control));
}

#[test]
fn looks_binary_accepts_plain_text() {
    let text = "the quick brown fox\njumps over\tthe lazy dog\n".repeat(50);
    assert!(!looks_binary(text.as_bytes()));
}

#[test]
fn looks_binary_accepts_empty_input() {
    assert!(!looks_binary(b""));
}

#[test]
fn validate_rejects_oversized_attachment() {
    let err = validate("a.txt", b"0123456789", 5).unwrap_err();
    assert!(matches!(err, AttachmentError::TooLarge { cap: 5 }));
}

#[test]
fn validate_rejects_binary_content_with_unrecognized_extension() {
    let err = validate("a.bin", b"\x00\x01\x02\x03", 1024).unwrap_err();
    assert!(matches!(err, AttachmentError::LooksBinary));
}

#[test]
fn validate_allows_binary_looking_bytes_for_allow_listed_extension() {
    // extension allow-list is consulted before the sniff runs
    assert!(validate("data.csv", b"\x00\x00\x00\x00", 1024).is_ok());
}

#[test]
fn truncation_mode_picks_tail_for_logs_and_head_for_source() {
    assert_eq!(truncation_mode_for("run.log"), TruncationMode::Tail);
    assert_eq!(truncation_mode_for("main.rs"), TruncationMode::Head);
    assert_eq!(truncation_mode_for("archive.tar.gz"), TruncationMode::HeadTail);
}

#[test]
fn truncate_text_head_keeps_prefix() {
    let text = "abcdefghij";
    let truncated = truncate_text(text, 4, TruncationMode::Head);
    assert!(truncated.starts_with("abcd"));
    assert!(truncated.contains("[truncated]"));
}

#[test]
fn truncate_text_tail_keeps_suffix() {
    let text = "abcdefghij";
    let truncated = truncate_text(text, 4, TruncationMode::Tail);
    assert!(truncated.ends_with("ghij"));
}

#[test]
fn truncate_text_under_budget_is_unchanged() {
    let text = "short";
    assert_eq!(truncate_text(text, 100, TruncationMode::Head), "short");
}

#[tokio::test]
async fn store_writes_under_attachments_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let attachments_dir = tmp.path().join("attachments");
    let allow_roots = vec![tmp.path().to_path_buf()];
    let dest = store(&attachments_dir, "notes.md", b"hello", &allow_roots).await.unwrap();
    assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"hello");
}

#[tokio::test]
async fn store_rejects_path_escaping_filenames() {
    let tmp = tempfile::tempdir().unwrap();
    let attachments_dir = tmp.path().join("attachments");
    let allow_roots = vec![tmp.path().join("elsewhere")];
    let err = store(&attachments_dir, "notes.md", b"hello", &allow_roots).await.unwrap_err();
    assert!(matches!(err, AttachmentError::PathEscape));
}

#[test]
fn sanitize_filename_strips_directory_components_and_leading_dots() {
    assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
    assert_eq!(sanitize_filename("..hidden"), "hidden");
}
