// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Local Directory Source
//!
//! Filesystem-backed source adapter: a watch directory stands in for a
//! remote platform. Files are listed by modification time within the
//! discovery window, keyed by file name, and "fetched" with a plain copy.
//! Useful on its own for drop-folder ingest, and as the in-tree anchor of
//! the `SourceAdapter` contract.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediaflow_domain::services::{CandidateRecording, FetchReport, ListFilters, SourceAdapter};
use mediaflow_domain::{FlowError, InputSource, SourceType};
use serde_json::json;
use tracing::debug;

/// Media extensions the watcher picks up.
const MEDIA_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "avi", "webm", "mp3"];

/// Source adapter over a local watch directory.
///
/// Source config shape: `{ "watch_dir": "/path/to/inbox" }`.
pub struct LocalDirSource;

impl LocalDirSource {
    fn watch_dir(source: &InputSource) -> Result<PathBuf, FlowError> {
        source
            .config
            .get("watch_dir")
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .ok_or_else(|| FlowError::validation(format!("source {} has no watch_dir configured", source.id)))
    }

    fn is_media(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| MEDIA_EXTENSIONS.iter().any(|m| ext.eq_ignore_ascii_case(m)))
    }
}

#[async_trait]
impl SourceAdapter for LocalDirSource {
    fn source_type(&self) -> SourceType {
        SourceType::Local
    }

    async fn list(
        &self,
        source: &InputSource,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        filters: &ListFilters,
    ) -> Result<Vec<CandidateRecording>, FlowError> {
        let dir = Self::watch_dir(source)?;
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| FlowError::retryable(format!("cannot read watch dir {}: {}", dir.display(), e)))?;

        let mut candidates = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || !Self::is_media(&path) {
                continue;
            }

            let meta = entry
                .metadata()
                .map_err(|e| FlowError::retryable(format!("stat failed: {}", e)))?;
            let modified: DateTime<Utc> = meta
                .modified()
                .map_err(|e| FlowError::retryable(format!("mtime unavailable: {}", e)))?
                .into();
            if modified < since || modified > until {
                continue;
            }

            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let display_name = path
                .file_stem()
                .and_then(|n| n.to_str())
                .unwrap_or(&name)
                .to_string();

            if let Some(needle) = &filters.name_contains {
                if !display_name.to_lowercase().contains(&needle.to_lowercase()) {
                    continue;
                }
            }
            if !filters.file_patterns.is_empty() && !matches_any_pattern(&name, &filters.file_patterns) {
                continue;
            }

            candidates.push(CandidateRecording {
                source_key: name.clone(),
                display_name,
                start_time: modified,
                // Local files carry no duration metadata the core trusts.
                duration: 0.0,
                size_bytes: Some(meta.len() as i64),
                finalized: true,
                blank: false,
                raw: json!({ "path": path.to_string_lossy() }),
            });
        }

        candidates.sort_by(|a, b| a.source_key.cmp(&b.source_key));
        debug!(source = source.id, found = candidates.len(), "local directory listed");
        Ok(candidates)
    }

    async fn fetch(
        &self,
        source: &InputSource,
        source_key: &str,
        dest: &Path,
        _resume_from: u64,
    ) -> Result<FetchReport, FlowError> {
        let origin = Self::watch_dir(source)?.join(source_key);
        if !origin.is_file() {
            return Err(FlowError::fatal_external(format!(
                "source file disappeared: {}",
                origin.display()
            )));
        }

        let bytes = tokio::fs::copy(&origin, dest)
            .await
            .map_err(|e| FlowError::retryable(format!("copy failed: {}", e)))?;

        Ok(FetchReport {
            bytes_written: bytes,
            resumed: false,
        })
    }
}

/// Minimal glob support: `*.ext` suffix patterns and literal names.
fn matches_any_pattern(name: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| {
        if let Some(suffix) = pattern.strip_prefix('*') {
            name.to_lowercase().ends_with(&suffix.to_lowercase())
        } else {
            name.eq_ignore_ascii_case(pattern)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mediaflow_domain::UserId;

    fn source(dir: &Path) -> InputSource {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        InputSource {
            id: 1,
            user_id: UserId::generate(),
            name: "inbox".into(),
            description: None,
            source_type: SourceType::Local,
            credential_id: None,
            config: json!({ "watch_dir": dir.to_string_lossy() }),
            is_active: true,
            last_sync_at: None,
            last_sync_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn wide_window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_lists_media_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lecture.mp4"), vec![0u8; 2048]).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"not media").unwrap();

        let (since, until) = wide_window();
        let adapter = LocalDirSource;
        let candidates = adapter
            .list(&source(dir.path()), since, until, &ListFilters::default())
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].source_key, "lecture.mp4");
        assert_eq!(candidates[0].display_name, "lecture");
        assert_eq!(candidates[0].size_bytes, Some(2048));
        assert!(candidates[0].finalized);
    }

    #[tokio::test]
    async fn test_name_filter() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Python Lecture 1.mp4"), vec![0u8; 10]).unwrap();
        std::fs::write(dir.path().join("Standup.mp4"), vec![0u8; 10]).unwrap();

        let (since, until) = wide_window();
        let filters = ListFilters {
            name_contains: Some("python".into()),
            ..ListFilters::default()
        };
        let candidates = LocalDirSource.list(&source(dir.path()), since, until, &filters).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].display_name, "Python Lecture 1");
    }

    #[test]
    fn test_pattern_matching() {
        assert!(matches_any_pattern("a.mp4", &["*.mp4".into()]));
        assert!(matches_any_pattern("A.MP4", &["*.mp4".into()]));
        assert!(!matches_any_pattern("a.mkv", &["*.mp4".into()]));
        assert!(matches_any_pattern("exact.mov", &["exact.mov".into()]));
    }

    #[tokio::test]
    async fn test_fetch_copies_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp4"), vec![7u8; 512]).unwrap();

        let dest = dest_dir.path().join("source.mp4");
        let report = LocalDirSource.fetch(&source(dir.path()), "a.mp4", &dest, 0).await.unwrap();
        assert_eq!(report.bytes_written, 512);
        assert_eq!(std::fs::read(dest).unwrap(), vec![7u8; 512]);
    }

    #[tokio::test]
    async fn test_fetch_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.mp4");
        let err = LocalDirSource.fetch(&source(dir.path()), "gone.mp4", &dest, 0).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
