// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Storage Path Builder
//!
//! One place that knows the on-disk layout. Paths are content-addressed by
//! recording ID, never by display name, so renames don't move files:
//!
//! ```text
//! storage/
//!   shared/thumbnails/
//!   temp/
//!   users/user_{slug:06}/
//!     thumbnails/
//!     recordings/{id}/
//!       source.mp4
//!       video.mp4
//!       audio.mp3
//!       transcriptions/
//!         master.json, topics.json, extracted.json
//!         cache/ (segments.txt, words.txt, *.srt, *.vtt)
//! ```
//!
//! The per-user subtree is the unit of both quota accounting (disk usage is
//! summed lazily under `user_root`) and isolation (no path for one user ever
//! lands under another's slug directory).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Builds every path the platform touches, rooted at one base directory.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    base: PathBuf,
}

impl StoragePaths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn shared_thumbnails_dir(&self) -> PathBuf {
        self.base.join("shared").join("thumbnails")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.base.join("temp")
    }

    /// Unique temp file path; creates the temp directory if needed.
    pub fn create_temp_path(&self, prefix: &str, suffix: &str) -> io::Result<PathBuf> {
        let dir = self.temp_dir();
        fs::create_dir_all(&dir)?;
        let token = uuid::Uuid::new_v4().simple().to_string();
        Ok(dir.join(format!("{}{}{}", prefix, &token[..8], suffix)))
    }

    /// `storage/users/user_000001`
    pub fn user_root(&self, user_slug: i64) -> PathBuf {
        self.base.join("users").join(format!("user_{:06}", user_slug))
    }

    pub fn user_thumbnails_dir(&self, user_slug: i64) -> PathBuf {
        self.user_root(user_slug).join("thumbnails")
    }

    /// `storage/users/user_000001/recordings/74`
    pub fn recording_root(&self, user_slug: i64, recording_id: i64) -> PathBuf {
        self.user_root(user_slug).join("recordings").join(recording_id.to_string())
    }

    /// Original download target.
    pub fn recording_source(&self, user_slug: i64, recording_id: i64) -> PathBuf {
        self.recording_root(user_slug, recording_id).join("source.mp4")
    }

    /// Trimmed/processed video.
    pub fn recording_video(&self, user_slug: i64, recording_id: i64) -> PathBuf {
        self.recording_root(user_slug, recording_id).join("video.mp4")
    }

    /// Extracted audio track.
    pub fn recording_audio(&self, user_slug: i64, recording_id: i64) -> PathBuf {
        self.recording_root(user_slug, recording_id).join("audio.mp3")
    }

    pub fn transcription_dir(&self, user_slug: i64, recording_id: i64) -> PathBuf {
        self.recording_root(user_slug, recording_id).join("transcriptions")
    }

    pub fn transcription_cache_dir(&self, user_slug: i64, recording_id: i64) -> PathBuf {
        self.transcription_dir(user_slug, recording_id).join("cache")
    }

    pub fn transcription_master(&self, user_slug: i64, recording_id: i64) -> PathBuf {
        self.transcription_dir(user_slug, recording_id).join("master.json")
    }

    pub fn transcription_topics(&self, user_slug: i64, recording_id: i64) -> PathBuf {
        self.transcription_dir(user_slug, recording_id).join("topics.json")
    }

    /// Extraction results (topics plus summary) in the export shape.
    pub fn transcription_extracted(&self, user_slug: i64, recording_id: i64) -> PathBuf {
        self.transcription_dir(user_slug, recording_id).join("extracted.json")
    }

    /// Total bytes on disk under the user's subtree. Computed lazily and
    /// never cached; quota checks call this per admission.
    pub fn user_storage_bytes(&self, user_slug: i64) -> u64 {
        dir_size(&self.user_root(user_slug))
    }

    /// Removes the recording directory recursively. Missing directories are
    /// fine (purge is idempotent).
    pub fn purge_recording_dir(&self, user_slug: i64, recording_id: i64) -> io::Result<()> {
        let root = self.recording_root(user_slug, recording_id);
        match fs::remove_dir_all(&root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(path) else {
        return 0;
    };
    let mut total = 0;
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else { continue };
        if file_type.is_dir() {
            total += dir_size(&entry.path());
        } else if let Ok(meta) = entry.metadata() {
            total += meta.len();
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let paths = StoragePaths::new("/srv/storage");
        assert_eq!(
            paths.recording_source(1, 74),
            PathBuf::from("/srv/storage/users/user_000001/recordings/74/source.mp4")
        );
        assert_eq!(
            paths.transcription_cache_dir(12345, 9),
            PathBuf::from("/srv/storage/users/user_012345/recordings/9/transcriptions/cache")
        );
        assert_eq!(paths.temp_dir(), PathBuf::from("/srv/storage/temp"));
    }

    #[test]
    fn test_slug_padding_isolates_users() {
        let paths = StoragePaths::new("s");
        assert_ne!(paths.user_root(1), paths.user_root(10));
        assert!(paths.user_root(1).ends_with("user_000001"));
    }

    #[test]
    fn test_storage_bytes_and_purge() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = StoragePaths::new(tmp.path());

        let root = paths.recording_root(1, 5);
        fs::create_dir_all(root.join("transcriptions")).unwrap();
        fs::write(root.join("source.mp4"), vec![0u8; 2048]).unwrap();
        fs::write(root.join("transcriptions").join("master.json"), b"{}").unwrap();

        assert_eq!(paths.user_storage_bytes(1), 2048 + 2);
        assert_eq!(paths.user_storage_bytes(2), 0);

        paths.purge_recording_dir(1, 5).unwrap();
        assert!(!root.exists());
        // Idempotent.
        paths.purge_recording_dir(1, 5).unwrap();
    }

    #[test]
    fn test_temp_paths_are_unique() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = StoragePaths::new(tmp.path());
        let a = paths.create_temp_path("proc_", ".mp4").unwrap();
        let b = paths.create_temp_path("proc_", ".mp4").unwrap();
        assert_ne!(a, b);
    }
}
