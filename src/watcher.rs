/*!
 * Library change detection.
 *
 * Polls the library root and condenses it into a small digest (file count
 * plus newest modification time). A digest change means something was
 * added, removed or replaced and a scan is worth triggering. Polling,
 * unlike inotify-style watching, also works on network mounts.
 */

use anyhow::Result;
use log::debug;
use std::path::PathBuf;
use std::time::SystemTime;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LibraryDigest {
    file_count: usize,
    newest_mtime: Option<SystemTime>,
}

/// Detects changes under a directory tree between calls to [`poll`].
///
/// [`poll`]: DirectoryWatcher::poll
pub struct DirectoryWatcher {
    root: PathBuf,
    last_digest: Option<LibraryDigest>,
}

impl DirectoryWatcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            last_digest: None,
        }
    }

    fn digest(&self) -> LibraryDigest {
        let mut file_count = 0usize;
        let mut newest_mtime: Option<SystemTime> = None;
        for entry in WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            file_count += 1;
            if let Ok(metadata) = entry.metadata() {
                if let Ok(mtime) = metadata.modified() {
                    newest_mtime = Some(match newest_mtime {
                        Some(current) => current.max(mtime),
                        None => mtime,
                    });
                }
            }
        }
        LibraryDigest {
            file_count,
            newest_mtime,
        }
    }

    /// Recompute the digest and report whether the tree changed since the
    /// previous call. The first call establishes the baseline and always
    /// reports a change.
    pub fn poll(&mut self) -> Result<bool> {
        let digest = self.digest();
        let changed = self.last_digest != Some(digest);
        if changed {
            debug!(
                "Library digest changed: {} files, newest mtime {:?}",
                digest.file_count, digest.newest_mtime
            );
        }
        self.last_digest = Some(digest);
        Ok(changed)
    }
}
