use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// @module: File and directory utilities

/// Marker distinguishing generated subtitles from originally-shipped ones
pub const GENERATED_MARKER: &str = "subagent-GENERATED";

/// Video container extensions the scanner picks up
const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "mov", "webm"];

/// Subtitle extensions accepted next to a video
const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "stl"];

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_file()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        Ok(())
    }

    /// Recursively list all video files under a root, skipping sample files.
    pub fn find_video_files<P: AsRef<Path>>(root: P) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();
        for entry in WalkDir::new(root.as_ref()).follow_links(true) {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();
            if !path.is_file() || Self::is_sample(path) {
                continue;
            }
            if let Some(ext) = path.extension() {
                let ext = ext.to_string_lossy().to_lowercase();
                if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
                    result.push(path.to_path_buf());
                }
            }
        }
        result.sort();
        Ok(result)
    }

    /// Sample clips ship alongside many releases; never match them.
    pub fn is_sample(path: &Path) -> bool {
        path.file_name()
            .map(|n| n.to_string_lossy().to_lowercase().contains("sample"))
            .unwrap_or(false)
    }

    /// File size in bytes
    pub fn file_size<P: AsRef<Path>>(path: P) -> Result<u64> {
        let metadata = fs::metadata(path.as_ref())
            .with_context(|| format!("Failed to stat {:?}", path.as_ref()))?;
        Ok(metadata.len())
    }

    /// Filename of a generated subtitle for a video, without extension:
    /// `<video_filename>.subagent-GENERATED.<language_code>`
    pub fn generated_subtitle_stem(video: &Path, language_code: &str) -> String {
        let video_filename = video
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        format!("{}.{}.{}", video_filename, GENERATED_MARKER, language_code)
    }

    /// Full path of a generated subtitle next to its video.
    /// `extension` carries a leading dot (".srt").
    pub fn generated_subtitle_path(video: &Path, language_code: &str, extension: &str) -> PathBuf {
        let stem = Self::generated_subtitle_stem(video, language_code);
        let parent = video.parent().unwrap_or_else(|| Path::new("."));
        parent.join(format!("{}{}", stem, extension))
    }

    /// True when a generated subtitle for this language already sits next to
    /// the video, with any accepted subtitle extension.
    pub fn has_generated_subtitle(video: &Path, language_code: &str) -> bool {
        let stem = Self::generated_subtitle_stem(video, language_code);
        let parent = match video.parent() {
            Some(p) => p,
            None => return false,
        };
        let entries = match fs::read_dir(parent) {
            Ok(entries) => entries,
            Err(_) => return false,
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(rest) = name.strip_prefix(&stem) {
                let ext = rest.trim_start_matches('.').to_lowercase();
                if SUBTITLE_EXTENSIONS.contains(&ext.as_str()) {
                    return true;
                }
            }
        }
        false
    }

    /// Read a file to a string
    pub fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
        fs::read_to_string(&path)
            .with_context(|| format!("Failed to read file: {:?}", path.as_ref()))
    }

    /// Write a string to a file, creating parent directories as needed
    pub fn write_to_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            Self::ensure_dir(parent)?;
        }
        fs::write(&path, content)
            .with_context(|| format!("Failed to write to file: {:?}", path.as_ref()))?;
        Ok(())
    }

    /// Remove a file if it exists; missing files are not an error
    pub fn remove_if_exists<P: AsRef<Path>>(path: P) -> Result<()> {
        if path.as_ref().exists() {
            fs::remove_file(path.as_ref())
                .with_context(|| format!("Failed to remove {:?}", path.as_ref()))?;
        }
        Ok(())
    }
}
