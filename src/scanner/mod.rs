//! File scanner for collecting a candidate's source files.
//!
//! The analysis worker embeds these files in its prompt, so the scanner
//! respects the configured extensions, excludes and size limits.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Configuration for file scanning.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// File extensions to include (e.g., ["rs", "py", "js"])
    pub extensions: Vec<String>,
    /// Directory or file names to skip (e.g., ["node_modules", "target"])
    pub excludes: Vec<String>,
    /// Maximum file size in bytes
    pub max_file_size: u64,
    /// Maximum number of files to collect
    pub max_files: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::from(&crate::config::ScannerConfig::default())
    }
}

impl From<&crate::config::ScannerConfig> for ScanConfig {
    fn from(config: &crate::config::ScannerConfig) -> Self {
        Self {
            extensions: config.extensions.clone(),
            excludes: config.excludes.clone(),
            max_file_size: config.max_file_size,
            max_files: config.max_files,
        }
    }
}

/// Scanned file information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Path relative to the candidate root, with `/` separators
    pub path: String,
    pub size: u64,
}

/// File scanner rooted at one candidate checkout.
pub struct FileScanner {
    config: ScanConfig,
    root: PathBuf,
}

impl FileScanner {
    pub fn new(root: PathBuf, config: ScanConfig) -> Self {
        Self { config, root }
    }

    /// Scan for matching files, sorted by path.
    pub fn scan(&self) -> Result<Vec<ScannedFile>> {
        let mut files = Vec::new();

        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !self.is_excluded(entry));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.has_wanted_extension(entry.path()) {
                continue;
            }

            let size = entry
                .metadata()
                .with_context(|| format!("Failed to stat {}", entry.path().display()))?
                .len();
            if size > self.config.max_file_size {
                debug!("Skipping large file {} ({} bytes)", entry.path().display(), size);
                continue;
            }

            files.push(ScannedFile {
                path: self.relative(entry.path()),
                size,
            });

            if files.len() >= self.config.max_files {
                debug!("Reached max_files limit ({})", self.config.max_files);
                break;
            }
        }

        Ok(files)
    }

    /// Collect matching files with their contents, keyed by relative path.
    pub fn collect_files(&self) -> Result<BTreeMap<String, String>> {
        let mut files = BTreeMap::new();

        for file in self.scan()? {
            let full_path = self.root.join(&file.path);
            match fs::read_to_string(&full_path) {
                Ok(content) => {
                    files.insert(file.path, content);
                }
                Err(e) => warn!("Failed to read {}: {}", file.path, e),
            }
        }

        Ok(files)
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        name.starts_with('.') || self.config.excludes.iter().any(|p| name == p.as_str())
    }

    fn has_wanted_extension(&self, path: &Path) -> bool {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        self.config.extensions.iter().any(|e| e == ext)
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}
