//! # File Management Module
//!
//! Questo modulo gestisce tutte le operazioni sui file e la discovery delle immagini.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva e lazy delle immagini supportate (`FileManager::scan`)
//! - Determinazione formato file dall'estensione (case-insensitive)
//! - Scrittura atomica dell'output (file temporaneo + rename)
//! - Formattazione human-readable delle dimensioni
//!
//! ## Formati supportati:
//! - **Immagini**: PNG, JPG, JPEG, TIF, TIFF
//!
//! ## Discovery:
//! - Ordine stabile (entry ordinate per nome in ogni directory)
//! - I symlink vengono seguiti, ma ogni file è visitato al massimo una volta
//!   per path canonico; i cicli vengono saltati
//! - I file non leggibili diventano `ScanEntry::Unreadable` invece di interrompere lo scan
//!
//! ## Esempio:
//! ```rust,ignore
//! for entry in FileManager::scan(Path::new("/path/to/photos")) {
//!     match entry {
//!         ScanEntry::File(path) => { /* convert */ }
//!         ScanEntry::Unreadable { path, reason } => { /* report */ }
//!     }
//! }
//! ```

use crate::error::OptimizeError;
use crate::image_processor::SourceFormat;
use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// One item produced by the directory scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEntry {
    /// Readable image file
    File(PathBuf),
    /// Candidate that failed the readability check
    Unreadable { path: PathBuf, reason: String },
}

impl ScanEntry {
    pub fn path(&self) -> &Path {
        match self {
            ScanEntry::File(path) => path,
            ScanEntry::Unreadable { path, .. } => path,
        }
    }
}

/// Lazy iterator over the supported images below a root directory
pub struct ScanIter {
    walker: walkdir::IntoIter,
    seen: HashSet<PathBuf>,
}

impl Iterator for ScanIter {
    type Item = ScanEntry;

    fn next(&mut self) -> Option<ScanEntry> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    if e.loop_ancestor().is_some() {
                        debug!("Skipping symlink cycle: {}", e);
                        continue;
                    }
                    match e.path() {
                        Some(path) if FileManager::is_supported_format(path) => {
                            return Some(ScanEntry::Unreadable {
                                path: path.to_path_buf(),
                                reason: e.to_string(),
                            });
                        }
                        _ => {
                            warn!("Skipping unreadable entry during scan: {}", e);
                            continue;
                        }
                    }
                }
            };

            if !entry.file_type().is_file() || !FileManager::is_supported_format(entry.path()) {
                continue;
            }

            let path = entry.into_path();

            // Stesso file raggiunto da più symlink: visitato una sola volta
            match path.canonicalize() {
                Ok(canonical) => {
                    if !self.seen.insert(canonical) {
                        debug!("Already visited: {}", path.display());
                        continue;
                    }
                }
                Err(e) => {
                    return Some(ScanEntry::Unreadable {
                        reason: e.to_string(),
                        path,
                    });
                }
            }

            return Some(match File::open(&path) {
                Ok(_) => ScanEntry::File(path),
                Err(e) => ScanEntry::Unreadable {
                    reason: e.to_string(),
                    path,
                },
            });
        }
    }
}

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Enumerate all supported images below `root`, lazily
    pub fn scan(root: &Path) -> ScanIter {
        ScanIter {
            walker: WalkDir::new(root)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter(),
            seen: HashSet::new(),
        }
    }

    /// Find all supported images in a directory
    pub fn find_image_files(root: &Path) -> Vec<PathBuf> {
        Self::scan(root)
            .filter_map(|entry| match entry {
                ScanEntry::File(path) => Some(path),
                ScanEntry::Unreadable { .. } => None,
            })
            .collect()
    }

    /// Check if a file format is supported
    pub fn is_supported_format(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(SourceFormat::from_extension)
            .is_some()
    }

    /// Write `bytes` to `path` atomically.
    ///
    /// The data goes to a temporary file in the destination directory which is renamed
    /// over `path` only once fully written; on any failure the temporary file is removed.
    pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), OptimizeError> {
        let parent = path
            .parent()
            .ok_or_else(|| OptimizeError::Write(format!("no parent directory for {}", path.display())))?;

        let mut temp = tempfile::Builder::new()
            .prefix(".partial-")
            .suffix(".webp")
            .tempfile_in(parent)
            .map_err(|e| OptimizeError::Write(format!("cannot create temporary file in {}: {}", parent.display(), e)))?;

        temp.write_all(bytes)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| OptimizeError::Write(format!("cannot write {}: {}", path.display(), e)))?;

        temp.persist(path)
            .map_err(|e| OptimizeError::Write(format!("cannot move output into {}: {}", path.display(), e.error)))?;

        Ok(())
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
