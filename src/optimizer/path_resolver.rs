//! # Path Resolution Module
//!
//! Centralizza tutta la logica di calcolo dei path di output.
//!
//! - `output = output_root / relative(source, source_root)` con estensione `.webp`
//! - Le due root non possono essere annidate l'una nell'altra: il controllo avviene
//!   una volta sola, prima di qualsiasi conversione
//! - Le directory di output sono create lazy, al massimo una volta ciascuna,
//!   in modo sicuro anche con più worker concorrenti

use crate::error::OptimizeError;
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Estensione di tutti i file prodotti
pub const OUTPUT_EXTENSION: &str = "webp";

/// Utility per calcolare i path di output in modo centralizzato
#[derive(Debug)]
pub struct PathResolver {
    source_root: PathBuf,
    output_root: PathBuf,
    created_dirs: Mutex<HashSet<PathBuf>>,
}

impl PathResolver {
    /// Crea un resolver validando la relazione tra le due root.
    ///
    /// Entrambe le root vengono rese assolute e canoniche (per la parte già esistente).
    pub fn new(source_root: &Path, output_root: &Path) -> Result<Self, OptimizeError> {
        let source_root = source_root.canonicalize().map_err(|e| {
            OptimizeError::Config(format!(
                "Failed to canonicalize source dir {}: {}",
                source_root.display(),
                e
            ))
        })?;
        let output_root = Self::absolute(output_root)?;

        Self::check_roots(&source_root, &output_root)?;

        debug!("Source root: {}", source_root.display());
        debug!("Output root: {}", output_root.display());

        Ok(Self {
            source_root,
            output_root,
            created_dirs: Mutex::new(HashSet::new()),
        })
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Rifiuta root identiche o annidate (in entrambe le direzioni)
    pub fn check_roots(source_root: &Path, output_root: &Path) -> Result<(), OptimizeError> {
        if source_root == output_root {
            return Err(OptimizeError::Config(
                "Input and output directories cannot be the same".to_string(),
            ));
        }
        if output_root.starts_with(source_root) {
            return Err(OptimizeError::Config(format!(
                "Output directory {} is inside the source directory {}",
                output_root.display(),
                source_root.display()
            )));
        }
        if source_root.starts_with(output_root) {
            return Err(OptimizeError::Config(format!(
                "Source directory {} is inside the output directory {}",
                source_root.display(),
                output_root.display()
            )));
        }
        Ok(())
    }

    /// Path relativo di un file sorgente rispetto alla source root
    pub fn relative_path(&self, source_file: &Path) -> Result<PathBuf, OptimizeError> {
        source_file
            .strip_prefix(&self.source_root)
            .map(Path::to_path_buf)
            .map_err(|_| {
                OptimizeError::Scan(format!(
                    "{} is not below {}",
                    source_file.display(),
                    self.source_root.display()
                ))
            })
    }

    /// Calcola il path di output per un file sorgente
    pub fn resolve(&self, source_file: &Path) -> Result<PathBuf, OptimizeError> {
        let relative = self.relative_path(source_file)?;
        if relative.file_stem().is_none() {
            return Err(OptimizeError::Scan(format!(
                "Invalid file name: {}",
                source_file.display()
            )));
        }

        let output = self
            .output_root
            .join(relative)
            .with_extension(OUTPUT_EXTENSION);
        debug!("Resolved output path: {} -> {}", source_file.display(), output.display());
        Ok(output)
    }

    /// Path alternativo quando due sorgenti (es. `a.png` e `a.jpg`) mappano sullo
    /// stesso output: l'estensione originale resta nel nome (`a.jpg.webp`)
    pub fn disambiguate(&self, source_file: &Path) -> Result<PathBuf, OptimizeError> {
        let relative = self.relative_path(source_file)?;
        let mut name = relative
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| OptimizeError::Scan(format!("Invalid file name: {}", source_file.display())))?;
        name.push(".");
        name.push(OUTPUT_EXTENSION);
        Ok(self.output_root.join(relative).with_file_name(name))
    }

    /// Crea la directory parent di `path` se non è già stata creata in questo run
    pub fn ensure_parent_dir(&self, path: &Path) -> Result<(), OptimizeError> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };

        let mut created = self
            .created_dirs
            .lock()
            .map_err(|_| OptimizeError::Write("directory cache poisoned".to_string()))?;
        if created.contains(parent) {
            return Ok(());
        }

        std::fs::create_dir_all(parent).map_err(|e| {
            OptimizeError::Write(format!(
                "Failed to create parent directories for {}: {}",
                path.display(),
                e
            ))
        })?;
        created.insert(parent.to_path_buf());
        Ok(())
    }

    /// Primo nome libero per la output root: se `root` esiste come file regolare
    /// si prova `root_1`, `root_2`, ...
    pub fn unique_output_root(root: &Path) -> PathBuf {
        if !root.is_file() {
            return root.to_path_buf();
        }

        let name = root
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("output"));
        let mut counter = 1;
        loop {
            let mut candidate_name = name.clone();
            candidate_name.push(format!("_{}", counter));
            let candidate = root.with_file_name(candidate_name);
            if !candidate.is_file() {
                return candidate;
            }
            counter += 1;
        }
    }

    /// Rende assoluto un path che può non esistere ancora: canonicalizza l'antenato
    /// esistente più vicino e riattacca il resto.
    fn absolute(path: &Path) -> Result<PathBuf, OptimizeError> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let mut existing = absolute.as_path();
        let mut missing: Vec<&std::ffi::OsStr> = Vec::new();
        loop {
            if let Ok(canonical) = existing.canonicalize() {
                let mut resolved = canonical;
                for part in missing.iter().rev() {
                    resolved.push(part);
                }
                return Ok(Self::normalize(&resolved));
            }
            match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    missing.push(name);
                    existing = parent;
                }
                _ => return Ok(Self::normalize(&absolute)),
            }
        }
    }

    /// Rimuove `.` e `..` lessicalmente
    fn normalize(path: &Path) -> PathBuf {
        let mut result = PathBuf::new();
        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    result.pop();
                }
                other => result.push(other.as_os_str()),
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn roots() -> (TempDir, PathBuf, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("photos");
        std::fs::create_dir_all(source.join("2023/trip")).unwrap();
        let output = temp_dir.path().join("photos_webp");
        (temp_dir, source, output)
    }

    #[test]
    fn test_resolve_mirrors_tree() {
        let (_tmp, source, output) = roots();
        let resolver = PathResolver::new(&source, &output).unwrap();

        let file = resolver.source_root().join("2023/trip/IMG_001.JPG");
        let resolved = resolver.resolve(&file).unwrap();
        assert_eq!(resolved, resolver.output_root().join("2023/trip/IMG_001.webp"));

        let top = resolver.source_root().join("cover.tiff");
        assert_eq!(resolver.resolve(&top).unwrap(), resolver.output_root().join("cover.webp"));
    }

    #[test]
    fn test_resolve_never_targets_source() {
        let (_tmp, source, output) = roots();
        let resolver = PathResolver::new(&source, &output).unwrap();
        let file = resolver.source_root().join("a/b/c.png");
        let resolved = resolver.resolve(&file).unwrap();
        assert!(resolved.starts_with(resolver.output_root()));
        assert!(!resolved.starts_with(resolver.source_root()));
        assert_ne!(resolved, file);
    }

    #[test]
    fn test_disambiguate_keeps_original_extension() {
        let (_tmp, source, output) = roots();
        let resolver = PathResolver::new(&source, &output).unwrap();
        let png = resolver.source_root().join("2023/a.png");
        let jpg = resolver.source_root().join("2023/a.jpg");
        assert_eq!(resolver.resolve(&png).unwrap(), resolver.resolve(&jpg).unwrap());
        assert_eq!(
            resolver.disambiguate(&jpg).unwrap(),
            resolver.output_root().join("2023/a.jpg.webp")
        );
    }

    #[test]
    fn test_file_outside_source_is_rejected() {
        let (tmp, source, output) = roots();
        let resolver = PathResolver::new(&source, &output).unwrap();
        assert!(resolver.resolve(&tmp.path().join("elsewhere.png")).is_err());
    }

    #[test]
    fn test_output_inside_source_is_config_error() {
        let (_tmp, source, _) = roots();
        let err = PathResolver::new(&source, &source.join("optimized_webp")).unwrap_err();
        assert!(matches!(err, OptimizeError::Config(_)));

        let err = PathResolver::new(&source, &source.join("2023/../sub/out")).unwrap_err();
        assert!(matches!(err, OptimizeError::Config(_)));
    }

    #[test]
    fn test_same_or_parent_output_is_config_error() {
        let (tmp, source, _) = roots();
        assert!(matches!(
            PathResolver::new(&source, &source),
            Err(OptimizeError::Config(_))
        ));
        assert!(matches!(
            PathResolver::new(&source, tmp.path()),
            Err(OptimizeError::Config(_))
        ));
    }

    #[test]
    fn test_sibling_with_common_prefix_is_allowed() {
        let (tmp, source, _) = roots();
        let sibling = tmp.path().join("photos2");
        assert!(PathResolver::new(&source, &sibling).is_ok());
    }

    #[test]
    fn test_unique_output_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("optimized_webp");
        assert_eq!(PathResolver::unique_output_root(&root), root);

        std::fs::write(&root, b"file in the way").unwrap();
        std::fs::write(temp_dir.path().join("optimized_webp_1"), b"also a file").unwrap();
        assert_eq!(
            PathResolver::unique_output_root(&root),
            temp_dir.path().join("optimized_webp_2")
        );
    }

    #[test]
    fn test_existing_output_dir_is_reused() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("out");
        std::fs::create_dir_all(&root).unwrap();
        assert_eq!(PathResolver::unique_output_root(&root), root);
    }

    #[test]
    fn test_ensure_parent_dir_concurrent() {
        let (_tmp, source, output) = roots();
        let resolver = Arc::new(PathResolver::new(&source, &output).unwrap());
        let target = resolver.output_root().join("x/y/z/file.webp");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                let target = target.clone();
                std::thread::spawn(move || resolver.ensure_parent_dir(&target))
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert!(target.parent().unwrap().is_dir());
        resolver.ensure_parent_dir(&target).unwrap();
    }

    #[test]
    fn test_ensure_parent_dir_blocked_by_file() {
        let (_tmp, source, output) = roots();
        let resolver = PathResolver::new(&source, &output).unwrap();
        std::fs::create_dir_all(resolver.output_root()).unwrap();
        std::fs::write(resolver.output_root().join("blocker"), b"file").unwrap();

        let err = resolver
            .ensure_parent_dir(&resolver.output_root().join("blocker/img.webp"))
            .unwrap_err();
        assert!(matches!(err, OptimizeError::Write(_)));
    }
}
