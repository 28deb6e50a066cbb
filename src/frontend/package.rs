//! Package loading
//!
//! `#import "path"` names a package: a directory of `.vs` files (or a single
//! `path.vs` file) found on the search paths. Loaders only locate and read
//! text; parsing and pass 1 happen in the semantic layer, which memoizes
//! packages by the key a loader resolves them to.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::utils::{Error, Result, Span};

/// Source extension of Verse files
pub const SOURCE_EXTENSION: &str = "vs";

/// One file of a package
#[derive(Debug, Clone, PartialEq)]
pub struct PackageSource {
    /// Display name used in diagnostics
    pub name: String,
    pub text: String,
}

/// Locates and reads imported packages
pub trait PackageLoader {
    /// Stable key for an import path; equal keys denote the same package
    fn resolve(&self, path: &str, span: Span) -> Result<String>;

    /// Files of the package at `key`, in load order
    fn read(&mut self, key: &str) -> Result<Vec<PackageSource>>;
}

/// Package name: last component of the import path
pub fn package_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
    name.strip_suffix(".vs").unwrap_or(name)
}

// ==================== Filesystem Loader ====================

/// Loader over the filesystem and a list of search paths
pub struct FsPackageLoader {
    search_paths: Vec<PathBuf>,
}

impl FsPackageLoader {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// Add a search path
    pub fn add_search_path(&mut self, path: PathBuf) {
        if !self.search_paths.contains(&path) {
            self.search_paths.push(path);
        }
    }

    fn candidates(&self, path: &str) -> impl Iterator<Item = PathBuf> + '_ {
        let path = path.to_string();
        self.search_paths.iter().flat_map(move |dir| {
            let base = dir.join(&path);
            let file = dir.join(format!("{}.{}", path, SOURCE_EXTENSION));
            [base, file]
        })
    }

    fn read_dir_sources(dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(dir).map_err(|e| Error::Io(format!("{}: {}", dir.display(), e)))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::Io(e.to_string()))?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl PackageLoader for FsPackageLoader {
    fn resolve(&self, path: &str, span: Span) -> Result<String> {
        for candidate in self.candidates(path) {
            let found = if candidate.is_dir() {
                !Self::read_dir_sources(&candidate)?.is_empty()
            } else {
                candidate.is_file()
            };
            if found {
                let key = fs::canonicalize(&candidate).unwrap_or(candidate);
                return Ok(key.display().to_string());
            }
        }
        Err(Error::PackageNotFound { path: path.to_string(), span })
    }

    fn read(&mut self, key: &str) -> Result<Vec<PackageSource>> {
        let root = PathBuf::from(key);
        let files = if root.is_dir() { Self::read_dir_sources(&root)? } else { vec![root] };
        let mut sources = Vec::with_capacity(files.len());
        for file in files {
            let text = fs::read_to_string(&file).map_err(|e| Error::Io(format!("{}: {}", file.display(), e)))?;
            debug!("read package file {}", file.display());
            sources.push(PackageSource { name: file.display().to_string(), text });
        }
        Ok(sources)
    }
}

// ==================== In-Memory Loader ====================

/// Loader over an in-memory table of packages (tests, embedding)
#[derive(Debug, Default)]
pub struct MemoryPackageLoader {
    packages: HashMap<String, Vec<PackageSource>>,
}

impl MemoryPackageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file to the package at `path`
    pub fn add_file(&mut self, path: &str, name: &str, text: &str) -> &mut Self {
        self.packages.entry(path.to_string()).or_default().push(PackageSource {
            name: name.to_string(),
            text: text.to_string(),
        });
        self
    }
}

impl PackageLoader for MemoryPackageLoader {
    fn resolve(&self, path: &str, span: Span) -> Result<String> {
        if self.packages.contains_key(path) {
            Ok(path.to_string())
        } else {
            Err(Error::PackageNotFound { path: path.to_string(), span })
        }
    }

    fn read(&mut self, key: &str) -> Result<Vec<PackageSource>> {
        self.packages
            .get(key)
            .cloned()
            .ok_or_else(|| Error::PackageNotFound { path: key.to_string(), span: Span::dummy() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_name_is_last_component() {
        assert_eq!(package_name("std/strings"), "strings");
        assert_eq!(package_name("math"), "math");
        assert_eq!(package_name("lib/util.vs"), "util");
        assert_eq!(package_name("lib/util/"), "util");
    }

    #[test]
    fn test_memory_loader() {
        let mut loader = MemoryPackageLoader::new();
        loader.add_file("lib/math", "math.vs", "pi :: 3;");
        let key = loader.resolve("lib/math", Span::dummy()).unwrap();
        let files = loader.read(&key).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].text, "pi :: 3;");
        assert!(matches!(
            loader.resolve("missing", Span::dummy()),
            Err(Error::PackageNotFound { .. })
        ));
    }

    #[test]
    fn test_fs_loader_reads_directory_in_sorted_order() {
        let dir = std::env::temp_dir().join(format!("verse_pkg_test_{}", std::process::id()));
        let pkg = dir.join("geo");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("b.vs"), "b :: 2;").unwrap();
        fs::write(pkg.join("a.vs"), "a :: 1;").unwrap();
        fs::write(pkg.join("notes.txt"), "ignored").unwrap();

        let mut loader = FsPackageLoader::new(vec![dir.clone()]);
        let key = loader.resolve("geo", Span::dummy()).unwrap();
        let files = loader.read(&key).unwrap();
        let texts: Vec<&str> = files.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(texts, vec!["a :: 1;", "b :: 2;"]);
        assert!(loader.resolve("nowhere", Span::dummy()).is_err());
        let _ = fs::remove_dir_all(&dir);
    }
}
