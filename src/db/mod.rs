// src/db/mod.rs

//! Package database
//!
//! One directory per installed package, `<root>/<name>-<version>/`, holding
//! `pkginfo.bin` (scalar metadata) and `files.list` (the manifest). Each
//! file is written to a temporary sibling and renamed into place, and
//! `pkginfo.bin` is written last so its presence marks a finished entry.

pub mod format;

use crate::error::{Error, Result};
use crate::limits::{self, LimitError, MAX_ALLOC_SIZE};
use crate::packages::PackageRecord;
use format::{FILES_LIST, PKGINFO_FILE};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Maximum number of "did you mean" suggestions
pub const MAX_SUGGESTIONS: usize = 10;

const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Installed package names resembling `query`, best match first
pub fn suggestions<'a>(query: &str, candidates: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut scored: Vec<(f64, &str)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let score = if candidate.contains(query) {
                1.0
            } else {
                strsim::jaro_winkler(query, candidate)
            };
            (score >= SUGGESTION_THRESHOLD).then_some((score, candidate))
        })
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored.dedup_by(|a, b| a.1 == b.1);
    scored
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, name)| name.to_string())
        .collect()
}

/// Handle on the on-disk package database
#[derive(Debug, Clone)]
pub struct PackageDb {
    root: PathBuf,
}

impl PackageDb {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if root.as_os_str().is_empty() {
            return Err(Error::InitError("database root is not configured".to_string()));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the database root (idempotent)
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| {
            Error::InitError(format!("Failed to create {}: {}", self.root.display(), e))
        })?;
        Ok(())
    }

    fn entry_path(&self, identifier: &str) -> Result<PathBuf> {
        if identifier.contains('/') {
            return Err(Error::InvalidInput(format!(
                "package identifier contains '/': {}",
                identifier
            )));
        }
        Ok(limits::path_join(&self.root, identifier)?)
    }

    /// `<root>/<name>-<version>`
    pub fn get_path(&self, name: &str, version: &str) -> Result<PathBuf> {
        if name.is_empty() {
            return Err(LimitError::NullPointer("package name").into());
        }
        if version.is_empty() {
            return Err(LimitError::NullPointer("package version").into());
        }
        self.entry_path(&format!("{}-{}", name, version))
    }

    /// Create the package directory, including missing parents
    pub fn create_directory(&self, name: &str, version: &str) -> Result<PathBuf> {
        let dir = self.get_path(name, version)?;
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Persist `record`, replacing any existing files for the same identifier
    pub fn write(&self, record: &PackageRecord) -> Result<()> {
        if !record.is_installable() {
            return Err(Error::InvalidInput(format!(
                "refusing to store package without name and version ({:?} {:?})",
                record.name, record.version
            )));
        }

        let binary = format::encode_binary(record)?;
        let manifest = format::encode_manifest(&record.files);

        let dir = self.create_directory(&record.name, &record.version)?;
        atomic_write(&dir, FILES_LIST, manifest.as_bytes())?;
        atomic_write(&dir, PKGINFO_FILE, &binary)?;

        debug!(
            "Stored {} ({} files) in {}",
            record.identifier(),
            record.files.len(),
            dir.display()
        );
        Ok(())
    }

    pub fn read(&self, name: &str, version: &str) -> Result<PackageRecord> {
        let dir = self.get_path(name, version)?;
        self.read_dir_entry(&dir)
    }

    /// Read an entry by its directory name (`<name>-<version>`)
    pub fn read_entry(&self, identifier: &str) -> Result<PackageRecord> {
        let dir = self.entry_path(identifier)?;
        self.read_dir_entry(&dir)
    }

    fn read_dir_entry(&self, dir: &Path) -> Result<PackageRecord> {
        let bin_path = dir.join(PKGINFO_FILE);
        let size = match fs::metadata(&bin_path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound && dir.is_dir() => {
                return Err(Error::Corrupt {
                    path: bin_path,
                    reason: "metadata file missing".to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        if size > MAX_ALLOC_SIZE as u64 {
            return Err(Error::Corrupt {
                path: bin_path,
                reason: format!("metadata file is {} bytes", size),
            });
        }

        let bytes = fs::read(&bin_path)?;
        let info = format::decode_binary(&bytes, &bin_path)?;
        let mut record = info.record;

        let list_path = dir.join(FILES_LIST);
        let files = match fs::read_to_string(&list_path) {
            Ok(text) => format::decode_manifest(&text, &list_path)?,
            Err(e) if e.kind() == ErrorKind::NotFound => match info.manifest {
                Some(files) => files,
                None if info.file_count == 0 => Vec::new(),
                None => {
                    return Err(Error::Corrupt {
                        path: list_path,
                        reason: format!("missing manifest for {} files", info.file_count),
                    });
                }
            },
            Err(e) => return Err(e.into()),
        };

        if files.len() != info.file_count {
            return Err(Error::Corrupt {
                path: list_path,
                reason: format!(
                    "manifest lists {} files but metadata records {}",
                    files.len(),
                    info.file_count
                ),
            });
        }

        record.files = files;
        Ok(record)
    }

    /// Whether a completed entry exists for `name`-`version`
    pub fn exists(&self, name: &str, version: &str) -> bool {
        self.get_path(name, version)
            .map(|dir| dir.join(PKGINFO_FILE).is_file())
            .unwrap_or(false)
    }

    /// Delete the package directory; `Ok(false)` if there was none
    pub fn remove(&self, name: &str, version: &str) -> Result<bool> {
        let dir = self.get_path(name, version)?;
        self.remove_dir_entry(&dir)
    }

    pub fn remove_entry(&self, identifier: &str) -> Result<bool> {
        let dir = self.entry_path(identifier)?;
        self.remove_dir_entry(&dir)
    }

    fn remove_dir_entry(&self, dir: &Path) -> Result<bool> {
        match fs::remove_dir_all(dir) {
            Ok(()) => {
                info!("Removed database entry {}", dir.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Identifiers of every stored package, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => ids.push(name),
                Err(name) => warn!("Skipping non UTF-8 database entry {:?}", name),
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Package name recorded in an entry's `pkginfo.bin`, if it is readable
    fn stored_name(&self, identifier: &str) -> Option<String> {
        let bin_path = self.entry_path(identifier).ok()?.join(PKGINFO_FILE);
        let bytes = fs::read(&bin_path).ok()?;
        format::decode_binary(&bytes, &bin_path)
            .ok()
            .map(|info| info.record.name)
    }

    /// Resolve a bare name or `name-version` to a single stored identifier
    ///
    /// An exact identifier wins. Otherwise `<query>-<version>` entries whose
    /// stored name is `query` match; unreadable entries are kept so their
    /// corruption is reported to the caller.
    pub fn find(&self, query: &str) -> Result<String> {
        if query.is_empty() {
            return Err(LimitError::NullPointer("package name").into());
        }

        let ids = self.list()?;
        if ids.iter().any(|id| id == query) {
            return Ok(query.to_string());
        }

        // `libfoo-` also prefixes `libfoo-dev-1.0`; the stored name decides
        let prefix = format!("{}-", query);
        let mut matches: Vec<String> = ids
            .iter()
            .filter(|id| id.len() > prefix.len() && id.starts_with(&prefix))
            .filter(|id| self.stored_name(id).is_none_or(|name| name == query))
            .cloned()
            .collect();

        match matches.len() {
            0 => Err(Error::NotFound {
                name: query.to_string(),
                suggestions: suggestions(query, ids.iter().map(String::as_str)),
            }),
            1 => Ok(matches.remove(0)),
            _ => Err(Error::Ambiguous {
                name: query.to_string(),
                candidates: matches,
            }),
        }
    }
}

/// Write `data` to `dir/name` through a synced temporary file and a rename
fn atomic_write(dir: &Path, name: &str, data: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(name)).map_err(|e| e.error)?;
    Ok(())
}
