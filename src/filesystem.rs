// src/filesystem.rs

//! Materializing and removing package payloads
//!
//! Both directions fan out over a dedicated rayon pool sized from the
//! available parallelism. Each job owns its source/destination pair; the
//! only shared state is the set of atomic counters in the report.

use crate::error::{Error, Result};
use crate::limits;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Absolute cap on worker threads
pub const MAX_WORKERS: usize = 32;

/// Two workers per available CPU (4 if unknown), bounded by `max_workers`
pub fn worker_count(max_workers: usize) -> usize {
    let preferred = std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(4);
    preferred.min(max_workers.clamp(1, MAX_WORKERS))
}

fn build_pool(max_workers: usize) -> Result<ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count(max_workers))
        .thread_name(|i| format!("runepkg-io-{}", i))
        .build()
        .map_err(|e| Error::WorkerPool(e.to_string()))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InstallReport {
    pub installed: usize,
    pub errors: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RemoveReport {
    pub removed: usize,
    pub missing: usize,
    pub errors: usize,
}

/// Copy every manifest entry from `data_dir` into `root`
///
/// Entries that fail validation or I/O are logged and counted in
/// [`InstallReport::errors`]; the rest are still installed.
pub fn install_files(
    data_dir: &Path,
    root: &Path,
    files: &[String],
    max_workers: usize,
) -> Result<InstallReport> {
    let installed = AtomicUsize::new(0);
    let errors = AtomicUsize::new(0);

    let mut jobs: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(files.len());
    for rel in files {
        match (limits::path_join(data_dir, rel), limits::path_join(root, rel)) {
            (Ok(src), Ok(dst)) => jobs.push((src, dst)),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Skipping {}: {}", rel, e);
                errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    if !jobs.is_empty() {
        let pool = build_pool(max_workers)?;
        pool.install(|| {
            jobs.par_iter().for_each(|(src, dst)| match install_entry(src, dst) {
                Ok(()) => {
                    debug!("Installed {}", dst.display());
                    installed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!("Failed to install {}: {}", dst.display(), e);
                    errors.fetch_add(1, Ordering::Relaxed);
                }
            })
        });
    }

    Ok(InstallReport {
        installed: installed.into_inner(),
        errors: errors.into_inner(),
    })
}

fn install_entry(src: &Path, dst: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(src)?;
    let file_type = meta.file_type();

    if file_type.is_dir() {
        fs::create_dir_all(dst)?;
        return fs::set_permissions(dst, meta.permissions());
    }

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }

    // Unlink instead of overwriting: never write through a link, into a
    // read-only file, or into a running executable
    if let Ok(existing) = fs::symlink_metadata(dst) {
        if !existing.file_type().is_dir() {
            fs::remove_file(dst)?;
        }
    }

    if file_type.is_symlink() {
        let target = fs::read_link(src)?;
        make_symlink(&target, dst)
    } else if file_type.is_file() {
        fs::copy(src, dst)?;
        fs::set_permissions(dst, meta.permissions())
    } else {
        Err(io::Error::new(
            ErrorKind::Unsupported,
            format!("unsupported file type at {}", src.display()),
        ))
    }
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn make_symlink(_target: &Path, link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        ErrorKind::Unsupported,
        format!("symlinks are not supported here: {}", link.display()),
    ))
}

/// Delete every manifest entry under `root`
///
/// Missing entries are counted separately and are not errors. Directories
/// are removed only when empty.
pub fn remove_files(root: &Path, files: &[String], max_workers: usize) -> Result<RemoveReport> {
    let removed = AtomicUsize::new(0);
    let missing = AtomicUsize::new(0);
    let errors = AtomicUsize::new(0);

    let mut targets = Vec::with_capacity(files.len());
    for rel in files {
        match limits::path_join(root, rel) {
            Ok(path) => targets.push(path),
            Err(e) => {
                warn!("Skipping {}: {}", rel, e);
                errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    if !targets.is_empty() {
        let pool = build_pool(max_workers)?;
        pool.install(|| {
            targets.par_iter().for_each(|path| match remove_entry(path) {
                Ok(true) => {
                    debug!("Removed {}", path.display());
                    removed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(false) => {
                    debug!("Already gone: {}", path.display());
                    missing.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!("Failed to remove {}: {}", path.display(), e);
                    errors.fetch_add(1, Ordering::Relaxed);
                }
            })
        });
    }

    Ok(RemoveReport {
        removed: removed.into_inner(),
        missing: missing.into_inner(),
        errors: errors.into_inner(),
    })
}

fn remove_entry(path: &Path) -> io::Result<bool> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    if meta.file_type().is_dir() {
        match fs::remove_dir(path) {
            Ok(()) => Ok(true),
            // Still holds files owned by something else
            Err(e) if e.kind() == ErrorKind::DirectoryNotEmpty => Ok(true),
            Err(e) => Err(e),
        }
    } else {
        fs::remove_file(path)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_worker_count_bounds() {
        assert!(worker_count(32) >= 1);
        assert!(worker_count(1000) <= MAX_WORKERS);
        assert_eq!(worker_count(1), 1);
        assert_eq!(worker_count(0), 1);
    }

    #[test]
    fn test_install_regular_files_and_dirs() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        let root = dir.path().join("root");
        fs::create_dir_all(data.join("usr/bin")).unwrap();
        fs::create_dir_all(data.join("var/lib/hello")).unwrap();
        fs::write(data.join("usr/bin/hello"), b"#!/bin/sh\n").unwrap();

        let files = vec!["usr/bin/hello".to_string(), "var/lib/hello".to_string()];
        let report = install_files(&data, &root, &files, 4).unwrap();

        assert_eq!(report, InstallReport { installed: 2, errors: 0 });
        assert_eq!(fs::read(root.join("usr/bin/hello")).unwrap(), b"#!/bin/sh\n");
        assert!(root.join("var/lib/hello").is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_install_preserves_mode_and_symlinks() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        let root = dir.path().join("root");
        fs::create_dir_all(data.join("usr/lib")).unwrap();
        fs::write(data.join("usr/lib/libfoo.so.1"), b"elf").unwrap();
        fs::set_permissions(data.join("usr/lib/libfoo.so.1"), fs::Permissions::from_mode(0o755))
            .unwrap();
        std::os::unix::fs::symlink("libfoo.so.1", data.join("usr/lib/libfoo.so")).unwrap();

        // A stale link at the destination is replaced, not followed
        fs::create_dir_all(root.join("usr/lib")).unwrap();
        std::os::unix::fs::symlink("/nonexistent", root.join("usr/lib/libfoo.so")).unwrap();

        let files = vec!["usr/lib/libfoo.so".to_string(), "usr/lib/libfoo.so.1".to_string()];
        let report = install_files(&data, &root, &files, 2).unwrap();
        assert_eq!(report.errors, 0);

        let mode = fs::metadata(root.join("usr/lib/libfoo.so.1")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(
            fs::read_link(root.join("usr/lib/libfoo.so")).unwrap(),
            PathBuf::from("libfoo.so.1")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_reinstall_replaces_read_only_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        let root = dir.path().join("root");
        fs::create_dir_all(data.join("etc")).unwrap();
        fs::create_dir_all(root.join("etc")).unwrap();
        fs::write(data.join("etc/tool.conf"), b"new").unwrap();
        fs::set_permissions(data.join("etc/tool.conf"), fs::Permissions::from_mode(0o444)).unwrap();

        let old = root.join("etc/tool.conf");
        fs::write(&old, b"old").unwrap();
        fs::set_permissions(&old, fs::Permissions::from_mode(0o444)).unwrap();

        let files = vec!["etc/tool.conf".to_string()];
        let report = install_files(&data, &root, &files, 1).unwrap();
        assert_eq!(report, InstallReport { installed: 1, errors: 0 });
        assert_eq!(fs::read(&old).unwrap(), b"new");
    }

    #[test]
    fn test_install_counts_bad_entries() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        let root = dir.path().join("root");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("ok"), b"ok").unwrap();

        let files = vec![
            "ok".to_string(),
            "../escape".to_string(),
            "/etc/passwd".to_string(),
            "not-in-payload".to_string(),
        ];
        let report = install_files(&data, &root, &files, 4).unwrap();
        assert_eq!(report, InstallReport { installed: 1, errors: 3 });
        assert!(!dir.path().join("escape").exists());
    }

    #[test]
    fn test_remove_files() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("usr/bin")).unwrap();
        fs::create_dir_all(root.join("etc/keep")).unwrap();
        fs::write(root.join("usr/bin/hello"), b"x").unwrap();
        fs::write(root.join("etc/keep/other"), b"x").unwrap();

        let files = vec![
            "usr/bin/hello".to_string(),
            "usr/bin/never-installed".to_string(),
            "etc/keep".to_string(),
        ];
        let report = remove_files(root, &files, 4).unwrap();
        assert_eq!(report, RemoveReport { removed: 2, missing: 1, errors: 0 });
        assert!(!root.join("usr/bin/hello").exists());
        assert!(root.join("etc/keep/other").exists());
    }

    #[test]
    fn test_empty_manifest_needs_no_pool() {
        let dir = tempdir().unwrap();
        let report = install_files(dir.path(), dir.path(), &[], 4).unwrap();
        assert_eq!(report, InstallReport::default());
    }
}
