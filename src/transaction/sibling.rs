// src/transaction/sibling.rs

//! Archive file-name conventions
//!
//! Debian archives are conventionally named `name_version_arch.deb`. That
//! convention drives the install fast path, the sibling-lookup fallback for
//! missing dependencies, and resolution of bare install targets.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Components of a `name_version_arch.deb` file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveName<'a> {
    pub name: &'a str,
    pub version: Option<&'a str>,
    pub arch: Option<&'a str>,
}

/// Split an archive file name on `_`; `None` if it is not a `.deb`
pub fn parse_archive_name(file_name: &str) -> Option<ArchiveName<'_>> {
    let stem = file_name.strip_suffix(".deb")?;
    let mut parts = stem.splitn(3, '_');
    let name = parts.next().filter(|n| !n.is_empty())?;
    let version = parts.next().filter(|v| !v.is_empty());
    let arch = parts.next().filter(|a| !a.is_empty());
    Some(ArchiveName {
        name,
        version,
        arch,
    })
}

/// Parse the file-name part of `path`
pub fn archive_name(path: &Path) -> Option<ArchiveName<'_>> {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(parse_archive_name)
}

/// Drop a Debian epoch (`1:2.0` -> `2.0`), which file names never carry
fn without_epoch(version: &str) -> &str {
    match version.split_once(':') {
        Some((epoch, rest)) if !epoch.is_empty() && epoch.bytes().all(|b| b.is_ascii_digit()) => {
            rest
        }
        _ => version,
    }
}

/// Archives next to `origin` that provide `dep_name`, best candidate first
///
/// A candidate is `<dir>/<dep_name>_*.deb` whose name part matches exactly.
/// Candidates whose version matches `preferred_version` come first; the
/// rest follow in sorted order. `origin` itself is never returned.
pub fn find_siblings(origin: &Path, dep_name: &str, preferred_version: &str) -> Result<Vec<PathBuf>> {
    let dir = match origin.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let dir_str = dir
        .to_str()
        .ok_or_else(|| Error::InvalidInput(format!("non UTF-8 directory: {}", dir.display())))?;

    let pattern = format!(
        "{}/{}_*.deb",
        glob::Pattern::escape(dir_str.trim_end_matches('/')),
        glob::Pattern::escape(dep_name)
    );
    debug!("Looking for {} siblings with pattern {}", dep_name, pattern);

    let paths = glob::glob(&pattern).map_err(|e| Error::InvalidInput(e.to_string()))?;

    let preferred_version = without_epoch(preferred_version);
    let mut exact = Vec::new();
    let mut others = Vec::new();
    for path in paths.flatten() {
        if path == origin || !path.is_file() {
            continue;
        }
        let Some(parsed) = archive_name(&path) else {
            continue;
        };
        if parsed.name != dep_name {
            continue;
        }
        if parsed.version == Some(preferred_version) {
            exact.push(path);
        } else {
            others.push(path);
        }
    }

    exact.sort();
    others.sort();
    exact.extend(others);
    Ok(exact)
}

/// Turn a command-line install target into an archive path
///
/// Anything ending in `.deb` is taken as a path. Otherwise the target is a
/// pattern prefix: `<target>*.deb`, then `debs/<target>*.deb`. The first
/// sorted match wins.
pub fn resolve_target(target: &str) -> Result<PathBuf> {
    if target.ends_with(".deb") {
        return Ok(PathBuf::from(target));
    }

    let mut patterns = vec![format!("{}*.deb", target)];
    if !target.contains('/') {
        patterns.push(format!("debs/{}*.deb", target));
    }

    for pattern in &patterns {
        let mut matches: Vec<PathBuf> = glob::glob(pattern)
            .map_err(|e| Error::InvalidInput(format!("bad pattern {}: {}", pattern, e)))?
            .flatten()
            .filter(|p| p.is_file())
            .collect();
        matches.sort();
        if let Some(first) = matches.into_iter().next() {
            debug!("Resolved install target {} to {}", target, first.display());
            return Ok(first);
        }
    }

    Err(Error::NotFound {
        name: target.to_string(),
        suggestions: Vec::new(),
    })
}
