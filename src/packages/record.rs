// src/packages/record.rs

//! In-memory package metadata
//!
//! A [`PackageRecord`] is produced by extraction, copied into the package
//! index, and serialized into the package database. Optional control fields
//! are `None` when absent, never an empty string.

use serde::Serialize;
use std::path::PathBuf;

/// One package's metadata and file manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub architecture: Option<String>,
    pub maintainer: Option<String>,
    pub description: Option<String>,
    pub depends: Option<String>,
    pub installed_size: Option<String>,
    pub section: Option<String>,
    pub priority: Option<String>,
    pub homepage: Option<String>,
    /// Base name of the archive the package was installed from
    pub filename: Option<String>,
    /// Relative payload paths, in extraction order
    pub files: Vec<String>,

    /// Extracted `control/` tree for the current transaction only
    #[serde(skip)]
    pub control_dir: Option<PathBuf>,
    /// Extracted `data/` tree for the current transaction only
    #[serde(skip)]
    pub data_dir: Option<PathBuf>,
}

impl PackageRecord {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// Name+version only, used to mark a package as being installed
    pub fn placeholder(&self) -> Self {
        Self::new(self.name.clone(), self.version.clone())
    }

    /// A record may be indexed as installed or persisted only with both a
    /// name and a version
    pub fn is_installable(&self) -> bool {
        !self.name.is_empty() && !self.version.is_empty()
    }

    /// `<name>-<version>`, the package database directory name
    pub fn identifier(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_installable_requires_name_and_version() {
        assert!(PackageRecord::new("hello", "2.10").is_installable());
        assert!(!PackageRecord::new("", "2.10").is_installable());
        assert!(!PackageRecord::new("hello", "").is_installable());
    }

    #[test]
    fn test_placeholder_drops_everything_else() {
        let mut record = PackageRecord::new("hello", "2.10");
        record.maintainer = Some("Someone <someone@example.com>".to_string());
        record.files = vec!["usr/bin/hello".to_string()];
        record.data_dir = Some(PathBuf::from("/tmp/hello/data"));

        let placeholder = record.placeholder();
        assert_eq!(placeholder.identifier(), "hello-2.10");
        assert!(placeholder.maintainer.is_none());
        assert!(placeholder.files.is_empty());
        assert!(placeholder.data_dir.is_none());
    }
}
