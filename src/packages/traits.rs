// src/packages/traits.rs

//! Common traits for package archive extraction

use crate::error::Result;
use crate::packages::record::PackageRecord;
use std::path::Path;

/// Unpacks a package archive and reads its metadata
///
/// Implementations leave a `control/` and a `data/` tree under a directory
/// of their choosing inside `workspace`, and return a record whose
/// `control_dir`/`data_dir` point at them and whose `files` lists the
/// payload relative to `data/`.
pub trait Extractor {
    fn extract(&self, archive: &Path, workspace: &Path) -> Result<PackageRecord>;
}
