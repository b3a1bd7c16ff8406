// src/limits.rs

//! Bounded allocation and path primitives
//!
//! Every buffer sized from untrusted input (control files, database records,
//! archive manifests) is obtained through this module, so a corrupt length
//! fails with a [`LimitError`] instead of aborting the process or silently
//! truncating. [`path_join`] is the only place an untrusted relative path is
//! combined with a trusted root directory.

use std::hint::black_box;
use std::mem::size_of;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Maximum length of a single metadata string (1 MiB)
pub const MAX_STRING_LEN: usize = 1024 * 1024;

/// Maximum length of a path or path component (4 KiB)
pub const MAX_PATH_LEN: usize = 4096;

/// Maximum number of entries in a package file manifest
pub const MAX_FILE_COUNT: usize = 100_000;

/// Maximum size of any single allocation (256 MiB)
pub const MAX_ALLOC_SIZE: usize = 256 * 1024 * 1024;

/// Errors raised by the bounded allocation layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LimitError {
    /// A required value was absent or empty
    #[error("Missing required value: {0}")]
    NullPointer(&'static str),

    /// A zero-sized or otherwise meaningless size was requested
    #[error("Invalid size: {0}")]
    InvalidSize(String),

    /// The allocator refused the request
    #[error("Failed to allocate {0} bytes")]
    Allocation(usize),

    /// A size computation overflowed
    #[error("Size overflow: {0}")]
    BufferOverflow(String),

    /// The input was rejected by validation (e.g. path traversal)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The request exceeded a configured ceiling
    #[error("{what} exceeds limit: {actual} > {limit}")]
    SizeLimit {
        what: &'static str,
        actual: usize,
        limit: usize,
    },
}

impl LimitError {
    /// Status code reported at the API boundary
    pub fn code(&self) -> i32 {
        match self {
            LimitError::NullPointer(_) => -1,
            LimitError::InvalidSize(_) => -2,
            LimitError::Allocation(_) => -3,
            LimitError::BufferOverflow(_) => -4,
            LimitError::InvalidInput(_) => -5,
            LimitError::SizeLimit { .. } => -6,
        }
    }
}

fn check_alloc_size(size: usize) -> Result<(), LimitError> {
    if size == 0 {
        return Err(LimitError::InvalidSize("attempted to allocate 0 bytes".to_string()));
    }
    if size > MAX_ALLOC_SIZE {
        return Err(LimitError::SizeLimit {
            what: "allocation",
            actual: size,
            limit: MAX_ALLOC_SIZE,
        });
    }
    Ok(())
}

/// Allocate a zero-filled byte buffer of exactly `size` bytes
pub fn alloc_zeroed(size: usize) -> Result<Vec<u8>, LimitError> {
    check_alloc_size(size)?;

    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| LimitError::Allocation(size))?;
    buf.resize(size, 0);
    Ok(buf)
}

/// Reserve an empty vector with room for `count` elements of `T`
///
/// The `count * size_of::<T>()` product is checked for overflow and against
/// [`MAX_ALLOC_SIZE`] before anything is reserved.
pub fn alloc_array<T>(count: usize) -> Result<Vec<T>, LimitError> {
    let bytes = count.checked_mul(size_of::<T>()).ok_or_else(|| {
        LimitError::BufferOverflow(format!("{} elements of {} bytes", count, size_of::<T>()))
    })?;
    check_alloc_size(bytes)?;

    let mut items = Vec::new();
    items
        .try_reserve_exact(count)
        .map_err(|_| LimitError::Allocation(bytes))?;
    Ok(items)
}

/// Copy a string after checking it against [`MAX_STRING_LEN`]
pub fn bounded_string(value: &str) -> Result<String, LimitError> {
    validate_string(value, MAX_STRING_LEN, "string")?;
    Ok(value.to_string())
}

/// Release a buffer, optionally overwriting it with zeros first
///
/// The slot is always `None` afterwards.
pub fn release(slot: &mut Option<Vec<u8>>, wipe: bool) {
    if let Some(mut buf) = slot.take() {
        if wipe {
            buf.fill(0);
            black_box(&buf);
        }
    }
}

/// Check a string's length against `max_len`
pub fn validate_string(value: &str, max_len: usize, what: &'static str) -> Result<(), LimitError> {
    if value.len() > max_len {
        return Err(LimitError::SizeLimit {
            what,
            actual: value.len(),
            limit: max_len,
        });
    }
    Ok(())
}

/// Check a manifest entry count read from disk or produced by extraction
pub fn validate_file_count(count: i64) -> Result<usize, LimitError> {
    if count < 0 {
        return Err(LimitError::InvalidInput(format!("negative file count: {}", count)));
    }
    let count = usize::try_from(count)
        .map_err(|_| LimitError::InvalidInput(format!("file count out of range: {}", count)))?;
    if count > MAX_FILE_COUNT {
        return Err(LimitError::SizeLimit {
            what: "file count",
            actual: count,
            limit: MAX_FILE_COUNT,
        });
    }
    Ok(count)
}

/// Reject relative paths that could escape the directory they are joined to
pub fn validate_relative_path(rel: &str) -> Result<(), LimitError> {
    if rel.is_empty() {
        return Err(LimitError::NullPointer("relative path"));
    }
    validate_string(rel, MAX_PATH_LEN, "path component")?;
    if rel.contains("..") || rel.contains("//") || rel.starts_with('/') {
        warn!("Blocked suspicious path: {}", rel);
        return Err(LimitError::InvalidInput(format!("suspicious path: {}", rel)));
    }
    Ok(())
}

/// Join a trusted base directory with an untrusted relative path
///
/// Fails if `rel` contains `..` or `//`, starts with `/`, or if either part
/// or the combined path is longer than [`MAX_PATH_LEN`].
pub fn path_join(base: &Path, rel: &str) -> Result<PathBuf, LimitError> {
    let base_len = base.as_os_str().len();
    if base_len == 0 {
        return Err(LimitError::NullPointer("base directory"));
    }
    if base_len > MAX_PATH_LEN {
        return Err(LimitError::SizeLimit {
            what: "base directory",
            actual: base_len,
            limit: MAX_PATH_LEN,
        });
    }
    validate_relative_path(rel)?;

    let joined = base.join(rel);
    let total = joined.as_os_str().len();
    if total > MAX_PATH_LEN {
        return Err(LimitError::SizeLimit {
            what: "combined path",
            actual: total,
            limit: MAX_PATH_LEN,
        });
    }
    Ok(joined)
}
