// src/db/format.rs

//! On-disk encodings for package database entries
//!
//! `pkginfo.bin` is a sequence of length-prefixed fields:
//!
//! ```text
//! u64 len | len bytes (value + NUL)     x 11, fixed order, len 0 = absent
//! i32 file_count
//! u64 len | len bytes (path + NUL)      x file_count (optional trailer)
//! ```
//!
//! All integers are native-endian. `files.list` holds the manifest as one
//! relative path per line.

use crate::error::{Error, Result};
use crate::limits::{self, MAX_PATH_LEN, MAX_STRING_LEN};
use crate::packages::PackageRecord;
use std::path::Path;

/// Binary metadata file name inside a package directory
pub const PKGINFO_FILE: &str = "pkginfo.bin";

/// Manifest text file name inside a package directory
pub const FILES_LIST: &str = "files.list";

const LEN_SIZE: usize = size_of::<u64>();
const COUNT_SIZE: usize = size_of::<i32>();

/// Decoded contents of a `pkginfo.bin`
#[derive(Debug)]
pub struct BinaryInfo {
    /// Scalar fields; `files` is always empty here
    pub record: PackageRecord,
    pub file_count: usize,
    /// Manifest entries carried after `file_count`, when present
    pub manifest: Option<Vec<String>>,
}

fn required(value: &str) -> Option<&str> {
    if value.is_empty() { None } else { Some(value) }
}

fn scalar_fields(record: &PackageRecord) -> [Option<&str>; 11] {
    [
        required(&record.name),
        required(&record.version),
        record.architecture.as_deref(),
        record.maintainer.as_deref(),
        record.description.as_deref(),
        record.depends.as_deref(),
        record.installed_size.as_deref(),
        record.section.as_deref(),
        record.priority.as_deref(),
        record.homepage.as_deref(),
        record.filename.as_deref(),
    ]
}

fn put_field(out: &mut Vec<u8>, value: Option<&str>) {
    match value {
        Some(value) => {
            out.extend_from_slice(&(value.len() as u64 + 1).to_ne_bytes());
            out.extend_from_slice(value.as_bytes());
            out.push(0);
        }
        None => out.extend_from_slice(&0u64.to_ne_bytes()),
    }
}

/// Serialize a record into the `pkginfo.bin` layout
pub fn encode_binary(record: &PackageRecord) -> Result<Vec<u8>> {
    let file_count = limits::validate_file_count(record.files.len() as i64)?;

    let mut out = Vec::new();
    for value in scalar_fields(record) {
        if let Some(value) = value {
            limits::validate_string(value, MAX_STRING_LEN, "metadata field")?;
        }
        put_field(&mut out, value);
    }

    let count = i32::try_from(file_count)
        .map_err(|_| Error::InvalidInput(format!("file count {} out of range", file_count)))?;
    out.extend_from_slice(&count.to_ne_bytes());

    for path in &record.files {
        limits::validate_string(path, MAX_PATH_LEN, "manifest entry")?;
        put_field(&mut out, Some(path));
    }
    Ok(out)
}

/// Bounds-checked cursor over a `pkginfo.bin` buffer
struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
    path: &'a Path,
}

impl<'a> FieldReader<'a> {
    fn corrupt(&self, reason: impl Into<String>) -> Error {
        Error::Corrupt {
            path: self.path.to_path_buf(),
            reason: reason.into(),
        }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.buf.len());
        match end {
            Some(end) => {
                let bytes = &self.buf[self.pos..end];
                self.pos = end;
                Ok(bytes)
            }
            None => Err(self.corrupt(format!(
                "truncated while reading {} at offset {}",
                what, self.pos
            ))),
        }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_field(&mut self, what: &str, max_len: usize) -> Result<Option<String>> {
        let len_bytes = self.take(LEN_SIZE, what)?;
        let mut raw = [0u8; LEN_SIZE];
        raw.copy_from_slice(len_bytes);
        let len = u64::from_ne_bytes(raw);
        if len == 0 {
            return Ok(None);
        }

        // Stored length counts the trailing NUL
        let len = usize::try_from(len)
            .ok()
            .filter(|&len| len <= max_len + 1)
            .ok_or_else(|| self.corrupt(format!("{} length {} exceeds limit", what, len)))?;

        let payload = self.take(len, what)?;
        let mut value = limits::alloc_zeroed(len).map_err(|e| self.corrupt(e.to_string()))?;
        value.copy_from_slice(payload);
        if value.last() == Some(&0) {
            value.pop();
        }

        match String::from_utf8(value) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                let mut rejected = Some(e.into_bytes());
                limits::release(&mut rejected, true);
                Err(self.corrupt(format!("{} is not valid UTF-8", what)))
            }
        }
    }

    fn read_count(&mut self) -> Result<usize> {
        let bytes = self.take(COUNT_SIZE, "file count")?;
        let mut raw = [0u8; COUNT_SIZE];
        raw.copy_from_slice(bytes);
        let count = i32::from_ne_bytes(raw);
        limits::validate_file_count(i64::from(count)).map_err(|e| self.corrupt(e.to_string()))
    }
}

/// Parse a `pkginfo.bin` buffer read from `path`
///
/// Any underrun, oversized length, or leftover byte is reported as
/// [`Error::Corrupt`]; no partially populated record is returned.
pub fn decode_binary(buf: &[u8], path: &Path) -> Result<BinaryInfo> {
    let mut reader = FieldReader { buf, pos: 0, path };

    const NAMES: [&str; 11] = [
        "package name",
        "version",
        "architecture",
        "maintainer",
        "description",
        "depends",
        "installed size",
        "section",
        "priority",
        "homepage",
        "filename",
    ];
    let mut fields: [Option<String>; 11] = Default::default();
    for (slot, what) in fields.iter_mut().zip(NAMES) {
        *slot = reader.read_field(what, MAX_STRING_LEN)?;
    }
    let file_count = reader.read_count()?;

    let manifest = if reader.remaining() == 0 {
        None
    } else {
        let mut entries = Vec::new();
        if file_count > 0 {
            entries = limits::alloc_array::<String>(file_count)
                .map_err(|e| reader.corrupt(e.to_string()))?;
        }
        for _ in 0..file_count {
            let entry = reader
                .read_field("manifest entry", MAX_PATH_LEN)?
                .ok_or_else(|| reader.corrupt("empty manifest entry"))?;
            entries.push(entry);
        }
        if reader.remaining() != 0 {
            return Err(reader.corrupt(format!("{} unexpected trailing bytes", reader.remaining())));
        }
        Some(entries)
    };

    let [
        name,
        version,
        architecture,
        maintainer,
        description,
        depends,
        installed_size,
        section,
        priority,
        homepage,
        filename,
    ] = fields;

    let name = name.ok_or_else(|| reader.corrupt("missing package name"))?;
    let version = version.ok_or_else(|| reader.corrupt("missing package version"))?;

    Ok(BinaryInfo {
        record: PackageRecord {
            name,
            version,
            architecture,
            maintainer,
            description,
            depends,
            installed_size,
            section,
            priority,
            homepage,
            filename,
            ..Default::default()
        },
        file_count,
        manifest,
    })
}

/// Render a manifest as newline-terminated lines
pub fn encode_manifest(files: &[String]) -> String {
    let mut out = String::new();
    for path in files {
        out.push_str(path);
        out.push('\n');
    }
    out
}

/// Parse `files.list`, skipping blank lines
pub fn decode_manifest(text: &str, path: &Path) -> Result<Vec<String>> {
    let corrupt = |reason: String| Error::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let mut files = Vec::new();
    for line in text.lines().filter(|l| !l.is_empty()) {
        limits::validate_string(line, MAX_PATH_LEN, "manifest entry")
            .map_err(|e| corrupt(e.to_string()))?;
        files.push(line.to_string());
    }
    limits::validate_file_count(files.len() as i64).map_err(|e| corrupt(e.to_string()))?;
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PackageRecord {
        let mut record = PackageRecord::new("hello", "2.10-1");
        record.architecture = Some("amd64".to_string());
        record.depends = Some("libc6 (>= 2.34)".to_string());
        record.filename = Some("hello_2.10-1_amd64.deb".to_string());
        record.files = vec!["usr/bin/hello".to_string(), "usr/share/man/man1/hello.1.gz".to_string()];
        record
    }

    #[test]
    fn test_field_layout() {
        let bytes = encode_binary(&PackageRecord::new("ab", "1")).unwrap();

        // "ab" is stored with its NUL
        assert_eq!(&bytes[..8], &3u64.to_ne_bytes());
        assert_eq!(&bytes[8..11], b"ab\0");
        assert_eq!(&bytes[11..19], &2u64.to_ne_bytes());
        assert_eq!(&bytes[19..21], b"1\0");
        // nine absent fields, then a zero file count
        for i in 0..9 {
            let start = 21 + i * 8;
            assert_eq!(&bytes[start..start + 8], &0u64.to_ne_bytes());
        }
        assert_eq!(&bytes[93..], &0i32.to_ne_bytes());
    }

    #[test]
    fn test_binary_preserves_fields_and_manifest() {
        let record = sample();
        let bytes = encode_binary(&record).unwrap();
        let info = decode_binary(&bytes, Path::new("pkginfo.bin")).unwrap();

        assert_eq!(info.record.name, "hello");
        assert_eq!(info.record.version, "2.10-1");
        assert_eq!(info.record.architecture.as_deref(), Some("amd64"));
        assert_eq!(info.record.maintainer, None);
        assert_eq!(info.record.depends, record.depends);
        assert_eq!(info.file_count, 2);
        assert_eq!(info.manifest.as_deref(), Some(&record.files[..]));
    }

    #[test]
    fn test_decode_without_trailer() {
        let record = sample();
        let bytes = encode_binary(&record).unwrap();
        let header_len = bytes.len()
            - record
                .files
                .iter()
                .map(|f| LEN_SIZE + f.len() + 1)
                .sum::<usize>();

        let info = decode_binary(&bytes[..header_len], Path::new("pkginfo.bin")).unwrap();
        assert_eq!(info.file_count, 2);
        assert!(info.manifest.is_none());
    }

    #[test]
    fn test_truncated_is_corrupt() {
        let bytes = encode_binary(&sample()).unwrap();
        for cut in [0, 4, 9, 30] {
            let err = decode_binary(&bytes[..cut], Path::new("pkginfo.bin")).unwrap_err();
            assert!(matches!(err, Error::Corrupt { .. }), "cut at {}", cut);
        }
    }

    #[test]
    fn test_huge_length_is_corrupt() {
        let mut bytes = u64::MAX.to_ne_bytes().to_vec();
        bytes.extend_from_slice(b"x");
        let err = decode_binary(&bytes, Path::new("pkginfo.bin")).unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }

    #[test]
    fn test_invalid_utf8_is_corrupt() {
        let mut bytes = 3u64.to_ne_bytes().to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, 0]);
        let err = decode_binary(&bytes, Path::new("pkginfo.bin")).unwrap_err();
        match err {
            Error::Corrupt { reason, .. } => assert!(reason.contains("UTF-8")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_negative_count_is_corrupt() {
        let mut bytes = encode_binary(&PackageRecord::new("a", "1")).unwrap();
        let len = bytes.len();
        bytes[len - 4..].copy_from_slice(&(-3i32).to_ne_bytes());
        let err = decode_binary(&bytes, Path::new("pkginfo.bin")).unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }

    #[test]
    fn test_manifest_text() {
        let files = vec!["etc/hello.conf".to_string(), "usr/bin/hello".to_string()];
        let text = encode_manifest(&files);
        assert_eq!(text, "etc/hello.conf\nusr/bin/hello\n");
        assert_eq!(decode_manifest(&text, Path::new("files.list")).unwrap(), files);
        assert!(decode_manifest("", Path::new("files.list")).unwrap().is_empty());
    }
}
