// src/packages/deb.rs

//! Debian package extraction
//!
//! A .deb is an AR archive holding `debian-binary`, a `control.tar[.gz|.xz|.zst]`
//! and a `data.tar[.gz|.xz|.zst]`. [`DebExtractor`] unpacks both tarballs into
//! a per-archive directory, parses the control file, and lists the payload.

use crate::error::{Error, Result};
use crate::limits::{self, MAX_FILE_COUNT};
use crate::packages::record::PackageRecord;
use crate::packages::traits::Extractor;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::debug;
use walkdir::WalkDir;
use xz2::read::XzDecoder;

/// Default extraction collaborator for `.deb` archives
#[derive(Debug, Default, Clone, Copy)]
pub struct DebExtractor;

/// Parsed control file metadata
#[derive(Debug, Default)]
struct ControlInfo {
    name: Option<String>,
    version: Option<String>,
    architecture: Option<String>,
    maintainer: Option<String>,
    description: Option<String>,
    depends: Option<String>,
    installed_size: Option<String>,
    section: Option<String>,
    priority: Option<String>,
    homepage: Option<String>,
}

impl DebExtractor {
    /// Parse an RFC-822 style control file
    fn parse_control(control_content: &str) -> Result<ControlInfo> {
        let mut info = ControlInfo::default();

        let mut current_field = String::new();
        let mut current_value = String::new();

        for line in control_content.lines() {
            // Multi-line fields start with a space
            if line.starts_with(' ') || line.starts_with('\t') {
                if !current_field.is_empty() {
                    current_value.push('\n');
                    current_value.push_str(line.trim());
                }
            } else if let Some((field, value)) = line.split_once(':') {
                if !current_field.is_empty() {
                    Self::apply_control_field(&mut info, &current_field, &current_value)?;
                }

                current_field = field.trim().to_string();
                current_value = value.trim().to_string();
            }
        }

        if !current_field.is_empty() {
            Self::apply_control_field(&mut info, &current_field, &current_value)?;
        }

        Ok(info)
    }

    fn apply_control_field(info: &mut ControlInfo, field: &str, value: &str) -> Result<()> {
        if value.is_empty() {
            return Ok(());
        }

        let slot = match field {
            "Package" => &mut info.name,
            "Version" => &mut info.version,
            "Architecture" => &mut info.architecture,
            "Maintainer" => &mut info.maintainer,
            "Description" => {
                // Short description only
                info.description = value.lines().next().map(limits::bounded_string).transpose()?;
                return Ok(());
            }
            "Depends" => &mut info.depends,
            "Installed-Size" => &mut info.installed_size,
            "Section" => &mut info.section,
            "Priority" => &mut info.priority,
            "Homepage" => &mut info.homepage,
            _ => return Ok(()),
        };
        *slot = Some(limits::bounded_string(value)?);
        Ok(())
    }

    /// Wrap an AR member in the decompressor its name calls for
    fn decoder<'a, R: Read + 'a>(member: &str, inner: R) -> Result<Box<dyn Read + 'a>> {
        let reader: Box<dyn Read + 'a> = if member.ends_with(".gz") {
            Box::new(GzDecoder::new(inner))
        } else if member.ends_with(".xz") {
            Box::new(XzDecoder::new(inner))
        } else if member.ends_with(".zst") {
            Box::new(zstd::Decoder::new(inner).map_err(|e| {
                Error::ExtractionError(format!("Failed to create zstd decoder: {}", e))
            })?)
        } else if member.ends_with(".tar") {
            Box::new(inner)
        } else {
            return Err(Error::ExtractionError(format!(
                "Unsupported compression for {}",
                member
            )));
        };
        Ok(reader)
    }

    /// Stream `control.tar.*` and `data.tar.*` out of the AR container
    fn unpack_members(archive_path: &Path, control_dest: &Path, data_dest: &Path) -> Result<()> {
        let file = File::open(archive_path).map_err(|e| {
            Error::ExtractionError(format!(
                "Failed to open DEB file {}: {}",
                archive_path.display(),
                e
            ))
        })?;

        let mut archive = ar::Archive::new(file);
        let mut found_control = false;
        let mut found_data = false;

        while let Some(entry) = archive.next_entry() {
            let entry = entry
                .map_err(|e| Error::ExtractionError(format!("Failed to read AR entry: {}", e)))?;

            let member = String::from_utf8_lossy(entry.header().identifier())
                .trim_end_matches('/')
                .to_string();

            let dest = if member.starts_with("control.tar") {
                found_control = true;
                control_dest
            } else if member.starts_with("data.tar") {
                found_data = true;
                data_dest
            } else {
                continue;
            };

            debug!("Unpacking {} into {}", member, dest.display());
            let reader = Self::decoder(&member, entry)?;
            Archive::new(reader).unpack(dest).map_err(|e| {
                Error::ExtractionError(format!("Failed to unpack {}: {}", member, e))
            })?;
        }

        if !found_control {
            return Err(Error::ExtractionError(
                "control.tar not found in DEB archive".to_string(),
            ));
        }
        if !found_data {
            return Err(Error::ExtractionError(
                "data.tar not found in DEB archive".to_string(),
            ));
        }
        Ok(())
    }

    /// Unpack `archive` into the prepared directories and build its record
    fn read_package(
        archive: &Path,
        file_name: &str,
        control_dir: PathBuf,
        data_dir: PathBuf,
    ) -> Result<PackageRecord> {
        Self::unpack_members(archive, &control_dir, &data_dir)?;

        let control_content = fs::read_to_string(control_dir.join("control")).map_err(|e| {
            Error::ExtractionError(format!("Failed to read control file: {}", e))
        })?;
        let control = Self::parse_control(&control_content)?;

        let name = control
            .name
            .ok_or_else(|| Error::ParseError("Package name not found in control file".to_string()))?;
        let version = control.version.ok_or_else(|| {
            Error::ParseError("Package version not found in control file".to_string())
        })?;

        let files = Self::collect_manifest(&data_dir)?;

        debug!(
            "Parsed DEB package: {} version {} ({} files)",
            name,
            version,
            files.len()
        );

        Ok(PackageRecord {
            name,
            version,
            architecture: control.architecture,
            maintainer: control.maintainer,
            description: control.description,
            depends: control.depends,
            installed_size: control.installed_size,
            section: control.section,
            priority: control.priority,
            homepage: control.homepage,
            filename: Some(file_name.to_string()),
            files,
            control_dir: Some(control_dir),
            data_dir: Some(data_dir),
        })
    }

    /// List regular files and symlinks under `data_dir` as `/`-separated
    /// relative paths, sorted
    pub fn collect_manifest(data_dir: &Path) -> Result<Vec<String>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(data_dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                Error::ExtractionError(format!("Failed to walk {}: {}", data_dir.display(), e))
            })?;

            let file_type = entry.file_type();
            if !file_type.is_file() && !file_type.is_symlink() {
                continue;
            }

            if files.len() >= MAX_FILE_COUNT {
                return Err(limits::LimitError::SizeLimit {
                    what: "file count",
                    actual: files.len() + 1,
                    limit: MAX_FILE_COUNT,
                }
                .into());
            }

            let rel = entry.path().strip_prefix(data_dir).map_err(|e| {
                Error::ExtractionError(format!("Unexpected path {}: {}", entry.path().display(), e))
            })?;
            let parts: Vec<&str> = rel
                .components()
                .map(|c| {
                    c.as_os_str().to_str().ok_or_else(|| {
                        Error::ParseError(format!("Non UTF-8 path in payload: {}", rel.display()))
                    })
                })
                .collect::<Result<_>>()?;
            files.push(parts.join("/"));
        }

        Ok(files)
    }
}

impl Extractor for DebExtractor {
    fn extract(&self, archive: &Path, workspace: &Path) -> Result<PackageRecord> {
        debug!("Extracting Debian package: {}", archive.display());

        let file_name = archive
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidInput(format!("Bad archive path: {}", archive.display())))?;
        let stem = file_name.strip_suffix(".deb").unwrap_or(file_name);

        let extract_root = limits::path_join(workspace, stem)?;
        if extract_root.exists() {
            fs::remove_dir_all(&extract_root)?;
        }
        let control_dir = extract_root.join("control");
        let data_dir = extract_root.join("data");
        fs::create_dir_all(&control_dir)?;
        fs::create_dir_all(&data_dir)?;

        let result = Self::read_package(archive, file_name, control_dir, data_dir);
        if result.is_err() {
            if let Err(e) = fs::remove_dir_all(&extract_root) {
                debug!("Failed to clean up {}: {}", extract_root.display(), e);
            }
        }
        result
    }
}
