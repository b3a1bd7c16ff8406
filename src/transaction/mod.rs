// src/transaction/mod.rs

//! Install and remove transactions
//!
//! [`Engine`] is the context every operation runs against: configuration,
//! the installed-set index, the in-flight index, the package database, and
//! the extractor. An install walks these states:
//!
//! ```text
//! Extracting -> DependencyCheck -> Committing -> FileMaterializing -> Done
//!      |               |
//!      +---------------+--> Aborted
//! ```
//!
//! Missing dependencies are looked for next to the archive being installed
//! and installed recursively. The in-flight index stops dependency cycles;
//! `max_depth` bounds the recursion regardless.
//!
//! There is no rollback: if the database write fails after the index was
//! updated, the two disagree until the next start.

pub mod sibling;

use crate::config::Config;
use crate::db::{self, PackageDb};
use crate::error::{Error, Result};
use crate::filesystem::{self, RemoveReport};
use crate::index::PackageIndex;
use crate::packages::{DebExtractor, Extractor, PackageRecord};
use crate::resolver::{self, Requirement, Satisfaction};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Per-request install options
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InstallOptions {
    /// Reinstall or upgrade installed packages and install past unsatisfied
    /// dependencies
    pub force: bool,
}

/// Details of a completed install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallSummary {
    pub name: String,
    pub version: String,
    /// Version replaced by a forced reinstall or upgrade
    pub previous_version: Option<String>,
    /// Root the payload was copied into
    pub destination: PathBuf,
    pub files_installed: usize,
    pub file_errors: usize,
    /// Dependencies that were still unsatisfied when force let the install
    /// proceed
    pub forced_dependencies: Vec<String>,
    /// Sibling archives installed to satisfy dependencies
    pub pulled_in: Vec<InstallOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed(InstallSummary),
    /// Nothing was done because the package is installed and force is off
    AlreadyInstalled {
        name: String,
        installed_version: String,
        candidate_version: String,
    },
    /// The package is already being installed further up the call chain
    InFlight { name: String },
}

impl InstallOutcome {
    pub fn name(&self) -> &str {
        match self {
            InstallOutcome::Installed(summary) => &summary.name,
            InstallOutcome::AlreadyInstalled { name, .. } => name,
            InstallOutcome::InFlight { name } => name,
        }
    }
}

/// Details of a completed remove
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveOutcome {
    /// Database identifier (`name-version`)
    pub identifier: String,
    pub name: String,
    pub version: String,
    pub files: RemoveReport,
}

/// Result of an installed-package name search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    /// Installed records whose name contains the query
    pub matches: Vec<PackageRecord>,
    /// Similar names, filled in only when nothing matched
    pub suggestions: Vec<String>,
}

/// Removes a per-archive extraction directory when dropped
struct ExtractionCleanup {
    dir: Option<PathBuf>,
}

impl ExtractionCleanup {
    fn new(record: &PackageRecord, workspace: &Path, keep: bool) -> Self {
        let dir = record
            .data_dir
            .as_deref()
            .and_then(Path::parent)
            .filter(|dir| !keep && dir.starts_with(workspace) && *dir != workspace)
            .map(Path::to_path_buf);
        Self { dir }
    }
}

impl Drop for ExtractionCleanup {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = fs::remove_dir_all(&dir) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to clean up {}: {}", dir.display(), e);
                }
            }
        }
    }
}

/// Transaction context owning all package state for one process
pub struct Engine {
    config: Config,
    installed: PackageIndex,
    in_flight: PackageIndex,
    db: PackageDb,
    extractor: Box<dyn Extractor>,
    corrupt: Vec<(String, String)>,
}

impl Engine {
    /// Open with the `.deb` extractor
    pub fn open(config: Config) -> Result<Self> {
        Self::with_extractor(config, Box::new(DebExtractor))
    }

    /// Create the working directories and load every stored package
    pub fn with_extractor(config: Config, extractor: Box<dyn Extractor>) -> Result<Self> {
        config.ensure_directories()?;
        let db = PackageDb::new(&config.runepkg_db)?;
        db.init()?;

        let mut engine = Self {
            config,
            installed: PackageIndex::new()?,
            in_flight: PackageIndex::new()?,
            db,
            extractor,
            corrupt: Vec::new(),
        };
        let loaded = engine.load_installed()?;
        debug!("Loaded {} installed packages", loaded);
        Ok(engine)
    }

    fn load_installed(&mut self) -> Result<usize> {
        for id in self.db.list()? {
            match self.db.read_entry(&id) {
                Ok(record) => self.installed.add(&record)?,
                Err(e) => {
                    warn!("Database entry {} is unreadable: {}", id, e);
                    self.corrupt.push((id, e.to_string()));
                }
            }
        }
        Ok(self.installed.len())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Installed-set index
    pub fn installed(&self) -> &PackageIndex {
        &self.installed
    }

    pub fn db(&self) -> &PackageDb {
        &self.db
    }

    /// Database entries that failed to load, with the read error
    pub fn corrupt_entries(&self) -> &[(String, String)] {
        &self.corrupt
    }

    /// Install one archive and, where needed, sibling archives it depends on
    pub fn install(&mut self, archive: &Path, options: InstallOptions) -> Result<InstallOutcome> {
        let started = Instant::now();
        let mut attempted = HashSet::new();
        let outcome = self.install_archive(archive, options, true, &mut attempted, 0);
        debug!(
            "Install of {} finished in {:.2?}",
            archive.display(),
            started.elapsed()
        );
        outcome
    }

    fn install_archive(
        &mut self,
        archive: &Path,
        options: InstallOptions,
        top_level: bool,
        attempted: &mut HashSet<PathBuf>,
        depth: usize,
    ) -> Result<InstallOutcome> {
        if depth > self.config.install.max_depth {
            return Err(Error::RecursionLimit(self.config.install.max_depth));
        }
        attempted.insert(archive.to_path_buf());

        if let Some(parsed) = sibling::archive_name(archive) {
            if self.in_flight.contains(parsed.name) {
                debug!("{} is already being installed", parsed.name);
                return Ok(InstallOutcome::InFlight {
                    name: parsed.name.to_string(),
                });
            }
            if let (Some(version), false) = (parsed.version, options.force) {
                if let Some(existing) = self.installed.search(parsed.name) {
                    if existing.version == version {
                        debug!("{} {} is already installed", existing.name, version);
                        return Ok(InstallOutcome::AlreadyInstalled {
                            name: existing.name.clone(),
                            installed_version: existing.version.clone(),
                            candidate_version: version.to_string(),
                        });
                    }
                }
            }
        }

        info!("Extracting {}", archive.display());
        let record = self.extractor.extract(archive, &self.config.control_dir)?;
        let _cleanup = ExtractionCleanup::new(
            &record,
            &self.config.control_dir,
            self.config.install.keep_extracted,
        );

        self.install_record(record, archive, options, top_level, attempted, depth)
    }

    fn install_record(
        &mut self,
        record: PackageRecord,
        archive: &Path,
        options: InstallOptions,
        top_level: bool,
        attempted: &mut HashSet<PathBuf>,
        depth: usize,
    ) -> Result<InstallOutcome> {
        if !record.is_installable() {
            return Err(Error::ParseError(format!(
                "{} has no package name or version",
                archive.display()
            )));
        }

        if self.in_flight.contains(&record.name) {
            debug!("{} is already being installed", record.name);
            return Ok(InstallOutcome::InFlight { name: record.name });
        }

        let mut previous_version = None;
        if let Some(existing) = self.installed.search(&record.name) {
            let old_version = existing.version.clone();
            if !options.force {
                return Ok(InstallOutcome::AlreadyInstalled {
                    name: record.name,
                    installed_version: old_version,
                    candidate_version: record.version,
                });
            }

            if old_version == record.version {
                warn!("Reinstalling {} {} (forced)", record.name, old_version);
            } else {
                warn!(
                    "Replacing {} {} with {} (forced)",
                    record.name, old_version, record.version
                );
            }
            if let Err(e) = self.db.remove(&record.name, &old_version) {
                warn!("Failed to remove database entry for {}-{}: {}", record.name, old_version, e);
            }
            self.installed.remove(&record.name);
            previous_version = Some(old_version);
        }

        self.in_flight.add(&record.placeholder())?;
        let result = self.resolve_and_commit(
            &record,
            archive,
            options,
            top_level,
            attempted,
            depth,
            previous_version,
        );
        self.in_flight.remove(&record.name);

        result
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_and_commit(
        &mut self,
        record: &PackageRecord,
        archive: &Path,
        options: InstallOptions,
        top_level: bool,
        attempted: &mut HashSet<PathBuf>,
        depth: usize,
        previous_version: Option<String>,
    ) -> Result<InstallOutcome> {
        let dependencies = record
            .depends
            .as_deref()
            .map(resolver::parse_dependencies)
            .unwrap_or_default();

        let mut unsatisfied = Vec::new();
        let mut pulled_in = Vec::new();

        for dep in &dependencies {
            let status = resolver::check(dep, &self.installed, &self.in_flight);
            let refresh = top_level
                && options.force
                && matches!(status, Satisfaction::Satisfied { in_flight: false, .. });

            if !status.is_satisfied() || refresh {
                // A refresh must not replace a working dependency with a worse one
                let required = refresh.then_some(&dep.requirement);
                if let Some(outcome) = self.install_sibling(
                    &dep.name,
                    archive,
                    &record.version,
                    required,
                    options,
                    attempted,
                    depth,
                )? {
                    pulled_in.push(outcome);
                }
                let status = resolver::check(dep, &self.installed, &self.in_flight);
                if !status.is_satisfied() {
                    unsatisfied.push(dep.to_string());
                }
            }
        }

        if !unsatisfied.is_empty() {
            if !options.force {
                return Err(Error::UnsatisfiedDependencies(unsatisfied));
            }
            warn!(
                "Installing {} despite unsatisfied dependencies: {}",
                record.name,
                unsatisfied.join(", ")
            );
        }

        let data_dir = record.data_dir.as_deref().ok_or_else(|| {
            Error::ExtractionError(format!("no payload directory for {}", record.name))
        })?;

        self.installed
            .add(record)
            .map_err(|e| Error::CommitError(format!("index update for {}: {}", record.name, e)))?;
        self.db.write(record).map_err(|e| {
            Error::CommitError(format!("database write for {}: {}", record.identifier(), e))
        })?;
        info!("Committed {}", record.identifier());

        let report = filesystem::install_files(
            data_dir,
            &self.config.install_root,
            &record.files,
            self.config.install.max_workers,
        )?;
        if report.errors > 0 {
            warn!(
                "{} of {} files for {} failed to install",
                report.errors,
                record.files.len(),
                record.name
            );
        }

        Ok(InstallOutcome::Installed(InstallSummary {
            name: record.name.clone(),
            version: record.version.clone(),
            previous_version,
            destination: self.config.install_root.clone(),
            files_installed: report.installed,
            file_errors: report.errors,
            forced_dependencies: unsatisfied,
            pulled_in,
        }))
    }

    /// Try sibling archives for `dep_name` until one installs
    ///
    /// With `required` set, only archives whose file-name version meets it
    /// are tried.
    #[allow(clippy::too_many_arguments)]
    fn install_sibling(
        &mut self,
        dep_name: &str,
        origin: &Path,
        origin_version: &str,
        required: Option<&Requirement>,
        options: InstallOptions,
        attempted: &mut HashSet<PathBuf>,
        depth: usize,
    ) -> Result<Option<InstallOutcome>> {
        let candidates = sibling::find_siblings(origin, dep_name, origin_version)?;
        for candidate in candidates {
            if attempted.contains(&candidate) {
                continue;
            }
            if let Some(required) = required {
                let acceptable = sibling::archive_name(&candidate)
                    .and_then(|parsed| parsed.version)
                    .is_some_and(|version| required.allows(version));
                if !acceptable {
                    debug!("Skipping {}: version does not satisfy the {} requirement", candidate.display(), dep_name);
                    continue;
                }
            }
            debug!("Trying {} for dependency {}", candidate.display(), dep_name);

            match self.install_archive(&candidate, options, false, attempted, depth + 1) {
                Ok(outcome) => return Ok(Some(outcome)),
                Err(e @ Error::RecursionLimit(_)) => return Err(e),
                Err(e) => warn!("Sibling {} failed to install: {}", candidate.display(), e),
            }
        }
        Ok(None)
    }

    /// Remove an installed package by bare name or `name-version`
    pub fn remove(&mut self, query: &str) -> Result<RemoveOutcome> {
        let identifier = self.db.find(query)?;
        let record = self.db.read_entry(&identifier)?;

        let files = filesystem::remove_files(
            &self.config.install_root,
            &record.files,
            self.config.install.max_workers,
        )?;
        if files.errors > 0 {
            warn!("{} files of {} could not be removed", files.errors, identifier);
        }

        self.db.remove_entry(&identifier)?;
        if self
            .installed
            .search(&record.name)
            .is_some_and(|r| r.version == record.version)
        {
            self.installed.remove(&record.name);
        }
        info!("Removed {}", identifier);

        Ok(RemoveOutcome {
            identifier,
            name: record.name,
            version: record.version,
            files,
        })
    }

    /// Stored record for a bare name or `name-version`
    pub fn status(&self, query: &str) -> Result<PackageRecord> {
        let identifier = self.db.find(query)?;
        self.db.read_entry(&identifier)
    }

    /// Identifiers of every stored package, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        self.db.list()
    }

    /// Installed packages whose name contains `query`
    pub fn search(&self, query: &str) -> SearchResult {
        let mut matches: Vec<PackageRecord> = self
            .installed
            .iter()
            .filter(|r| r.name.contains(query))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));

        let suggestions = if matches.is_empty() {
            let names = self.installed.names();
            db::suggestions(query, names.iter().map(String::as_str))
        } else {
            Vec::new()
        };

        SearchResult {
            matches,
            suggestions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;
    use tempfile::tempdir;

    /// Extractor that serves canned records keyed by archive file name
    struct FakeExtractor {
        packages: HashMap<String, (String, String, Option<String>)>,
        calls: Rc<RefCell<Vec<String>>>,
    }

    impl Extractor for FakeExtractor {
        fn extract(&self, archive: &Path, workspace: &Path) -> Result<PackageRecord> {
            let file = archive.file_name().unwrap().to_str().unwrap().to_string();
            self.calls.borrow_mut().push(file.clone());
            let (name, version, depends) = self
                .packages
                .get(&file)
                .cloned()
                .ok_or_else(|| Error::ExtractionError(format!("no such archive {}", file)))?;

            let data_dir = workspace.join(&file).join("data");
            fs::create_dir_all(data_dir.join("usr/share").join(&name)).unwrap();
            fs::write(data_dir.join("usr/share").join(&name).join("marker"), &version).unwrap();

            let mut record = PackageRecord::new(name.clone(), version);
            record.depends = depends;
            record.files = vec![format!("usr/share/{}/marker", name)];
            record.data_dir = Some(data_dir);
            Ok(record)
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        debs: PathBuf,
        engine: Engine,
        calls: Rc<RefCell<Vec<String>>>,
    }

    fn fixture(packages: &[(&str, &str, &str, Option<&str>)]) -> Fixture {
        let dir = tempdir().unwrap();
        let debs = dir.path().join("debs");
        fs::create_dir_all(&debs).unwrap();
        let mut map = HashMap::new();
        for (file, name, version, depends) in packages {
            fs::write(debs.join(file), b"").unwrap();
            map.insert(
                file.to_string(),
                (name.to_string(), version.to_string(), depends.map(str::to_string)),
            );
        }
        let calls = Rc::new(RefCell::new(Vec::new()));
        let extractor = FakeExtractor {
            packages: map,
            calls: Rc::clone(&calls),
        };
        let config = Config::with_base_dir(&dir.path().join("state"));
        let engine = Engine::with_extractor(config, Box::new(extractor)).unwrap();
        Fixture {
            _dir: dir,
            debs,
            engine,
            calls,
        }
    }

    #[test]
    fn test_install_commits_and_materializes() {
        let mut fx = fixture(&[("hello_1.0_all.deb", "hello", "1.0", None)]);
        let outcome = fx
            .engine
            .install(&fx.debs.join("hello_1.0_all.deb"), InstallOptions::default())
            .unwrap();

        match outcome {
            InstallOutcome::Installed(summary) => {
                assert_eq!(summary.name, "hello");
                assert_eq!(summary.files_installed, 1);
                assert_eq!(summary.file_errors, 0);
                assert!(summary.previous_version.is_none());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(fx.engine.installed().contains("hello"));
        assert!(fx.engine.db().exists("hello", "1.0"));
        assert!(fx.engine.config().install_root.join("usr/share/hello/marker").is_file());
        assert!(fx.engine.in_flight.is_empty());
        // Extraction directory is cleaned up
        assert!(!fx.engine.config().control_dir.join("hello_1.0_all.deb").exists());
    }

    #[test]
    fn test_fast_path_skips_extraction() {
        let mut fx = fixture(&[("hello_1.0_all.deb", "hello", "1.0", None)]);
        let archive = fx.debs.join("hello_1.0_all.deb");
        fx.engine.install(&archive, InstallOptions::default()).unwrap();
        let outcome = fx.engine.install(&archive, InstallOptions::default()).unwrap();

        assert!(matches!(outcome, InstallOutcome::AlreadyInstalled { .. }));
        assert_eq!(fx.calls.borrow().len(), 1);
    }

    #[test]
    fn test_other_version_requires_force() {
        let mut fx = fixture(&[
            ("hello_1.0_all.deb", "hello", "1.0", None),
            ("hello_2.0_all.deb", "hello", "2.0", None),
        ]);
        fx.engine
            .install(&fx.debs.join("hello_1.0_all.deb"), InstallOptions::default())
            .unwrap();

        let outcome = fx
            .engine
            .install(&fx.debs.join("hello_2.0_all.deb"), InstallOptions::default())
            .unwrap();
        assert_eq!(
            outcome,
            InstallOutcome::AlreadyInstalled {
                name: "hello".to_string(),
                installed_version: "1.0".to_string(),
                candidate_version: "2.0".to_string(),
            }
        );

        let outcome = fx
            .engine
            .install(&fx.debs.join("hello_2.0_all.deb"), InstallOptions { force: true })
            .unwrap();
        match outcome {
            InstallOutcome::Installed(summary) => {
                assert_eq!(summary.previous_version.as_deref(), Some("1.0"))
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(fx.engine.list().unwrap(), vec!["hello-2.0"]);
    }

    #[test]
    fn test_unsatisfied_lists_every_dependency() {
        let mut fx = fixture(&[(
            "app_1.0_all.deb",
            "app",
            "1.0",
            Some("libbar, libbaz (>= 2)"),
        )]);
        let err = fx
            .engine
            .install(&fx.debs.join("app_1.0_all.deb"), InstallOptions::default())
            .unwrap_err();

        match err {
            Error::UnsatisfiedDependencies(deps) => {
                assert_eq!(deps, vec!["libbar", "libbaz (>= 2)"])
            }
            other => panic!("unexpected error {}", other),
        }
        assert!(!fx.engine.installed().contains("app"));
        assert!(fx.engine.list().unwrap().is_empty());
        assert!(fx.engine.in_flight.is_empty());
    }

    #[test]
    fn test_force_installs_past_missing_dependencies() {
        let mut fx = fixture(&[("app_1.0_all.deb", "app", "1.0", Some("libbar"))]);
        let outcome = fx
            .engine
            .install(&fx.debs.join("app_1.0_all.deb"), InstallOptions { force: true })
            .unwrap();
        match outcome {
            InstallOutcome::Installed(summary) => {
                assert_eq!(summary.forced_dependencies, vec!["libbar"])
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_sibling_dependency_installed_first() {
        let mut fx = fixture(&[
            ("app_2.0_all.deb", "app", "2.0", Some("libfoo (>= 2.0)")),
            ("libfoo_1.0_all.deb", "libfoo", "1.0", None),
            ("libfoo_2.0_all.deb", "libfoo", "2.0", None),
        ]);
        let outcome = fx
            .engine
            .install(&fx.debs.join("app_2.0_all.deb"), InstallOptions::default())
            .unwrap();

        match outcome {
            InstallOutcome::Installed(summary) => {
                assert_eq!(summary.pulled_in.len(), 1);
                assert_eq!(summary.pulled_in[0].name(), "libfoo");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(fx.engine.installed().search("libfoo").unwrap().version, "2.0");
        assert_eq!(
            *fx.calls.borrow(),
            vec!["app_2.0_all.deb".to_string(), "libfoo_2.0_all.deb".to_string()]
        );
    }

    #[test]
    fn test_sibling_violating_constraint_does_not_satisfy() {
        let mut fx = fixture(&[
            ("app_2.0_all.deb", "app", "2.0", Some("libfoo (>= 3.0)")),
            ("libfoo_1.0_all.deb", "libfoo", "1.0", None),
        ]);
        let err = fx
            .engine
            .install(&fx.debs.join("app_2.0_all.deb"), InstallOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnsatisfiedDependencies(ref d) if d == &["libfoo (>= 3.0)"]));
        // The sibling itself was still installed
        assert!(fx.engine.installed().contains("libfoo"));
    }

    #[test]
    fn test_force_refresh_keeps_satisfying_dependency() {
        let mut fx = fixture(&[
            ("app_1.0_all.deb", "app", "1.0", Some("libfoo (>= 2.0)")),
            ("libfoo_1.0_all.deb", "libfoo", "1.0", None),
            ("libfoo_2.0_all.deb", "libfoo", "2.0", None),
        ]);
        let installed_from_elsewhere = fx.debs.join("libfoo_2.0_all.deb");
        fx.engine
            .install(&installed_from_elsewhere, InstallOptions::default())
            .unwrap();
        // Only the too-old archive sits next to app now
        fs::remove_file(&installed_from_elsewhere).unwrap();

        let outcome = fx
            .engine
            .install(&fx.debs.join("app_1.0_all.deb"), InstallOptions { force: true })
            .unwrap();
        match outcome {
            InstallOutcome::Installed(summary) => {
                assert!(summary.pulled_in.is_empty());
                assert!(summary.forced_dependencies.is_empty());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(fx.engine.installed().search("libfoo").unwrap().version, "2.0");
        assert!(!fx.calls.borrow().contains(&"libfoo_1.0_all.deb".to_string()));
    }

    #[test]
    fn test_commit_failure_skips_file_install() {
        let mut fx = fixture(&[("app_1.0_all.deb", "app", "1.0", None)]);
        // A plain file where the package directory belongs
        fs::write(fx.engine.config().runepkg_db.join("app-1.0"), b"").unwrap();

        let err = fx
            .engine
            .install(&fx.debs.join("app_1.0_all.deb"), InstallOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::CommitError(_)), "unexpected error {}", err);
        assert!(!fx.engine.config().install_root.join("usr/share/app/marker").exists());
        assert!(!fx.engine.db().exists("app", "1.0"));
        assert!(fx.engine.in_flight.is_empty());
    }

    #[test]
    fn test_self_dependency_terminates() {
        let mut fx = fixture(&[("loop_1.0_all.deb", "loop", "1.0", Some("loop"))]);
        let outcome = fx
            .engine
            .install(&fx.debs.join("loop_1.0_all.deb"), InstallOptions::default())
            .unwrap();
        assert!(matches!(outcome, InstallOutcome::Installed(_)));
        assert_eq!(fx.calls.borrow().len(), 1);
    }

    #[test]
    fn test_mutual_dependency_terminates() {
        let mut fx = fixture(&[
            ("a_1.0_all.deb", "a", "1.0", Some("b")),
            ("b_1.0_all.deb", "b", "1.0", Some("a")),
        ]);
        fx.engine
            .install(&fx.debs.join("a_1.0_all.deb"), InstallOptions::default())
            .unwrap();
        assert!(fx.engine.installed().contains("a"));
        assert!(fx.engine.installed().contains("b"));
    }

    #[test]
    fn test_recursion_limit() {
        let mut fx = fixture(&[
            ("a_1_all.deb", "a", "1", Some("b")),
            ("b_1_all.deb", "b", "1", Some("c")),
            ("c_1_all.deb", "c", "1", None),
        ]);
        fx.engine.config.install.max_depth = 1;
        let err = fx
            .engine
            .install(&fx.debs.join("a_1_all.deb"), InstallOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::RecursionLimit(1)));
        assert!(fx.engine.in_flight.is_empty());
        assert!(!fx.engine.installed().contains("c"));
    }

    #[test]
    fn test_force_reinstall_keeps_single_entry() {
        let mut fx = fixture(&[("pkg_1.0_all.deb", "pkg", "1.0", None)]);
        let archive = fx.debs.join("pkg_1.0_all.deb");
        fx.engine.install(&archive, InstallOptions::default()).unwrap();
        let outcome = fx.engine.install(&archive, InstallOptions { force: true }).unwrap();

        match outcome {
            InstallOutcome::Installed(summary) => {
                assert_eq!(summary.previous_version.as_deref(), Some("1.0"))
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(fx.engine.list().unwrap(), vec!["pkg-1.0"]);
        assert_eq!(fx.engine.installed().len(), 1);
    }

    #[test]
    fn test_remove_and_reopen() {
        let mut fx = fixture(&[
            ("hello_1.0_all.deb", "hello", "1.0", None),
            ("world_1.0_all.deb", "world", "1.0", None),
        ]);
        fx.engine
            .install(&fx.debs.join("hello_1.0_all.deb"), InstallOptions::default())
            .unwrap();
        fx.engine
            .install(&fx.debs.join("world_1.0_all.deb"), InstallOptions::default())
            .unwrap();

        let outcome = fx.engine.remove("hello").unwrap();
        assert_eq!(outcome.identifier, "hello-1.0");
        assert_eq!(outcome.files.removed, 1);
        assert!(!fx.engine.installed().contains("hello"));
        assert!(!fx.engine.config().install_root.join("usr/share/hello/marker").exists());

        let err = fx.engine.remove("hello").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));

        // A fresh engine sees what is on disk
        let config = fx.engine.config().clone();
        let reopened = Engine::with_extractor(
            config,
            Box::new(FakeExtractor {
                packages: HashMap::new(),
                calls: Rc::clone(&fx.calls),
            }),
        )
        .unwrap();
        assert_eq!(reopened.installed().names(), vec!["world"]);
        assert_eq!(reopened.status("world").unwrap().files, vec!["usr/share/world/marker"]);
    }

    #[test]
    fn test_search_suggests_when_empty() {
        let mut fx = fixture(&[("hello_1.0_all.deb", "hello", "1.0", None)]);
        fx.engine
            .install(&fx.debs.join("hello_1.0_all.deb"), InstallOptions::default())
            .unwrap();

        assert_eq!(fx.engine.search("ell").matches.len(), 1);
        let result = fx.engine.search("helo");
        assert!(result.matches.is_empty());
        assert_eq!(result.suggestions, vec!["hello"]);
    }
}
