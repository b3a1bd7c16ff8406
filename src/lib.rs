// src/lib.rs

//! runepkg Package Manager
//!
//! Minimal Debian-style package manager: unpacks `.deb` archives, checks
//! direct dependencies, records installed packages, and copies payloads
//! onto a target root.
//!
//! # Architecture
//!
//! - Two in-memory indexes: what is installed, and what is being installed
//!   right now (for cycle detection)
//! - On-disk database: one directory per package with binary metadata and
//!   a manifest
//! - Transactions: extract, check dependencies, commit, materialize files
//! - File copies fan out over a bounded worker pool

pub mod config;
pub mod db;
mod error;
pub mod filesystem;
pub mod index;
pub mod limits;
pub mod packages;
pub mod resolver;
pub mod transaction;
pub mod version;

pub use config::Config;
pub use error::{Error, Result};
pub use index::PackageIndex;
pub use packages::PackageRecord;
pub use transaction::{Engine, InstallOptions, InstallOutcome, RemoveOutcome};
