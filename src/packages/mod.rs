// src/packages/mod.rs

//! Package archive support for runepkg
//!
//! Extraction turns an archive into a [`PackageRecord`] plus unpacked
//! `control/` and `data/` trees. The engine only sees the [`Extractor`]
//! trait; [`DebExtractor`] is the implementation used in production.

pub mod deb;
pub mod record;
pub mod traits;

pub use deb::DebExtractor;
pub use record::PackageRecord;
pub use traits::Extractor;
