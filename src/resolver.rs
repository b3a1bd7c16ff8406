// src/resolver.rs

//! Dependency parsing and satisfaction checks
//!
//! Only direct dependencies are considered. A `Depends` value is split on
//! commas, the first `|` alternative is taken, and an optional
//! parenthesized constraint is parsed with [`Constraint::parse`].
//! Constraints that cannot be parsed are treated as satisfied.

use crate::index::PackageIndex;
use crate::version::Constraint;
use std::fmt;
use tracing::{debug, warn};

/// Version requirement attached to a dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Any installed version will do
    Any,
    Version(Constraint),
    /// Constraint text that could not be parsed
    Unknown(String),
}

impl Requirement {
    /// Whether `version` meets this requirement; unparsed constraints accept
    /// everything
    pub fn allows(&self, version: &str) -> bool {
        match self {
            Requirement::Version(constraint) => constraint.satisfied_by(version),
            Requirement::Any | Requirement::Unknown(_) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub requirement: Requirement,
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.requirement {
            Requirement::Any => write!(f, "{}", self.name),
            Requirement::Version(c) => write!(f, "{} ({})", self.name, c),
            Requirement::Unknown(raw) => write!(f, "{} ({})", self.name, raw),
        }
    }
}

/// Result of checking one dependency against the indexes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Satisfaction {
    /// Present with an acceptable version
    Satisfied { version: String, in_flight: bool },
    /// Present, but the version violates the constraint
    Violated { installed: String },
    Missing,
}

impl Satisfaction {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Satisfaction::Satisfied { .. })
    }
}

/// Parse a comma-separated `Depends` value
pub fn parse_dependencies(depends: &str) -> Vec<Dependency> {
    depends
        .split(',')
        .map(str::trim)
        .filter(|dep| !dep.is_empty())
        .filter_map(parse_single_dependency)
        .collect()
}

/// Parse one dependency, e.g. `libc6:amd64 (>= 2.34) | libc6-compat`
pub fn parse_single_dependency(dep: &str) -> Option<Dependency> {
    // Handle alternatives (foo | bar)
    let dep = dep.split('|').next().unwrap_or(dep).trim();

    let (name, requirement) = match (dep.find('('), dep.rfind(')')) {
        (Some(start), Some(end)) if end > start => {
            let text = dep[start + 1..end].trim();
            let requirement = match Constraint::parse(text) {
                Some(constraint) => Requirement::Version(constraint),
                None => Requirement::Unknown(text.to_string()),
            };
            (dep[..start].trim(), requirement)
        }
        _ => (dep, Requirement::Any),
    };

    // Strip architecture qualifiers (libc6:amd64)
    let name = name.split(':').next().unwrap_or(name).trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        warn!("Ignoring malformed dependency '{}'", dep);
        return None;
    }

    Some(Dependency {
        name: name.to_string(),
        requirement,
    })
}

/// Check `dep` against the installed set first, then the in-flight set
pub fn check(dep: &Dependency, installed: &PackageIndex, in_flight: &PackageIndex) -> Satisfaction {
    let (record, is_in_flight) = match installed.search(&dep.name) {
        Some(record) => (record, false),
        None => match in_flight.search(&dep.name) {
            Some(record) => (record, true),
            None => return Satisfaction::Missing,
        },
    };

    let satisfied = match &dep.requirement {
        Requirement::Any => true,
        Requirement::Version(constraint) => constraint.satisfied_by(&record.version),
        Requirement::Unknown(raw) => {
            warn!(
                "Unknown version constraint '{}' for {}, treating as satisfied",
                raw, dep.name
            );
            true
        }
    };

    if satisfied {
        debug!(
            "Dependency '{}' satisfied by {} version {}",
            dep,
            if is_in_flight { "in-flight" } else { "installed" },
            record.version
        );
        Satisfaction::Satisfied {
            version: record.version.clone(),
            in_flight: is_in_flight,
        }
    } else {
        Satisfaction::Violated {
            installed: record.version.clone(),
        }
    }
}
