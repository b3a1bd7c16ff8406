// src/version.rs

//! Version comparison and constraints
//!
//! Versions are compared component by component: runs of digits compare
//! numerically, runs of letters compare as strings, and any other character
//! only separates components. When one version runs out of components first
//! it sorts lower. This is deliberately simpler than dpkg's algorithm: epochs
//! and `~` get no special treatment.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, PartialEq, Eq)]
enum Component<'a> {
    Numeric(&'a str),
    Alpha(&'a str),
}

fn components(version: &str) -> Vec<Component<'_>> {
    let mut out = Vec::new();
    let bytes = version.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        if bytes[i].is_ascii_digit() {
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            out.push(Component::Numeric(&version[start..i]));
        } else if bytes[i].is_ascii_alphabetic() {
            while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
                i += 1;
            }
            out.push(Component::Alpha(&version[start..i]));
        } else {
            i += 1;
        }
    }
    out
}

/// Compare digit strings of any length without overflowing
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = components(a);
    let right = components(b);

    for (l, r) in left.iter().zip(right.iter()) {
        let ord = match (l, r) {
            (Component::Numeric(l), Component::Numeric(r)) => compare_numeric(l, r),
            (Component::Numeric(l), Component::Alpha(r))
            | (Component::Alpha(l), Component::Numeric(r))
            | (Component::Alpha(l), Component::Alpha(r)) => l.cmp(r),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    left.len().cmp(&right.len())
}

/// Relational operator in a dependency constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Ge,
    Le,
    Eq,
    Gt,
    Lt,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Ge => ">=",
            Op::Le => "<=",
            Op::Eq => "=",
            Op::Gt => ">",
            Op::Lt => "<",
        }
    }

    fn matches(&self, ord: Ordering) -> bool {
        match self {
            Op::Ge => ord != Ordering::Less,
            Op::Le => ord != Ordering::Greater,
            Op::Eq => ord == Ordering::Equal,
            Op::Gt => ord == Ordering::Greater,
            Op::Lt => ord == Ordering::Less,
        }
    }
}

impl FromStr for Op {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">=" => Ok(Op::Ge),
            "<=" => Ok(Op::Le),
            "=" | "==" => Ok(Op::Eq),
            ">" | ">>" => Ok(Op::Gt),
            "<" | "<<" => Ok(Op::Lt),
            _ => Err(()),
        }
    }
}

/// `<op> <version>`, e.g. `>= 1.2.0`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub op: Op,
    pub version: String,
}

impl Constraint {
    /// Parse the text inside a dependency's parentheses
    ///
    /// Returns `None` for anything that is not an operator followed by a
    /// non-empty version.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let op_len = text
            .find(|c: char| !matches!(c, '<' | '>' | '='))
            .unwrap_or(text.len());
        let op = text[..op_len].parse().ok()?;
        let version = text[op_len..].trim();
        if version.is_empty() || version.contains(char::is_whitespace) {
            return None;
        }
        Some(Self {
            op,
            version: version.to_string(),
        })
    }

    pub fn satisfied_by(&self, installed: &str) -> bool {
        self.op.matches(compare_versions(installed, &self.version))
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op.as_str(), self.version)
    }
}
