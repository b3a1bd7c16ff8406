// src/index.rs

//! In-memory package index
//!
//! Open hashing keyed by package name: FNV-1a, a prime number of buckets,
//! growth past a 0.75 load factor and shrinking below 0.25. Records are
//! copied in on [`PackageIndex::add`], so the index never shares data with
//! the caller.

use crate::error::Result;
use crate::limits::{self, LimitError, MAX_PATH_LEN, MAX_STRING_LEN};
use crate::packages::PackageRecord;
use tracing::{debug, warn};

/// Bucket count used by [`PackageIndex::new`] before rounding to a prime
pub const DEFAULT_CAPACITY: usize = 16;

/// Lower bound on the bucket count before rounding to a prime
pub const MIN_BUCKETS: usize = 8;

const GROW_LOAD_FACTOR: f64 = 0.75;
const SHRINK_LOAD_FACTOR: f64 = 0.25;

/// 32-bit FNV-1a over the bytes of `key`
pub fn fnv1a(key: &str) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for byte in key.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}

fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true;
    }
    if n % 2 == 0 {
        return false;
    }
    let mut i = 3;
    while i * i <= n {
        if n % i == 0 {
            return false;
        }
        i += 2;
    }
    true
}

/// Smallest prime `>= n`
pub fn next_prime(n: usize) -> usize {
    let mut candidate = n.max(2);
    while !is_prime(candidate) {
        candidate += 1;
    }
    candidate
}

/// Hash table of package records keyed by name
#[derive(Debug)]
pub struct PackageIndex {
    buckets: Vec<Vec<PackageRecord>>,
    count: usize,
}

impl PackageIndex {
    pub fn new() -> Result<Self> {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an index with at least `capacity` buckets, rounded up to a prime
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let size = next_prime(capacity.max(MIN_BUCKETS));
        Ok(Self {
            buckets: Self::alloc_buckets(size)?,
            count: 0,
        })
    }

    fn alloc_buckets(size: usize) -> Result<Vec<Vec<PackageRecord>>> {
        let mut buckets = limits::alloc_array::<Vec<PackageRecord>>(size)?;
        buckets.resize_with(size, Vec::new);
        Ok(buckets)
    }

    fn bucket_of(&self, name: &str) -> usize {
        fnv1a(name) as usize % self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn load_factor(&self) -> f64 {
        self.count as f64 / self.buckets.len() as f64
    }

    pub fn search(&self, name: &str) -> Option<&PackageRecord> {
        self.buckets[self.bucket_of(name)]
            .iter()
            .find(|record| record.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.search(name).is_some()
    }

    /// Insert a copy of `record`, replacing any record with the same name
    ///
    /// Replacement happens in place regardless of version. The manifest is
    /// re-validated against the file count ceiling. On error the index is
    /// unchanged.
    pub fn add(&mut self, record: &PackageRecord) -> Result<()> {
        if record.name.is_empty() {
            return Err(LimitError::NullPointer("package name").into());
        }
        limits::validate_string(&record.name, MAX_STRING_LEN, "package name")?;
        limits::validate_string(&record.version, MAX_STRING_LEN, "package version")?;
        limits::validate_file_count(record.files.len() as i64)?;
        for path in &record.files {
            limits::validate_string(path, MAX_PATH_LEN, "manifest entry")?;
        }

        let bucket = self.bucket_of(&record.name);
        if let Some(existing) = self.buckets[bucket]
            .iter_mut()
            .find(|existing| existing.name == record.name)
        {
            debug!("Replacing {} {} with {}", existing.name, existing.version, record.version);
            *existing = record.clone();
            return Ok(());
        }

        if (self.count + 1) as f64 / self.buckets.len() as f64 > GROW_LOAD_FACTOR {
            self.resize(next_prime(self.buckets.len() * 2))?;
        }

        let bucket = self.bucket_of(&record.name);
        self.buckets[bucket].push(record.clone());
        self.count += 1;
        Ok(())
    }

    /// Remove and return the record for `name`, if any
    pub fn remove(&mut self, name: &str) -> Option<PackageRecord> {
        let bucket = self.bucket_of(name);
        let pos = self.buckets[bucket].iter().position(|r| r.name == name)?;
        let removed = self.buckets[bucket].remove(pos);
        self.count -= 1;

        if self.load_factor() < SHRINK_LOAD_FACTOR {
            let target = next_prime((self.buckets.len() / 2).max(MIN_BUCKETS));
            if target < self.buckets.len() {
                if let Err(e) = self.resize(target) {
                    warn!("Failed to shrink package index: {}", e);
                }
            }
        }

        Some(removed)
    }

    /// Rehash every record into `new_size` buckets
    fn resize(&mut self, new_size: usize) -> Result<()> {
        let mut buckets = Self::alloc_buckets(new_size)?;
        for record in self.buckets.drain(..).flatten() {
            let bucket = fnv1a(&record.name) as usize % new_size;
            buckets[bucket].push(record);
        }
        debug!("Resized package index to {} buckets", new_size);
        self.buckets = buckets;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackageRecord> {
        self.buckets.iter().flatten()
    }

    /// Installed package names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.iter().map(|r| r.name.clone()).collect();
        names.sort();
        names
    }
}
