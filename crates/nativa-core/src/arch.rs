//! Target architectures.
//!
//! Every per-architecture artifact (objects, compiler sessions, payload
//! library) is keyed by [`Arch`]. The class model is shared by all of them.

use std::fmt;

use serde::Deserialize;

use crate::error::{Error, Result};

/// A target architecture identifier (e.g. `armv7`, `arm64-v8a`, `x86`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct Arch(String);

impl Arch {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the ABI directory used for objects and libraries.
    pub fn abi_directory_name(&self) -> Result<&'static str> {
        match self.0.as_str() {
            "armv5te" => Ok("armeabi"),
            "armv7" => Ok("armeabi-v7a"),
            "arm64-v8a" => Ok("arm64-v8a"),
            "x86" => Ok("x86"),
            "x86_64" => Ok("x86_64"),
            other => Err(Error::Config(format!("invalid arch `{other}'"))),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Arch {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Ordered, duplicate-free set of target architectures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchitectureSet {
    archs: Vec<Arch>,
}

impl ArchitectureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an architecture, keeping first-seen order. Returns false if already present.
    pub fn insert(&mut self, arch: Arch) -> bool {
        if self.archs.contains(&arch) {
            return false;
        }
        self.archs.push(arch);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arch> {
        self.archs.iter()
    }

    /// The first architecture; its object directory holds the class map files.
    pub fn primary(&self) -> Option<&Arch> {
        self.archs.first()
    }

    pub fn len(&self) -> usize {
        self.archs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archs.is_empty()
    }

    /// Check that every architecture maps to a known ABI.
    pub fn validate(&self) -> Result<()> {
        if self.archs.is_empty() {
            return Err(Error::Config("at least one arch is required".to_string()));
        }
        for arch in &self.archs {
            arch.abi_directory_name()?;
        }
        Ok(())
    }
}

impl<A: Into<Arch>> FromIterator<A> for ArchitectureSet {
    fn from_iter<I: IntoIterator<Item = A>>(iter: I) -> Self {
        let mut set = Self::new();
        for arch in iter {
            set.insert(arch.into());
        }
        set
    }
}

impl<'a> IntoIterator for &'a ArchitectureSet {
    type Item = &'a Arch;
    type IntoIter = std::slice::Iter<'a, Arch>;

    fn into_iter(self) -> Self::IntoIter {
        self.archs.iter()
    }
}
