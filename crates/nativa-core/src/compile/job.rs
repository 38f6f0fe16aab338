//! Compilation jobs.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::arch::{Arch, ArchitectureSet};
use crate::error::Result;
use crate::paths::BuildDirs;

/// Prefix of every generated init symbol.
pub const SYMBOL_PREFIX: &str = "MREP_";

/// One (source file, architecture) compilation unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildJob {
    /// Source file to compile.
    pub source: PathBuf,

    /// Final object file.
    pub object: PathBuf,

    /// Target architecture.
    pub arch: Arch,

    /// Init symbol the compiled scope is exported under.
    pub symbol: String,
}

impl BuildJob {
    /// Create a job with an explicit object path; the symbol is derived from it.
    pub fn new(source: impl Into<PathBuf>, object: impl Into<PathBuf>, arch: Arch) -> Self {
        let object = object.into();
        let symbol = symbol_for_object(&object);
        Self {
            source: source.into(),
            object,
            arch,
            symbol,
        }
    }

    /// Create a job whose object lives in the build layout.
    pub fn for_source(dirs: &BuildDirs, project_dir: &Path, source: &Path, arch: &Arch) -> Result<Self> {
        let object = dirs.object_path(source, project_dir, arch)?;
        Ok(Self::new(source, object, arch.clone()))
    }

    /// Intermediate file the compiler session emits (`<object>.s`).
    pub fn intermediate(&self) -> PathBuf {
        let mut path = OsString::from(self.object.as_os_str());
        path.push(".s");
        PathBuf::from(path)
    }
}

/// Derive the init symbol for an object path.
///
/// The symbol hashes the absolute object path, so it is identical across
/// runs and relinking never needs renaming.
pub fn symbol_for_object(object: &Path) -> String {
    let absolute = std::path::absolute(object).unwrap_or_else(|_| object.to_path_buf());
    let digest = blake3::hash(absolute.as_os_str().as_encoded_bytes());
    format!("{SYMBOL_PREFIX}{}", digest.to_hex())
}

/// Build the job list for every (file, arch) pair, files in the given order.
pub fn jobs_for(
    dirs: &BuildDirs,
    project_dir: &Path,
    files: &[PathBuf],
    archs: &ArchitectureSet,
) -> Result<Vec<BuildJob>> {
    let mut jobs = Vec::with_capacity(files.len() * archs.len());
    for arch in archs {
        for file in files {
            jobs.push(BuildJob::for_source(dirs, project_dir, file, arch)?);
        }
    }
    Ok(jobs)
}
