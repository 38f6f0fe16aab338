//! Timestamp-based staleness checks.
//!
//! The same predicate is used at every granularity: one object against its
//! source, one payload library against its objects, one archive against its
//! libraries. Nothing is cached; every check reads filesystem metadata.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use crate::error::Result;

fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Returns true if `output` must be regenerated.
///
/// `output` is stale when it does not exist or when any dependency was
/// modified strictly after it. Dependencies that cannot be read are ignored.
pub fn is_stale<P: AsRef<Path>>(output: &Path, deps: &[P]) -> bool {
    let Some(output_mtime) = mtime(output) else {
        return true;
    };

    deps.iter()
        .filter_map(|dep| mtime(dep.as_ref()))
        .any(|dep_mtime| dep_mtime > output_mtime)
}

/// Write `contents` to `path` only if the file is missing or differs.
///
/// Leaving identical files untouched keeps their mtime, so whatever depends
/// on them downstream stays fresh. Returns true if the file was written.
pub fn write_if_changed(path: &Path, contents: &str) -> Result<bool> {
    if let Ok(existing) = fs::read(path)
        && existing == contents.as_bytes()
    {
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(true)
}

/// Set a path's modification time to now.
pub fn touch(path: &Path) -> Result<()> {
    let file = fs::File::open(path)?;
    file.set_modified(SystemTime::now())?;
    Ok(())
}
