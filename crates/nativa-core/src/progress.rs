//! Build progress reporting.

use std::path::Path;

use crate::compile::BuildJob;

/// Receives build progress events.
///
/// Methods are called from worker threads, in no particular order across
/// jobs. All have empty defaults.
pub trait BuildCallback: Send + Sync {
    /// A job is about to be compiled.
    fn on_compile(&self, _job: &BuildJob) {}

    /// A generated file or library is being (re)created.
    fn on_create(&self, _path: &Path) {}

    /// A payload library is being linked.
    fn on_link(&self, _library: &Path) {}
}
