//! Core engine for nativa incremental multi-architecture native builds.
//!
//! This crate provides:
//! - Timestamp-based staleness checks
//! - Persistent compiler sessions driven over a line protocol
//! - A parallel scheduler with a bounded number of worker slots
//! - Per-architecture payload library linking
//! - Class map parsing and Java stub generation

pub mod arch;
pub mod build;
pub mod classmap;
pub mod compile;
pub mod config;
pub mod error;
pub mod link;
pub mod paths;
pub mod progress;
pub mod staleness;

pub use arch::{Arch, ArchitectureSet};
pub use build::{Backends, BuildRun, BuildSummary, clean, generate_stubs};
pub use classmap::{ClassMapParser, ClassModel, Diagnostic, EmitReport, Emitter, JavaClass};
pub use compile::{
    Assembler, BuildJob, BuildOutcome, CompiledObject, CompilerSession, DependencyResolver,
    GraphResolver, Scheduler, SessionFactory, SessionKey, SessionPool,
};
pub use config::{BuildConfig, BuildMode, CONFIG_FILE_NAME};
pub use error::{Error, Result};
pub use link::{LinkReport, Linker, PayloadLinker};
pub use paths::BuildDirs;
pub use progress::BuildCallback;
pub use staleness::{is_stale, write_if_changed};
