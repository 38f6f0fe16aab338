//! Compilation pipeline.
//!
//! This module provides:
//! - Source ordering (dependency pairs → build order)
//! - Job creation (source × arch → object path and init symbol)
//! - Persistent compiler sessions and their line protocol
//! - Second-stage assembly (intermediate → object)
//! - The parallel scheduler tying them together
//!
//! # Architecture
//!
//! ```text
//! files ──► DependencyResolver ──► jobs_for ──► Scheduler
//!                                                  │
//!                                 stale? ──────────┤
//!                                                  ├── SessionPool[(slot, arch)] ──► <object>.s
//!                                                  └── Assembler ──► <object>
//! ```

mod assembler;
mod job;
mod protocol;
mod resolver;
mod scheduler;
mod session;
mod toolchain;

#[cfg(test)]
pub(crate) mod testing;

pub use assembler::{Assembler, CcAssembler};
pub use job::{BuildJob, SYMBOL_PREFIX, jobs_for, symbol_for_object};
pub use protocol::{
    AckError, CompileRequest, QUIT_DIRECTIVE, read_ack, read_request, write_quit, write_request,
};
pub use resolver::{DependencyResolver, GraphResolver};
pub use scheduler::{BuildOutcome, CompiledObject, Scheduler};
pub use session::{
    CompilerSession, PoolStats, ProcessSession, ProcessSessionFactory, SessionFactory, SessionKey,
    SessionLease, SessionPool,
};
pub use toolchain::{DEFAULT_CC, DEFAULT_COMPILER, DEFAULT_CXX, Toolchain, find_tool};
