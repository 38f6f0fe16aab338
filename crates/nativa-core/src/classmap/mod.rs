//! Generated Java class stubs.
//!
//! The native metadata generator writes one class map per compiled source.
//! This module merges them into a [`ClassModel`], folds in hand-written
//! extension files and emits one Java source per class.
//!
//! ```text
//! *.map ──► ClassMapParser ──► ClassModel ──► merge_extensions ──► Emitter ──► <Class>.java
//! ```

mod emitter;
mod extensions;
mod model;
mod parser;

use std::fmt;
use std::path::PathBuf;

pub use emitter::{EmitReport, Emitter, OBJECT_CLASS};
pub use extensions::{camel_case, extension_files, merge_extensions};
pub use model::{ClassModel, JavaClass, SENTINEL_SUPERCLASS, native_signature};
pub use parser::{ClassHeader, ClassMapParser, MAP_EXTENSION, find_map_files, parse_header};

/// A recoverable condition noticed while building stubs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A class map line matched neither a header nor a member.
    IgnoredLine {
        origin: PathBuf,
        line: usize,
        text: String,
    },

    /// A class was not emitted because its superclass is unknown.
    SkippedClass { class: String, superclass: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IgnoredLine { origin, line, text } => {
                write!(f, "ignoring line {}:{}: {}", origin.display(), line, text)
            }
            Self::SkippedClass { class, superclass } => {
                write!(f, "skipping class `{class}': super class `{superclass}' does not exist")
            }
        }
    }
}
