//! Error types for nativa-core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for nativa-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in nativa-core.
#[derive(Debug, Error)]
pub enum Error {
    /// A compilation job failed (session failure, malformed ack, assembler error).
    #[error("compilation failed for {} ({arch}): {message}", source_file.display())]
    Compilation {
        source_file: PathBuf,
        arch: String,
        message: String,
    },

    /// Communication with a compiler session failed outside of a specific job.
    #[error("compiler session error: {0}")]
    Session(String),

    /// Job skipped because another job already failed in this run.
    #[error("build aborted")]
    Aborted,

    /// A class was declared twice with different concrete superclasses.
    #[error(
        "class `{class}' already defined with a different super class (`{existing}', now `{conflicting}') in {}",
        origin.display()
    )]
    SuperclassConflict {
        class: String,
        existing: String,
        conflicting: String,
        origin: PathBuf,
    },

    /// A method line appeared before any class header.
    #[error("method declaration outside class definition at {}:{line}", origin.display())]
    MethodOutsideClass { origin: PathBuf, line: usize },

    /// An extension file targets a class the metadata generator never reported.
    #[error(
        "extension file {} extends class `{class}' that was not discovered by the compiler",
        path.display()
    )]
    OrphanExtension { path: PathBuf, class: String },

    /// Cyclic dependency between source files.
    #[error("cyclic dependency detected: {0}")]
    CyclicDependency(String),

    /// Linking the payload library failed.
    #[error("link failed for {arch}: {message}")]
    Link { arch: String, message: String },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required tool could not be located or run.
    #[error("toolchain error: {0}")]
    Toolchain(String),

    /// Configuration file could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a compilation error for a job.
    pub fn compilation(
        source_file: impl Into<PathBuf>,
        arch: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Compilation {
            source_file: source_file.into(),
            arch: arch.into(),
            message: message.into(),
        }
    }

    /// Render the error with a recovery hint for terminal output.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Self::Compilation { .. } => {
                Some("fix the reported source error and run the build again")
            }
            Self::Session(_) => Some("check that the configured compiler runs standalone"),
            Self::SuperclassConflict { .. } => {
                Some("a class may only be reopened with the same super class")
            }
            Self::OrphanExtension { .. } => Some(
                "rename the extension file after a class defined in your sources, or remove it",
            ),
            Self::CyclicDependency(_) => Some("remove one of the declared file dependencies"),
            Self::Toolchain(_) => {
                Some("set the tool path in nativa.json or make sure it is on PATH")
            }
            Self::Config(_) | Self::Json(_) => Some("see nativa.json"),
            _ => None,
        };

        match hint {
            Some(hint) => format!("{self}\n  hint: {hint}"),
            None => self.to_string(),
        }
    }
}
