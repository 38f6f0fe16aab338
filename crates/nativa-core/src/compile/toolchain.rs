//! Tool discovery.
//!
//! Each tool is taken from the configuration when given, otherwise looked up
//! on PATH under its default name.

use std::path::{Path, PathBuf};

use crate::config::ToolchainConfig;
use crate::error::{Error, Result};

/// Default name of the interactive source compiler.
pub const DEFAULT_COMPILER: &str = "nativa-compiler";

/// Default C compiler driver.
pub const DEFAULT_CC: &str = "clang";

/// Default C++ compiler driver.
pub const DEFAULT_CXX: &str = "clang++";

/// Resolved tool locations for a build.
#[derive(Debug, Clone)]
pub struct Toolchain {
    /// Interactive source compiler.
    pub compiler: PathBuf,

    /// C compiler (assembler step, payload entry).
    pub cc: PathBuf,

    /// C++ driver (payload link).
    pub cxx: PathBuf,
}

impl Toolchain {
    /// Resolve every tool, failing on the first one that cannot be found.
    pub fn resolve(config: &ToolchainConfig) -> Result<Self> {
        let toolchain = Self {
            compiler: find_tool(config.compiler.as_deref(), DEFAULT_COMPILER)?,
            cc: find_tool(config.cc.as_deref(), DEFAULT_CC)?,
            cxx: find_tool(config.cxx.as_deref(), DEFAULT_CXX)?,
        };
        tracing::debug!(
            "Using compiler {}, cc {}, cxx {}",
            toolchain.compiler.display(),
            toolchain.cc.display(),
            toolchain.cxx.display()
        );
        Ok(toolchain)
    }
}

/// Find a tool: an explicit path must exist, otherwise search PATH.
pub fn find_tool(explicit: Option<&Path>, default_name: &str) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.components().count() == 1 {
            // A bare name: look it up like the default.
            return which::which(path)
                .map_err(|_| Error::Toolchain(format!("`{}' not found in PATH", path.display())));
        }
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(Error::Toolchain(format!(
            "`{}' does not exist",
            path.display()
        )));
    }

    which::which(default_name)
        .map_err(|_| Error::Toolchain(format!("`{default_name}' not found in PATH")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_explicit_path_must_exist() {
        let temp = TempDir::new().unwrap();
        let tool = temp.path().join("compiler");
        std::fs::write(&tool, "").unwrap();

        assert_eq!(find_tool(Some(&tool), "unused").unwrap(), tool);

        let missing = temp.path().join("missing");
        assert!(matches!(
            find_tool(Some(&missing), "unused"),
            Err(Error::Toolchain(_))
        ));
    }

    #[test]
    fn test_unknown_default_name() {
        let err = find_tool(None, "nativa-no-such-tool-xyz").unwrap_err();
        assert!(err.to_string().contains("nativa-no-such-tool-xyz"));
    }

    #[cfg(unix)]
    #[test]
    fn test_bare_name_searches_path() {
        let found = find_tool(Some(Path::new("sh")), "unused").unwrap();
        assert!(found.is_absolute());
    }
}
