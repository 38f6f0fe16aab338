//! Progress and summary printing.

use std::path::Path;

use nativa_core::{BuildCallback, BuildJob, Diagnostic};

use crate::colors;

/// Print one action line (`   Compile app/main.rb (armv7)`).
pub fn action(verb: &str, subject: &str) {
    println!("{}{:>10}{} {}", colors::GREEN, verb, colors::RESET, subject);
}

/// Print collected diagnostics as warnings.
pub fn diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        eprintln!("{}warning:{} {}", colors::YELLOW, colors::RESET, diagnostic);
    }
}

/// Prints build progress relative to the project directory.
pub struct ProgressPrinter {
    project_dir: std::path::PathBuf,
}

impl ProgressPrinter {
    pub fn new(project_dir: &Path) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
        }
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.project_dir)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

impl BuildCallback for ProgressPrinter {
    fn on_compile(&self, job: &BuildJob) {
        action("Compile", &format!("{} ({})", self.relative(&job.source), job.arch));
    }

    fn on_create(&self, path: &Path) {
        action("Create", &self.relative(path));
    }

    fn on_link(&self, library: &Path) {
        action("Link", &self.relative(library));
    }
}
