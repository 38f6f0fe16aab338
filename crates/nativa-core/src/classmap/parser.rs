//! Class map parser.
//!
//! A class map lists the Java classes one compiled source needs:
//!
//! ```text
//! MainActivity : android.app.Activity <>
//! 	public native void onCreate(android.os.Bundle arg0);
//! Helper : $blank$ <java.lang.Runnable, java.io.Serializable>
//! 	public Helper() { super(); }
//! ```
//!
//! A header line opens a class; following tab-indented lines are its
//! members. Several map files merge into one [`ClassModel`].

use std::fs;
use std::path::{Path, PathBuf};

use super::Diagnostic;
use super::model::ClassModel;
use crate::error::{Error, Result};

/// File extension of class map files.
pub const MAP_EXTENSION: &str = "map";

/// A parsed header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHeader<'a> {
    pub name: &'a str,
    pub superclass: &'a str,
    pub interfaces: Vec<String>,
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && !s.contains(char::is_whitespace)
}

/// Parse `NAME : SUPER <IFACE, …>`.
///
/// NAME and SUPER are whitespace-free; whitespace around `:` and before `<`
/// is optional. The line must end with `>`.
pub fn parse_header(line: &str) -> Option<ClassHeader<'_>> {
    let body = line.strip_suffix('>')?;
    let open = body.rfind('<')?;
    let interfaces = &body[open + 1..];
    if interfaces.contains('>') {
        return None;
    }

    let head = body[..open].trim_end();
    // Prefer the rightmost separator that leaves a valid name on both sides.
    let (name, superclass) = head
        .match_indices(':')
        .rev()
        .map(|(i, _)| (head[..i].trim_end(), head[i + 1..].trim_start()))
        .find(|(name, superclass)| is_token(name) && is_token(superclass))?;

    Some(ClassHeader {
        name,
        superclass,
        interfaces: interfaces
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

/// Parser position within one map file.
#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    /// No header seen yet.
    Outside,
    /// Member lines belong to this class.
    InClass(String),
}

/// Accumulates class map files into a [`ClassModel`].
#[derive(Debug, Default)]
pub struct ClassMapParser {
    model: ClassModel,
    diagnostics: Vec<Diagnostic>,
}

impl ClassMapParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one map file's text. `origin` names it in errors.
    pub fn parse_str(&mut self, text: &str, origin: &Path) -> Result<()> {
        let mut state = State::Outside;

        for (index, line) in text.lines().enumerate() {
            let line_no = index + 1;

            if let Some(header) = parse_header(line) {
                self.model.declare(
                    header.name,
                    header.superclass,
                    header.interfaces,
                    origin,
                )?;
                state = State::InClass(header.name.to_string());
                continue;
            }

            if let Some(member) = line.strip_prefix('\t')
                && !member.is_empty()
            {
                let State::InClass(name) = &state else {
                    return Err(Error::MethodOutsideClass {
                        origin: origin.to_path_buf(),
                        line: line_no,
                    });
                };
                if let Some(class) = self.model.get_mut(name) {
                    class.add_method(member);
                }
                continue;
            }

            tracing::warn!("Ignoring line {}:{}: {}", origin.display(), line_no, line);
            self.diagnostics.push(Diagnostic::IgnoredLine {
                origin: origin.to_path_buf(),
                line: line_no,
                text: line.to_string(),
            });
        }

        Ok(())
    }

    /// Parse one map file.
    pub fn parse_file(&mut self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path)?;
        self.parse_str(&text, path)
    }

    /// Parse every `*.map` file under `dir` in sorted path order.
    ///
    /// Returns the number of files parsed. A missing directory has none.
    pub fn parse_dir(&mut self, dir: &Path) -> Result<usize> {
        let files = find_map_files(dir)?;
        for file in &files {
            self.parse_file(file)?;
        }
        tracing::debug!("Parsed {} class map files under {}", files.len(), dir.display());
        Ok(files.len())
    }

    pub fn model(&self) -> &ClassModel {
        &self.model
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Finish parsing.
    pub fn finish(self) -> (ClassModel, Vec<Diagnostic>) {
        (self.model, self.diagnostics)
    }
}

/// All map files below `dir` (dot-files included), sorted by path.
pub fn find_map_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    if dir.is_dir() {
        collect_map_files(dir, &mut found)?;
    }
    found.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
    Ok(found)
}

fn collect_map_files(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_map_files(&path, found)?;
        } else if path.extension().is_some_and(|ext| ext == MAP_EXTENSION) {
            found.push(path);
        }
    }
    Ok(())
}
