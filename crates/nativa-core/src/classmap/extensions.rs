//! Hand-written extension files.
//!
//! Any `.java` file sitting next to a source file is appended to the body of
//! the generated class it is named after.

use std::fs;
use std::path::{Path, PathBuf};

use super::model::ClassModel;
use crate::error::{Error, Result};

/// Convert `underscore_case` to `CamelCase` (`my_service` → `MyService`).
pub fn camel_case(name: &str) -> String {
    name.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect()
}

/// Extension files: every `*.java` file directly inside a directory that
/// holds at least one source. Directories in first-seen order, files sorted.
pub fn extension_files(sources: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<&Path> = Vec::new();
    for source in sources {
        let dir = source.parent().unwrap_or(Path::new("."));
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }

    let mut files = Vec::new();
    for dir in dirs {
        let Ok(entries) = fs::read_dir(dir) else {
            continue;
        };
        let mut found = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_file() && path.extension().is_some_and(|ext| ext == "java") {
                found.push(path);
            }
        }
        found.sort();
        files.extend(found);
    }
    Ok(files)
}

/// Append each extension file to its class.
///
/// The class is the file stem, or failing that its CamelCase form. Returns
/// the `(file, class)` pairs applied.
pub fn merge_extensions(model: &mut ClassModel, files: &[PathBuf]) -> Result<Vec<(PathBuf, String)>> {
    let mut applied = Vec::with_capacity(files.len());

    for path in files {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let class_name = if model.contains(&stem) {
            stem
        } else {
            let camel = camel_case(&stem);
            if !model.contains(&camel) {
                return Err(Error::OrphanExtension {
                    path: path.clone(),
                    class: camel,
                });
            }
            camel
        };

        let text = fs::read_to_string(path)?;
        if let Some(class) = model.get_mut(&class_name) {
            class.append_extension(&text);
        }
        tracing::debug!("Merged {} into {}", path.display(), class_name);
        applied.push((path.clone(), class_name));
    }

    Ok(applied)
}
