//! Java stub emission.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use super::Diagnostic;
use super::model::{ClassModel, JavaClass};
use crate::config::BuildConfig;
use crate::error::Result;
use crate::staleness::write_if_changed;

/// Superclass used when none was ever reported.
pub const OBJECT_CLASS: &str = "java.lang.Object";

/// Generated sources never pruned.
const KEEP_CLASSES: &[&str] = &["R"];

/// What [`Emitter::emit`] did.
#[derive(Debug, Clone, Default)]
pub struct EmitReport {
    /// Files created or rewritten.
    pub written: Vec<PathBuf>,

    /// Files already up to date.
    pub unchanged: Vec<PathBuf>,

    /// Classes not emitted.
    pub skipped: Vec<Diagnostic>,

    /// Stale sources (and their compiled classes) removed.
    pub pruned: Vec<PathBuf>,
}

/// Renders a [`ClassModel`] into Java sources.
#[derive(Debug, Clone)]
pub struct Emitter {
    package: String,
    package_path: PathBuf,
    runtime_package: String,
    /// Class carrying the static library loader.
    entry_point: String,
    application_class: Option<String>,
    multidex: bool,
    payload_library_name: String,
}

impl Emitter {
    pub fn from_config(config: &BuildConfig) -> Self {
        Self {
            package: config.package(),
            package_path: config.package_path(),
            runtime_package: config.runtime_package.clone(),
            entry_point: config.entry_point_class().to_string(),
            application_class: config.application_class.clone(),
            multidex: config.multidex,
            payload_library_name: config.payload_library_name.clone(),
        }
    }

    /// The superclass to emit, or `None` if the class must be skipped.
    ///
    /// Unknown superclasses are fine when qualified (`android.app.Activity`);
    /// an unqualified one has to be another generated class.
    pub fn resolve_superclass<'a>(&self, class: &'a JavaClass, model: &ClassModel) -> Option<&'a str> {
        if class.has_sentinel_superclass() {
            return Some(OBJECT_CLASS);
        }
        let superclass = class.superclass.as_str();
        if !superclass.contains('.') && !model.contains(superclass) {
            return None;
        }
        Some(superclass)
    }

    /// Render one class, or `None` if it is skipped.
    pub fn render_class(&self, name: &str, class: &JavaClass, model: &ClassModel) -> Option<String> {
        let superclass = self.resolve_superclass(class, model)?;
        let mut out = String::new();

        out.push_str("// This file has been generated automatically. Do not edit.\n");
        out.push_str(&format!("package {};\n", self.package));
        out.push_str(&format!("import {}.*;\n", self.package));
        out.push_str(&format!("import {}.*;\n", self.runtime_package));

        out.push_str(&format!("public class {} extends {}", name, superclass.replace('$', ".")));
        if !class.interfaces.is_empty() {
            out.push_str(&format!(" implements {}", class.interfaces.join(", ")));
        }
        out.push_str(" {\n");

        if let Some(extensions) = &class.extensions {
            for line in extensions.split_inclusive('\n') {
                out.push('\t');
                out.push_str(line);
            }
        }

        for method in &class.methods {
            out.push_str(&format!("\t{method}\n"));
        }

        if name == self.entry_point {
            out.push_str(&format!(
                "\tstatic {{\n\t\tjava.lang.System.loadLibrary(\"{}\");\n\t}}\n",
                self.payload_library_name
            ));
        }

        if self.multidex && self.application_class.as_deref() == Some(name) {
            out.push_str(
                "\t@Override\n\
                 \tprotected void attachBaseContext(android.content.Context context) {\n\
                 \t\tsuper.attachBaseContext(context);\n\
                 \t\tandroid.support.multidex.MultiDex.install(this);\n\
                 \t}\n",
            );
        }

        out.push_str("}\n");
        Some(out)
    }

    /// Render every emittable class, keyed by class name in model order.
    pub fn render(&self, model: &ClassModel) -> IndexMap<String, String> {
        model
            .iter()
            .filter_map(|(name, class)| {
                self.render_class(name, class, model)
                    .map(|text| (name.clone(), text))
            })
            .collect()
    }

    /// Package directory for generated sources under `java_dir`.
    pub fn package_dir(&self, java_dir: &Path) -> PathBuf {
        java_dir.join(&self.package_path)
    }

    /// Write `<java_dir>/<package>/<Class>.java` for every class and prune
    /// generated sources whose class is gone, along with the matching
    /// `.class` file under `classes_dir`.
    pub fn emit(&self, model: &ClassModel, java_dir: &Path, classes_dir: &Path) -> Result<EmitReport> {
        let mut report = EmitReport::default();
        let package_dir = self.package_dir(java_dir);
        fs::create_dir_all(&package_dir)?;

        let rendered = self.render(model);
        for (name, class) in model.iter() {
            if !rendered.contains_key(name) {
                tracing::debug!("Skipping {}: super class {} does not exist", name, class.superclass);
                report.skipped.push(Diagnostic::SkippedClass {
                    class: name.clone(),
                    superclass: class.superclass.clone(),
                });
            }
        }

        for (name, text) in &rendered {
            let path = package_dir.join(format!("{name}.java"));
            if write_if_changed(&path, text)? {
                tracing::info!("Create {}", path.display());
                report.written.push(path);
            } else {
                report.unchanged.push(path);
            }
        }

        for java in find_java_files(java_dir)? {
            let Some(stem) = java.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            if model.contains(&stem) || KEEP_CLASSES.contains(&stem.as_str()) {
                continue;
            }

            tracing::debug!("Removing stale {}", java.display());
            fs::remove_file(&java)?;
            if let Ok(relative) = java.strip_prefix(java_dir) {
                let class_file = classes_dir.join(relative).with_extension("class");
                if class_file.exists() {
                    fs::remove_file(&class_file)?;
                }
            }
            report.pruned.push(java);
        }

        Ok(report)
    }
}

fn find_java_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    if dir.is_dir() {
        collect_java_files(dir, &mut found)?;
    }
    found.sort();
    Ok(found)
}

fn collect_java_files(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_java_files(&path, found)?;
        } else if path.extension().is_some_and(|ext| ext == "java") {
            found.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classmap::SENTINEL_SUPERCLASS;
    use tempfile::TempDir;

    fn emitter() -> Emitter {
        Emitter::from_config(&BuildConfig {
            package: Some("com.example.demo".to_string()),
            ..Default::default()
        })
    }

    fn model(entries: &[(&str, &str)]) -> ClassModel {
        let mut model = ClassModel::new();
        for (name, superclass) in entries {
            model
                .declare(name, superclass, vec![], Path::new("t.map"))
                .unwrap();
        }
        model
    }

    #[test]
    fn test_render_full_class() {
        let mut model = model(&[("Helper", SENTINEL_SUPERCLASS)]);
        let class = model.get_mut("Helper").unwrap();
        class.interfaces = vec!["java.lang.Runnable".to_string(), "Cloneable".to_string()];
        class.add_method("public native void run();");
        class.append_extension("int a;\nint b;\n");

        let text = emitter().render_class("Helper", model.get("Helper").unwrap(), &model).unwrap();
        assert_eq!(
            text,
            "// This file has been generated automatically. Do not edit.\n\
             package com.example.demo;\n\
             import com.example.demo.*;\n\
             import io.nativa.runtime.*;\n\
             public class Helper extends java.lang.Object implements java.lang.Runnable, Cloneable {\n\
             \tint a;\n\
             \tint b;\n\
             \tpublic native void run();\n\
             }\n"
        );
    }

    #[test]
    fn test_nested_superclass_uses_dots() {
        let model = model(&[("Listener", "android.view.View$OnClickListener")]);
        let text = emitter().render(&model)["Listener"].clone();
        assert!(text.contains("extends android.view.View.OnClickListener {"));
    }

    #[test]
    fn test_unknown_unqualified_superclass_skipped() {
        let model = model(&[("A", "Missing"), ("B", "C"), ("C", "android.app.Service")]);
        let rendered = emitter().render(&model);
        assert!(!rendered.contains_key("A"));
        assert!(rendered.contains_key("B"));
        assert!(rendered.contains_key("C"));
    }

    #[test]
    fn test_entry_point_loads_library() {
        let model = model(&[("MainActivity", "android.app.Activity"), ("Other", "android.app.Activity")]);
        let rendered = emitter().render(&model);
        let loader = "\tstatic {\n\t\tjava.lang.System.loadLibrary(\"payload\");\n\t}\n";
        assert!(rendered["MainActivity"].ends_with(&format!("{loader}}}\n")));
        assert!(!rendered["Other"].contains("loadLibrary"));
    }

    #[test]
    fn test_application_class_with_multidex() {
        let emitter = Emitter::from_config(&BuildConfig {
            application_class: Some("App".to_string()),
            multidex: true,
            ..Default::default()
        });
        let model = model(&[("App", "android.app.Application"), ("MainActivity", "android.app.Activity")]);
        let rendered = emitter.render(&model);

        assert!(rendered["App"].contains("loadLibrary"));
        assert!(rendered["App"].contains("MultiDex.install(this);"));
        assert!(!rendered["MainActivity"].contains("loadLibrary"));
        assert!(!rendered["MainActivity"].contains("attachBaseContext"));
    }

    #[test]
    fn test_emit_writes_if_changed_and_prunes() {
        let temp = TempDir::new().unwrap();
        let java_dir = temp.path().join("java");
        let classes_dir = temp.path().join("classes");
        let emitter = emitter();

        let package_dir = emitter.package_dir(&java_dir);
        let class_dir = classes_dir.join("com/example/demo");
        fs::create_dir_all(&package_dir).unwrap();
        fs::create_dir_all(&class_dir).unwrap();
        fs::write(package_dir.join("Old.java"), "old").unwrap();
        fs::write(class_dir.join("Old.class"), "old").unwrap();
        fs::write(package_dir.join("R.java"), "r").unwrap();

        let model = model(&[("MainActivity", "android.app.Activity"), ("Lost", "Nowhere")]);

        let report = emitter.emit(&model, &java_dir, &classes_dir).unwrap();
        assert_eq!(report.written, vec![package_dir.join("MainActivity.java")]);
        assert_eq!(report.pruned, vec![package_dir.join("Old.java")]);
        assert_eq!(report.skipped.len(), 1);
        assert!(!class_dir.join("Old.class").exists());
        assert!(package_dir.join("R.java").exists());

        let again = emitter.emit(&model, &java_dir, &classes_dir).unwrap();
        assert!(again.written.is_empty());
        assert_eq!(again.unchanged.len(), 1);
        assert!(again.pruned.is_empty());
    }
}
