//! Build directory management.
//!
//! Provides a consistent directory structure for a build so the CLI and the
//! build pipeline agree on where every artifact lives.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::arch::Arch;
use crate::config::BuildConfig;
use crate::error::Result;

/// Directory structure for one versionized build.
///
/// ```text
/// build/Development-30/
/// ├── obj/local/<abi>/   # Objects, intermediates and class map files
/// ├── jni/               # Payload entry sources and ABI list
/// ├── lib/<abi>/         # Linked payload libraries
/// ├── java/<package>/    # Generated stub sources
/// └── classes/           # Compiled stub classes
/// ```
#[derive(Debug, Clone)]
pub struct BuildDirs {
    /// The versionized build directory itself.
    pub root: PathBuf,

    /// Root of the per-ABI object directories.
    pub obj_dir: PathBuf,

    /// Payload entry sources.
    pub jni_dir: PathBuf,

    /// Root of the per-ABI library directories.
    pub lib_dir: PathBuf,

    /// Generated stub sources.
    pub java_dir: PathBuf,

    /// Compiled stub classes.
    pub classes_dir: PathBuf,
}

impl BuildDirs {
    /// Compute the directory layout for a configuration without touching disk.
    pub fn for_config(config: &BuildConfig) -> Self {
        let root = config
            .resolve(&config.build_dir)
            .join(format!("{}-{}", config.mode.dir_name(), config.api_version));
        Self::from_root(root)
    }

    /// Compute the layout under an explicit root.
    pub fn from_root(root: PathBuf) -> Self {
        Self {
            obj_dir: root.join("obj").join("local"),
            jni_dir: root.join("jni"),
            lib_dir: root.join("lib"),
            java_dir: root.join("java"),
            classes_dir: root.join("classes"),
            root,
        }
    }

    /// Create all top-level directories.
    pub fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.obj_dir)?;
        fs::create_dir_all(&self.jni_dir)?;
        fs::create_dir_all(&self.lib_dir)?;
        fs::create_dir_all(&self.java_dir)?;
        fs::create_dir_all(&self.classes_dir)?;
        Ok(())
    }

    /// Remove the whole versionized build directory.
    pub fn clean(&self) -> Result<bool> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Object directory for one architecture.
    pub fn arch_obj_dir(&self, arch: &Arch) -> Result<PathBuf> {
        Ok(self.obj_dir.join(arch.abi_directory_name()?))
    }

    /// Object path for a source file: `<arch obj dir>/<absolute source path>.<arch>.o`.
    ///
    /// Relative sources are taken relative to `project_dir`. The full
    /// normalized path is kept, so distinct sources never share an object.
    pub fn object_path(&self, source: &Path, project_dir: &Path, arch: &Arch) -> Result<PathBuf> {
        let absolute = normalize_path(&std::path::absolute(project_dir.join(source))?);
        let mut file_name = nested_source_path(&absolute).into_os_string();
        file_name.push(format!(".{arch}.o"));
        Ok(self.arch_obj_dir(arch)?.join(file_name))
    }

    /// Library directory for one architecture.
    pub fn arch_lib_dir(&self, arch: &Arch) -> Result<PathBuf> {
        Ok(self.lib_dir.join(arch.abi_directory_name()?))
    }

    /// Generated payload entry source for one architecture.
    pub fn payload_entry_source(&self, arch: &Arch) -> PathBuf {
        self.jni_dir.join(format!("payload-{arch}.cpp"))
    }

    /// Compiled payload entry object for one architecture.
    pub fn payload_entry_object(&self, arch: &Arch) -> PathBuf {
        self.jni_dir.join(arch.as_str()).join("payload.o")
    }

    /// ABI list consumed by native debugging tools.
    pub fn abi_list(&self) -> PathBuf {
        self.jni_dir.join("Android.mk")
    }
}

/// Collapse `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let last = normalized.components().next_back();
                let at_root = matches!(last, Some(Component::RootDir | Component::Prefix(_)));
                let can_pop = matches!(last, Some(Component::Normal(_)));
                if can_pop {
                    normalized.pop();
                } else if !at_root {
                    normalized.push("..");
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Turn an absolute path into one that nests under an object directory.
fn nested_source_path(absolute: &Path) -> PathBuf {
    absolute
        .components()
        .filter_map(|component| match component {
            Component::Prefix(prefix) => Some(
                prefix
                    .as_os_str()
                    .to_string_lossy()
                    .replace([':', '\\', '?'], "")
                    .into(),
            ),
            Component::Normal(part) => Some(part.to_os_string()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::symbol_for_object;
    use tempfile::TempDir;

    #[test]
    fn test_layout_for_config() {
        let config = BuildConfig {
            project_dir: PathBuf::from("/work/app"),
            api_version: "28".to_string(),
            ..BuildConfig::release()
        };
        let dirs = BuildDirs::for_config(&config);
        assert_eq!(dirs.root, PathBuf::from("/work/app/build/Release-28"));
        assert_eq!(dirs.obj_dir, PathBuf::from("/work/app/build/Release-28/obj/local"));
    }

    #[test]
    fn test_object_path() {
        let dirs = BuildDirs::from_root(PathBuf::from("/b"));
        let arch = Arch::new("armv7");

        let obj = dirs
            .object_path(Path::new("/work/app/app/main.rb"), Path::new("/work/app"), &arch)
            .unwrap();
        assert_eq!(
            obj,
            PathBuf::from("/b/obj/local/armeabi-v7a/work/app/app/main.rb.armv7.o")
        );

        let relative = dirs
            .object_path(Path::new("app/main.rb"), Path::new("/work/app"), &arch)
            .unwrap();
        assert_eq!(relative, obj);

        let outside = dirs
            .object_path(Path::new("/vendor/lib/x.rb"), Path::new("/work/app"), &arch)
            .unwrap();
        assert_eq!(
            outside,
            PathBuf::from("/b/obj/local/armeabi-v7a/vendor/lib/x.rb.armv7.o")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_distinct_sources_get_distinct_objects() {
        let dirs = BuildDirs::from_root(PathBuf::from("/b"));
        let arch = Arch::new("armv7");
        let project = Path::new("/work/app");
        let object = |source: &str| dirs.object_path(Path::new(source), project, &arch).unwrap();

        // A sibling of the project vs. a same-named directory inside it.
        assert_ne!(object("/work/app/shared/x.rb"), object("/work/app/../shared/x.rb"));
        assert_eq!(object("/work/app/../shared/x.rb"), object("/work/shared/x.rb"));

        // Outside the project vs. a path inside that repeats its components.
        assert_ne!(object("/work/app/work/shared/x.rb"), object("/work/shared/x.rb"));

        assert_ne!(
            symbol_for_object(&object("/work/app/shared/x.rb")),
            symbol_for_object(&object("/work/app/../shared/x.rb"))
        );
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/work/app/./src/../lib/x.rb")),
            PathBuf::from("/work/app/lib/x.rb")
        );
        assert_eq!(normalize_path(Path::new("/../x.rb")), PathBuf::from("/x.rb"));
        assert_eq!(
            normalize_path(Path::new("../a/../../b.rb")),
            PathBuf::from("../../b.rb")
        );
    }

    #[test]
    fn test_create_and_clean() {
        let temp = TempDir::new().unwrap();
        let dirs = BuildDirs::from_root(temp.path().join("Development-30"));

        dirs.create().unwrap();
        assert!(dirs.obj_dir.exists());
        assert!(dirs.java_dir.exists());

        assert!(dirs.clean().unwrap());
        assert!(!dirs.root.exists());
        assert!(!dirs.clean().unwrap());
    }
}
