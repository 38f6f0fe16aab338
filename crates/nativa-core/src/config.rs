//! Build configuration.
//!
//! Loaded from a `nativa.json` file next to the project sources. Every field
//! has a default so a minimal file only names the sources and architectures.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::arch::{Arch, ArchitectureSet};
use crate::error::{Error, Result};
use crate::paths::normalize_path;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "nativa.json";

/// Environment variable overriding the compiler binary.
pub const COMPILER_ENV: &str = "NATIVA_COMPILER";

/// Environment variable overriding the number of worker slots.
pub const JOBS_ENV: &str = "NATIVA_JOBS";

/// Build flavour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Development,
    Release,
}

impl BuildMode {
    /// Directory component used for the versionized build directory.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Development => "Development",
            Self::Release => "Release",
        }
    }
}

/// Tool locations. Anything left unset is looked up on PATH.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// The interactive source compiler run as a persistent session.
    pub compiler: Option<PathBuf>,

    /// C compiler used to assemble intermediates and compile the payload entry.
    pub cc: Option<PathBuf>,

    /// C++ driver used to link the payload library.
    pub cxx: Option<PathBuf>,

    /// Versioned runtime data directory: `<data_dir>/<arch>/kernel-<arch>.bc`
    /// and `<data_dir>/<arch>/libruntime-static.a`.
    pub data_dir: PathBuf,
}

/// Configuration for one build.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Application name.
    pub name: String,

    /// Java package of generated stubs. Derived from `name` when unset.
    pub package: Option<String>,

    /// Project root. Relative paths in the config resolve against it.
    pub project_dir: PathBuf,

    /// Build output root (relative to `project_dir`).
    pub build_dir: PathBuf,

    /// Development or release.
    pub mode: BuildMode,

    /// Target API level, part of the versionized build directory name.
    pub api_version: String,

    /// Source files to compile.
    pub files: Vec<PathBuf>,

    /// Known `(file, depends_on)` pairs used to order `files`.
    pub dependencies: Vec<(PathBuf, PathBuf)>,

    /// Target architectures, in build order.
    pub archs: Vec<Arch>,

    /// Main activity class name.
    pub main_activity: String,

    /// Custom application class, loaded before the main activity.
    pub application_class: Option<String>,

    /// Enable the multidex initialization hook in the application class.
    pub multidex: bool,

    /// Optimization level passed to the compiler (defaults per mode).
    pub opt_level: Option<u8>,

    /// Number of worker slots (defaults to available parallelism).
    pub jobs: Option<usize>,

    /// Tool locations.
    pub toolchain: ToolchainConfig,

    /// Bridge metadata files handed to every compiler session.
    pub bridge_files: Vec<PathBuf>,

    /// Flags for the assembler step, shared by all archs.
    pub asflags: Vec<String>,

    /// Extra per-arch assembler/compiler flags.
    pub arch_flags: HashMap<String, Vec<String>>,

    /// Linker flags for the payload library.
    pub ldflags: Vec<String>,

    /// Libraries appended to the payload link line.
    pub ldlibs: Vec<String>,

    /// Extra init functions called by the payload before the compiled scopes.
    pub custom_init_funcs: Vec<String>,

    /// Payload library name (`lib<name>.so`).
    pub payload_library_name: String,

    /// Runtime package imported by every generated stub.
    pub runtime_package: String,

    /// Per-job compiler acknowledgment timeout in seconds. None waits forever.
    pub session_timeout_secs: Option<u64>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            name: "app".to_string(),
            package: None,
            project_dir: PathBuf::from("."),
            build_dir: PathBuf::from("build"),
            mode: BuildMode::Development,
            api_version: "30".to_string(),
            files: Vec::new(),
            dependencies: Vec::new(),
            archs: vec![Arch::new("armv7")],
            main_activity: "MainActivity".to_string(),
            application_class: None,
            multidex: false,
            opt_level: None,
            jobs: None,
            toolchain: ToolchainConfig::default(),
            bridge_files: Vec::new(),
            asflags: Vec::new(),
            arch_flags: HashMap::new(),
            ldflags: Vec::new(),
            ldlibs: Vec::new(),
            custom_init_funcs: Vec::new(),
            payload_library_name: "payload".to_string(),
            runtime_package: "io.nativa.runtime".to_string(),
            session_timeout_secs: None,
        }
    }
}

impl BuildConfig {
    /// Create config for release builds.
    pub fn release() -> Self {
        Self {
            mode: BuildMode::Release,
            ..Default::default()
        }
    }

    /// Load a config file, resolve relative paths and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let mut config: Self = serde_json::from_str(&text)?;

        let base = path.parent().unwrap_or(Path::new("."));
        config.project_dir = std::path::absolute(base.join(&config.project_dir))?;
        config.apply_env();
        config.validate()?;

        tracing::debug!(
            "Loaded {} ({} files, {} archs)",
            path.display(),
            config.files.len(),
            config.archs.len()
        );
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(compiler) = std::env::var(COMPILER_ENV) {
            self.toolchain.compiler = Some(PathBuf::from(compiler));
        }
        if let Ok(jobs) = std::env::var(JOBS_ENV) {
            match jobs.parse::<usize>() {
                Ok(n) if n > 0 => self.jobs = Some(n),
                _ => tracing::warn!("Ignoring invalid {}={}", JOBS_ENV, jobs),
            }
        }
    }

    /// Check the configuration for values the build cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !self.name.is_ascii() {
            return Err(Error::Config("please use only ASCII letters in `name'".to_string()));
        }
        self.arch_set().validate()?;
        if self.jobs == Some(0) {
            return Err(Error::Config("`jobs' must be at least 1".to_string()));
        }
        if self.payload_library_name.is_empty() {
            return Err(Error::Config("`payload_library_name' must not be empty".to_string()));
        }
        Ok(())
    }

    /// Target architectures as an ordered set.
    pub fn arch_set(&self) -> ArchitectureSet {
        self.archs.iter().cloned().collect()
    }

    /// Java package of the generated stubs.
    pub fn package(&self) -> String {
        match &self.package {
            Some(package) => package.clone(),
            None => {
                let sanitized: String = self
                    .name
                    .to_lowercase()
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
                    .collect();
                format!("com.yourcompany.{sanitized}")
            }
        }
    }

    /// Package as a relative directory path (`com/example/app`).
    pub fn package_path(&self) -> PathBuf {
        self.package().split('.').collect()
    }

    /// Optimization level, defaulting per build mode.
    pub fn opt_level(&self) -> u8 {
        self.opt_level.unwrap_or(match self.mode {
            BuildMode::Development => 0,
            BuildMode::Release => 3,
        })
    }

    /// Number of worker slots.
    pub fn slot_count(&self) -> usize {
        self.jobs
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }

    /// Session acknowledgment timeout.
    pub fn session_timeout(&self) -> Option<Duration> {
        self.session_timeout_secs.map(Duration::from_secs)
    }

    /// The class that loads the payload library: the application class if
    /// one is configured, otherwise the main activity.
    pub fn entry_point_class(&self) -> &str {
        self.application_class
            .as_deref()
            .unwrap_or(&self.main_activity)
    }

    /// Resolve a config-relative path against the project directory, with
    /// `.` and `..` collapsed.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        normalize_path(&self.project_dir.join(path))
    }

    /// Source files resolved against the project directory.
    pub fn source_files(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| self.resolve(f)).collect()
    }

    /// Runtime data directory for one architecture.
    pub fn arch_data_dir(&self, arch: &Arch) -> PathBuf {
        self.resolve(&self.toolchain.data_dir).join(arch.as_str())
    }

    /// Shared runtime image the compiler links every object against.
    pub fn kernel_path(&self, arch: &Arch) -> PathBuf {
        self.arch_data_dir(arch).join(format!("kernel-{arch}.bc"))
    }

    /// Static runtime library linked into the payload.
    pub fn runtime_library(&self, arch: &Arch) -> PathBuf {
        self.arch_data_dir(arch).join("libruntime-static.a")
    }

    /// Payload library file name.
    pub fn payload_library_filename(&self) -> String {
        format!("lib{}.so", self.payload_library_name)
    }

    /// Assembler flags for one architecture.
    pub fn asflags(&self, arch: &Arch) -> Vec<String> {
        let mut flags = self.asflags.clone();
        if let Some(extra) = self.arch_flags.get(arch.as_str()) {
            flags.extend(extra.iter().cloned());
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = BuildConfig::default();
        assert_eq!(config.mode, BuildMode::Development);
        assert_eq!(config.opt_level(), 0);
        assert_eq!(config.payload_library_filename(), "libpayload.so");
        assert_eq!(config.entry_point_class(), "MainActivity");
    }

    #[test]
    fn test_release_config() {
        let config = BuildConfig::release();
        assert_eq!(config.mode, BuildMode::Release);
        assert_eq!(config.opt_level(), 3);
        assert_eq!(config.mode.dir_name(), "Release");
    }

    #[test]
    fn test_package_derived_from_name() {
        let config = BuildConfig {
            name: "Hello World!".to_string(),
            ..Default::default()
        };
        assert_eq!(config.package(), "com.yourcompany.helloworld_");
        assert_eq!(
            config.package_path(),
            PathBuf::from("com/yourcompany/helloworld_")
        );
    }

    #[test]
    fn test_entry_point_prefers_application_class() {
        let config = BuildConfig {
            application_class: Some("MyApp".to_string()),
            ..Default::default()
        };
        assert_eq!(config.entry_point_class(), "MyApp");
    }

    #[test]
    fn test_load_resolves_project_dir() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            r#"{
                "name": "demo",
                "package": "com.example.demo",
                "files": ["app/main.rb"],
                "archs": ["armv7", "x86"],
                "jobs": 3,
                "dependencies": [["app/main.rb", "app/util.rb"]]
            }"#,
        )
        .unwrap();

        let config = BuildConfig::load(&path).unwrap();
        assert!(config.project_dir.is_absolute());
        assert_eq!(config.archs.len(), 2);
        assert_eq!(config.dependencies.len(), 1);
        assert_eq!(
            config.source_files(),
            vec![config.project_dir.join("app/main.rb")]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_source_files_are_normalized() {
        let config = BuildConfig {
            project_dir: PathBuf::from("/work/app"),
            files: vec![
                PathBuf::from("app/./main.rb"),
                PathBuf::from("../shared/x.rb"),
                PathBuf::from("/vendor/lib/y.rb"),
            ],
            ..Default::default()
        };
        assert_eq!(
            config.source_files(),
            vec![
                PathBuf::from("/work/app/app/main.rb"),
                PathBuf::from("/work/shared/x.rb"),
                PathBuf::from("/vendor/lib/y.rb"),
            ]
        );
    }

    #[test]
    fn test_load_rejects_unknown_arch() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, r#"{ "archs": ["mips"] }"#).unwrap();
        assert!(matches!(BuildConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_asflags_merge_arch_specific() {
        let mut config = BuildConfig::default();
        config.asflags = vec!["-no-canonical-prefixes".to_string()];
        config
            .arch_flags
            .insert("armv7".to_string(), vec!["-march=armv7a".to_string()]);

        assert_eq!(
            config.asflags(&Arch::new("armv7")),
            vec!["-no-canonical-prefixes", "-march=armv7a"]
        );
        assert_eq!(config.asflags(&Arch::new("x86")), vec!["-no-canonical-prefixes"]);
    }
}
