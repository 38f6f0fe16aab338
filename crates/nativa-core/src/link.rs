//! Payload library linking.
//!
//! Each architecture gets one shared library holding every compiled object
//! plus a generated entry point that initializes the runtime and runs each
//! object's init symbol when the library is loaded.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::arch::{Arch, ArchitectureSet};
use crate::compile::CompiledObject;
use crate::config::BuildConfig;
use crate::error::{Error, Result};
use crate::paths::BuildDirs;
use crate::progress::BuildCallback;
use crate::staleness::{is_stale, write_if_changed};

/// Compiles the payload entry source and links the payload library.
pub trait Linker: Send + Sync {
    fn compile_entry(&self, arch: &Arch, source: &Path, object: &Path) -> Result<()>;

    fn link(&self, arch: &Arch, entry: &Path, objects: &[PathBuf], library: &Path) -> Result<()>;
}

/// Links with the C/C++ compiler drivers.
pub struct CcLinker {
    cc: PathBuf,
    cxx: PathBuf,
    cflags: FxHashMap<Arch, Vec<String>>,
    ldflags: Vec<String>,
    ldlibs: Vec<String>,
}

impl CcLinker {
    pub fn new(config: &BuildConfig, cc: PathBuf, cxx: PathBuf) -> Self {
        let cflags = config
            .arch_set()
            .iter()
            .map(|arch| (arch.clone(), config.asflags(arch)))
            .collect();
        Self {
            cc,
            cxx,
            cflags,
            ldflags: config.ldflags.clone(),
            ldlibs: config.ldlibs.clone(),
        }
    }

    fn compile_command(&self, arch: &Arch, source: &Path, object: &Path) -> Command {
        let mut cmd = Command::new(&self.cc);
        if let Some(flags) = self.cflags.get(arch) {
            cmd.args(flags);
        }
        cmd.arg("-c").arg(source).arg("-o").arg(object);
        cmd
    }

    fn link_command(&self, entry: &Path, objects: &[PathBuf], library: &Path) -> Command {
        let mut cmd = Command::new(&self.cxx);
        cmd.arg("-shared")
            .args(&self.ldflags)
            .arg(entry)
            .args(objects)
            .arg("-o")
            .arg(library)
            .args(&self.ldlibs);
        cmd
    }
}

fn run(mut cmd: Command, arch: &Arch) -> Result<()> {
    let program = cmd.get_program().to_string_lossy().to_string();
    let output = cmd.output().map_err(|e| Error::Toolchain(format!("failed to run {program}: {e}")))?;
    if !output.status.success() {
        return Err(Error::Link {
            arch: arch.to_string(),
            message: format!(
                "{program} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(())
}

impl Linker for CcLinker {
    fn compile_entry(&self, arch: &Arch, source: &Path, object: &Path) -> Result<()> {
        run(self.compile_command(arch, source, object), arch)
    }

    fn link(&self, arch: &Arch, entry: &Path, objects: &[PathBuf], library: &Path) -> Result<()> {
        run(self.link_command(entry, objects, library), arch)
    }
}

/// Render the payload entry source for one architecture.
///
/// Custom init functions run first, then each object's init symbol in the
/// given order, then native methods are registered.
pub fn render_payload_entry(config: &BuildConfig, objects: &[&CompiledObject]) -> String {
    let tag = config.package_path().to_string_lossy().replace('\\', "/");
    let mut out = String::new();

    out.push_str(
        "// This file has been generated. Do not modify by hand.\n\
         #include <stdbool.h>\n\
         #include <stddef.h>\n\
         #include <jni.h>\n\
         #include <android/log.h>\n\
         extern \"C\" {\n\
         \x20   void nativa_register_native_methods(void);\n\
         \x20   bool nativa_vm_init(const char *app_package, JNIEnv *env);\n\
         \x20   void *nativa_vm_top_self(void);\n",
    );
    for func in &config.custom_init_funcs {
        out.push_str(&format!("    void {func}(void);\n"));
    }
    for object in objects {
        out.push_str(&format!("    void *{}(void *rcv, void *sel);\n", object.symbol()));
    }
    out.push_str("}\n");

    out.push_str(&format!(
        "extern \"C\"\n\
         jint\n\
         JNI_OnLoad(JavaVM *vm, void *reserved)\n\
         {{\n\
         \x20   __android_log_write(ANDROID_LOG_DEBUG, \"{tag}\", \"Loading payload\");\n\
         \x20   JNIEnv *env = NULL;\n\
         \x20   if (vm->GetEnv((void **)&env, JNI_VERSION_1_6) != JNI_OK) {{\n\
         \x20       return -1;\n\
         \x20   }}\n\
         \x20   nativa_vm_init(\"{tag}\", env);\n\
         \x20   void *top_self = nativa_vm_top_self();\n"
    ));

    for func in &config.custom_init_funcs {
        out.push_str(&format!(
            "    env->PushLocalFrame(32);\n\
             \x20   {func}();\n\
             \x20   env->PopLocalFrame(NULL);\n"
        ));
    }

    for object in objects {
        let scope = object
            .object()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        out.push_str(&format!(
            "    try {{\n\
             \x20       env->PushLocalFrame(32);\n\
             \x20       {symbol}(top_self, NULL);\n\
             \x20       env->PopLocalFrame(NULL);\n\
             \x20   }}\n\
             \x20   catch (...) {{\n\
             \x20       __android_log_write(ANDROID_LOG_ERROR, \"{tag}\", \"Uncaught exception when initializing `{scope}' scope -- aborting\");\n\
             \x20       return -1;\n\
             \x20   }}\n",
            symbol = object.symbol(),
        ));
    }

    out.push_str(&format!(
        "    nativa_register_native_methods();\n\
         \x20   __android_log_write(ANDROID_LOG_DEBUG, \"{tag}\", \"Loaded payload\");\n\
         \x20   return JNI_VERSION_1_6;\n\
         }}\n"
    ));
    out
}

/// Render the ABI list read by native debugging tools.
pub fn render_abi_list(archs: &ArchitectureSet) -> Result<String> {
    let abis = archs
        .iter()
        .map(|arch| arch.abi_directory_name())
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("APP_ABI := {}\n", abis.join(" ")))
}

/// Write `jni/Android.mk` if its content changed.
pub fn write_abi_list(dirs: &BuildDirs, archs: &ArchitectureSet) -> Result<bool> {
    write_if_changed(&dirs.abi_list(), &render_abi_list(archs)?)
}

/// What happened to one architecture's payload.
#[derive(Debug, Clone)]
pub struct LinkReport {
    pub arch: Arch,
    pub library: PathBuf,
    /// The entry source was rewritten.
    pub entry_written: bool,
    /// The library was relinked.
    pub relinked: bool,
}

/// Generates entry sources and relinks payload libraries when needed.
pub struct PayloadLinker<'a> {
    config: &'a BuildConfig,
    dirs: &'a BuildDirs,
    linker: &'a dyn Linker,
    callback: Option<Arc<dyn BuildCallback>>,
}

impl<'a> PayloadLinker<'a> {
    pub fn new(config: &'a BuildConfig, dirs: &'a BuildDirs, linker: &'a dyn Linker) -> Self {
        Self {
            config,
            dirs,
            linker,
            callback: None,
        }
    }

    pub fn set_callback(&mut self, callback: Arc<dyn BuildCallback>) {
        self.callback = Some(callback);
    }

    /// Path of the payload library for `arch`.
    pub fn library_path(&self, arch: &Arch) -> Result<PathBuf> {
        Ok(self
            .dirs
            .arch_lib_dir(arch)?
            .join(self.config.payload_library_filename()))
    }

    /// Bring one architecture's payload up to date.
    ///
    /// The library is relinked when it is missing, when `recompiled` is set,
    /// when the static runtime library is newer than it, or when the entry
    /// source is newer than its object.
    pub fn link_arch(
        &self,
        arch: &Arch,
        objects: &[&CompiledObject],
        recompiled: bool,
    ) -> Result<LinkReport> {
        let entry_source = self.dirs.payload_entry_source(arch);
        let entry_object = self.dirs.payload_entry_object(arch);
        let library = self.library_path(arch)?;

        let entry_written =
            write_if_changed(&entry_source, &render_payload_entry(self.config, objects))?;
        if entry_written {
            tracing::debug!("Wrote {}", entry_source.display());
        }

        let runtime = self.config.runtime_library(arch);
        let relink = !library.exists()
            || recompiled
            || is_stale(&library, &[&runtime])
            || is_stale(&entry_object, &[&entry_source]);

        if !relink {
            tracing::debug!("Payload {} is up to date", library.display());
            return Ok(LinkReport {
                arch: arch.clone(),
                library,
                entry_written,
                relinked: false,
            });
        }

        tracing::info!("Create {}", library.display());
        if let Some(callback) = &self.callback {
            callback.on_link(&library);
        }

        if let Some(parent) = library.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Some(parent) = entry_object.parent() {
            std::fs::create_dir_all(parent)?;
        }

        self.linker.compile_entry(arch, &entry_source, &entry_object)?;
        let paths: Vec<PathBuf> = objects.iter().map(|o| o.object().clone()).collect();
        self.linker.link(arch, &entry_object, &paths, &library)?;

        Ok(LinkReport {
            arch: arch.clone(),
            library,
            entry_written,
            relinked: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::BuildJob;
    use std::fs;
    use std::sync::Mutex;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    /// Writes placeholder files instead of invoking a compiler.
    #[derive(Default)]
    struct RecordingLinker {
        links: Mutex<Vec<(Arch, Vec<PathBuf>)>>,
    }

    impl Linker for RecordingLinker {
        fn compile_entry(&self, _arch: &Arch, _source: &Path, object: &Path) -> Result<()> {
            fs::write(object, "entry")?;
            Ok(())
        }

        fn link(&self, arch: &Arch, _entry: &Path, objects: &[PathBuf], library: &Path) -> Result<()> {
            fs::write(library, "lib")?;
            self.links.lock().unwrap().push((arch.clone(), objects.to_vec()));
            Ok(())
        }
    }

    fn compiled(dir: &Path, name: &str, arch: &str) -> CompiledObject {
        CompiledObject {
            job: BuildJob::new(
                dir.join(name),
                dir.join(format!("{name}.{arch}.o")),
                Arch::new(arch),
            ),
            recompiled: false,
        }
    }

    fn config(temp: &Path) -> BuildConfig {
        BuildConfig {
            name: "Demo".to_string(),
            project_dir: temp.to_path_buf(),
            custom_init_funcs: vec!["init_extra".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_entry_source_calls_symbols_in_order() {
        let temp = TempDir::new().unwrap();
        let a = compiled(temp.path(), "a.rb", "armv7");
        let b = compiled(temp.path(), "b.rb", "armv7");

        let text = render_payload_entry(&config(temp.path()), &[&a, &b]);

        assert!(text.contains("JNI_OnLoad"));
        assert!(text.contains("void init_extra(void);"));
        assert!(text.contains("com/yourcompany/demo"));
        let first = text.find(&format!("{}(top_self, NULL)", a.symbol())).unwrap();
        let second = text.find(&format!("{}(top_self, NULL)", b.symbol())).unwrap();
        let custom = text.find("init_extra();").unwrap();
        assert!(custom < first && first < second);
        assert!(text.contains("`a.rb.armv7.o' scope"));
    }

    #[test]
    fn test_abi_list() {
        let archs: ArchitectureSet = ["armv7", "x86", "arm64-v8a"].into_iter().collect();
        assert_eq!(
            render_abi_list(&archs).unwrap(),
            "APP_ABI := armeabi-v7a x86 arm64-v8a\n"
        );
    }

    #[test]
    fn test_relink_rules() {
        let temp = TempDir::new().unwrap();
        let config = config(temp.path());
        let dirs = BuildDirs::from_root(temp.path().join("build"));
        let linker = RecordingLinker::default();
        let payload = PayloadLinker::new(&config, &dirs, &linker);
        let arch = Arch::new("armv7");
        let a = compiled(temp.path(), "a.rb", "armv7");

        // Missing library.
        let report = payload.link_arch(&arch, &[&a], false).unwrap();
        assert!(report.relinked);
        assert!(report.entry_written);
        assert!(report.library.ends_with("lib/armeabi-v7a/libpayload.so"));

        // Nothing changed.
        let report = payload.link_arch(&arch, &[&a], false).unwrap();
        assert!(!report.relinked);
        assert!(!report.entry_written);

        // An object was recompiled.
        assert!(payload.link_arch(&arch, &[&a], true).unwrap().relinked);

        // The static runtime is newer than the library.
        let runtime = config.runtime_library(&arch);
        fs::create_dir_all(runtime.parent().unwrap()).unwrap();
        fs::write(&runtime, "").unwrap();
        fs::File::options()
            .write(true)
            .open(&runtime)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
        assert!(payload.link_arch(&arch, &[&a], false).unwrap().relinked);

        assert_eq!(linker.links.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_changed_object_set_rewrites_entry_and_relinks() {
        let temp = TempDir::new().unwrap();
        let config = config(temp.path());
        let dirs = BuildDirs::from_root(temp.path().join("build"));
        let linker = RecordingLinker::default();
        let payload = PayloadLinker::new(&config, &dirs, &linker);
        let arch = Arch::new("x86");
        let a = compiled(temp.path(), "a.rb", "x86");
        let b = compiled(temp.path(), "b.rb", "x86");

        payload.link_arch(&arch, &[&a, &b], false).unwrap();

        // Age the entry object so the rewritten source is strictly newer.
        fs::File::options()
            .write(true)
            .open(dirs.payload_entry_object(&arch))
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(60))
            .unwrap();

        let report = payload.link_arch(&arch, &[&a], false).unwrap();
        assert!(report.entry_written);
        assert!(report.relinked);

        let links = linker.links.lock().unwrap();
        assert_eq!(links.last().unwrap().1, vec![a.object().clone()]);
    }
}
