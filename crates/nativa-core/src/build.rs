//! One build invocation.
//!
//! A [`BuildRun`] owns everything a build needs for its lifetime: the
//! configuration, the directory layout, the compiler backends and the
//! diagnostics collected along the way. The phases run in order:
//!
//! 1. order sources, compile stale objects for every arch
//! 2. link one payload library per arch
//! 3. parse class maps, merge extensions, emit stubs

use std::path::PathBuf;
use std::sync::Arc;

use crate::classmap::{
    ClassMapParser, Diagnostic, EmitReport, Emitter, extension_files, merge_extensions,
};
use crate::compile::{
    Assembler, BuildOutcome, CcAssembler, DependencyResolver, GraphResolver,
    ProcessSessionFactory, Scheduler, SessionFactory, Toolchain, jobs_for,
};
use crate::config::BuildConfig;
use crate::error::{Error, Result};
use crate::link::{CcLinker, LinkReport, Linker, PayloadLinker, write_abi_list};
use crate::paths::BuildDirs;
use crate::progress::BuildCallback;
use crate::staleness::touch;

/// The external tools a build drives.
pub struct Backends {
    /// Compiler binary; objects depend on its mtime.
    pub compiler: PathBuf,
    pub sessions: Arc<dyn SessionFactory>,
    pub assembler: Arc<dyn Assembler>,
    pub linker: Box<dyn Linker>,
}

impl Backends {
    /// Real subprocess backends for a configuration.
    pub fn from_config(config: &BuildConfig) -> Result<Self> {
        let toolchain = Toolchain::resolve(&config.toolchain)?;
        let flags_config = config.clone();

        Ok(Self {
            sessions: Arc::new(ProcessSessionFactory::new(config, toolchain.compiler.clone())),
            assembler: Arc::new(CcAssembler::new(toolchain.cc.clone(), move |arch| {
                flags_config.asflags(arch)
            })),
            linker: Box::new(CcLinker::new(config, toolchain.cc, toolchain.cxx)),
            compiler: toolchain.compiler,
        })
    }
}

/// Everything one full build produced.
#[derive(Debug)]
pub struct BuildSummary {
    pub outcome: BuildOutcome,
    pub links: Vec<LinkReport>,
    pub stubs: EmitReport,
}

/// State of one build invocation.
pub struct BuildRun {
    config: BuildConfig,
    dirs: BuildDirs,
    backends: Backends,
    resolver: Box<dyn DependencyResolver>,
    callback: Option<Arc<dyn BuildCallback>>,
    diagnostics: Vec<Diagnostic>,
}

impl BuildRun {
    /// Create a run with subprocess backends located via the toolchain config.
    pub fn new(config: BuildConfig) -> Result<Self> {
        let backends = Backends::from_config(&config)?;
        Ok(Self::with_backends(config, backends))
    }

    /// Create a run with explicit backends.
    pub fn with_backends(config: BuildConfig, backends: Backends) -> Self {
        let dirs = BuildDirs::for_config(&config);
        Self {
            config,
            dirs,
            backends,
            resolver: Box::new(GraphResolver),
            callback: None,
            diagnostics: Vec::new(),
        }
    }

    /// Replace the default source ordering.
    pub fn set_resolver(&mut self, resolver: Box<dyn DependencyResolver>) {
        self.resolver = resolver;
    }

    pub fn set_callback(&mut self, callback: Arc<dyn BuildCallback>) {
        self.callback = Some(callback);
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn dirs(&self) -> &BuildDirs {
        &self.dirs
    }

    /// Diagnostics collected so far.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Run every phase.
    pub fn run(&mut self) -> Result<BuildSummary> {
        let outcome = self.compile()?;
        let links = self.link(&outcome)?;
        let stubs = self.generate_stubs()?;
        Ok(BuildSummary {
            outcome,
            links,
            stubs,
        })
    }

    /// Compile stale objects for every (file, arch) pair.
    pub fn compile(&mut self) -> Result<BuildOutcome> {
        let archs = self.config.arch_set();
        archs.validate()?;
        self.dirs.create()?;

        let files = self
            .resolver
            .resolve(&self.config.source_files(), &self.resolved_dependencies())?;
        let jobs = jobs_for(&self.dirs, &self.config.project_dir, &files, &archs)?;

        let mut scheduler = Scheduler::new(
            Arc::clone(&self.backends.sessions),
            Arc::clone(&self.backends.assembler),
            &self.backends.compiler,
        );
        for arch in &archs {
            scheduler = scheduler.with_runtime_image(arch.clone(), self.config.kernel_path(arch));
        }
        if let Some(callback) = &self.callback {
            scheduler.set_callback(Arc::clone(callback));
        }

        let outcome = scheduler.run(&jobs, self.config.slot_count())?;

        for arch in &archs {
            if outcome.recompiled_any(arch) {
                let dir = self.dirs.arch_obj_dir(arch)?;
                std::fs::create_dir_all(&dir)?;
                touch(&dir)?;
            }
        }

        Ok(outcome)
    }

    fn resolved_dependencies(&self) -> Vec<(PathBuf, PathBuf)> {
        self.config
            .dependencies
            .iter()
            .map(|(file, dep)| (self.config.resolve(file), self.config.resolve(dep)))
            .collect()
    }

    /// Link one payload library per arch and refresh the ABI list.
    pub fn link(&self, outcome: &BuildOutcome) -> Result<Vec<LinkReport>> {
        let archs = self.config.arch_set();
        let mut linker = PayloadLinker::new(&self.config, &self.dirs, self.backends.linker.as_ref());
        if let Some(callback) = &self.callback {
            linker.set_callback(Arc::clone(callback));
        }

        let mut reports = Vec::with_capacity(archs.len());
        for arch in &archs {
            let objects = outcome.objects_for(arch);
            reports.push(linker.link_arch(arch, &objects, outcome.recompiled_any(arch))?);
        }

        if write_abi_list(&self.dirs, &archs)? {
            tracing::debug!("Wrote {}", self.dirs.abi_list().display());
        }
        Ok(reports)
    }

    /// Rebuild the class model from map files and emit stubs.
    pub fn generate_stubs(&mut self) -> Result<EmitReport> {
        let (report, diagnostics) = generate_stubs(&self.config, &self.dirs)?;
        if let Some(callback) = &self.callback {
            for path in &report.written {
                callback.on_create(path);
            }
        }
        self.diagnostics.extend(diagnostics);
        Ok(report)
    }
}

/// Parse the class maps of the primary arch, merge extension files and emit
/// stubs. Needs no toolchain.
pub fn generate_stubs(config: &BuildConfig, dirs: &BuildDirs) -> Result<(EmitReport, Vec<Diagnostic>)> {
    let archs = config.arch_set();
    let primary = archs
        .primary()
        .ok_or_else(|| Error::Config("at least one arch is required".to_string()))?;

    let mut parser = ClassMapParser::new();
    parser.parse_dir(&dirs.arch_obj_dir(primary)?)?;
    let (mut model, mut diagnostics) = parser.finish();

    let extensions = extension_files(&config.source_files())?;
    merge_extensions(&mut model, &extensions)?;

    let report = Emitter::from_config(config).emit(&model, &dirs.java_dir, &dirs.classes_dir)?;
    diagnostics.extend(report.skipped.iter().cloned());

    tracing::debug!(
        "Stubs: {} written, {} unchanged, {} pruned",
        report.written.len(),
        report.unchanged.len(),
        report.pruned.len()
    );
    Ok((report, diagnostics))
}

/// Remove the versionized build directory. Returns whether it existed.
pub fn clean(config: &BuildConfig) -> Result<bool> {
    let dirs = BuildDirs::for_config(config);
    let removed = dirs.clean()?;
    if removed {
        tracing::info!("Delete {}", dirs.root.display());
    }
    Ok(removed)
}
