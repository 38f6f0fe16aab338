//! Parallel compilation across a bounded number of worker slots.
//!
//! Jobs run on a dedicated rayon pool with one thread per slot. A job's slot
//! is the index of the pool thread running it, and it compiles on that slot's
//! session for its architecture, so at most `slots × archs` compiler
//! processes ever exist and at most `slots` jobs are in flight.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::arch::Arch;
use crate::error::{Error, Result};
use crate::progress::BuildCallback;
use crate::staleness::is_stale;

use super::assembler::Assembler;
use super::job::BuildJob;
use super::session::{PoolStats, SessionFactory, SessionKey, SessionPool};

/// One job's result.
#[derive(Debug, Clone)]
pub struct CompiledObject {
    pub job: BuildJob,

    /// True if the object was rebuilt in this run, false if reused.
    pub recompiled: bool,
}

impl CompiledObject {
    pub fn object(&self) -> &PathBuf {
        &self.job.object
    }

    pub fn symbol(&self) -> &str {
        &self.job.symbol
    }
}

/// Result of a scheduler run.
#[derive(Debug, Clone, Default)]
pub struct BuildOutcome {
    /// One entry per job, in job order.
    pub objects: Vec<CompiledObject>,

    /// Number of objects rebuilt.
    pub compiled: usize,

    /// Number of objects reused.
    pub reused: usize,

    /// Compiler session activity during the run.
    pub sessions: PoolStats,
}

impl BuildOutcome {
    /// Objects for one architecture, in job order.
    pub fn objects_for(&self, arch: &Arch) -> Vec<&CompiledObject> {
        self.objects.iter().filter(|o| &o.job.arch == arch).collect()
    }

    /// Whether any object for `arch` was rebuilt.
    pub fn recompiled_any(&self, arch: &Arch) -> bool {
        self.objects
            .iter()
            .any(|o| o.recompiled && &o.job.arch == arch)
    }
}

fn lock_error<T>(e: PoisonError<T>) -> Error {
    Error::Session(format!("scheduler lock poisoned (thread panicked): {}", e))
}

/// Report assembler failures against the job's source file.
fn attribute(job: &BuildJob, err: Error) -> Error {
    match err {
        Error::Compilation { message, .. } => {
            Error::compilation(&job.source, job.arch.as_str(), message)
        }
        other => other,
    }
}

/// Compiles stale jobs on persistent sessions and reuses fresh objects.
pub struct Scheduler {
    factory: Arc<dyn SessionFactory>,
    assembler: Arc<dyn Assembler>,
    /// Compiler binary; every object depends on it.
    compiler: PathBuf,
    /// Runtime image each object of an arch depends on.
    runtime_images: FxHashMap<Arch, PathBuf>,
    callback: Option<Arc<dyn BuildCallback>>,
}

impl Scheduler {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        assembler: Arc<dyn Assembler>,
        compiler: impl Into<PathBuf>,
    ) -> Self {
        Self {
            factory,
            assembler,
            compiler: compiler.into(),
            runtime_images: FxHashMap::default(),
            callback: None,
        }
    }

    /// Make every object of `arch` depend on a runtime image.
    pub fn with_runtime_image(mut self, arch: Arch, image: impl Into<PathBuf>) -> Self {
        self.runtime_images.insert(arch, image.into());
        self
    }

    /// Set the progress callback.
    pub fn set_callback(&mut self, callback: Arc<dyn BuildCallback>) {
        self.callback = Some(callback);
    }

    /// Process every job exactly once using `slot_count` worker slots.
    ///
    /// Sessions are started on demand and all of them are closed before this
    /// returns, on success and on failure. After the first failure no new job
    /// starts; jobs already running finish and the first failure is returned.
    pub fn run(&self, jobs: &[BuildJob], slot_count: usize) -> Result<BuildOutcome> {
        let slots = slot_count.max(1);
        let threads = rayon::ThreadPoolBuilder::new()
            .num_threads(slots)
            .thread_name(|i| format!("nativa-slot-{i}"))
            .build()
            .map_err(|e| Error::Session(format!("failed to start worker slots: {}", e)))?;

        let pool = SessionPool::new(Arc::clone(&self.factory));
        let abort = AtomicBool::new(false);
        let first_error: Mutex<Option<Error>> = Mutex::new(None);
        let finished: Mutex<Vec<(usize, CompiledObject)>> =
            Mutex::new(Vec::with_capacity(jobs.len()));

        tracing::debug!("Scheduling {} jobs on {} slots", jobs.len(), slots);

        threads.install(|| {
            jobs.par_iter().enumerate().for_each(|(index, job)| {
                if abort.load(Ordering::SeqCst) {
                    tracing::debug!("Skipping {} ({}): build aborted", job.source.display(), job.arch);
                    return;
                }

                let slot = rayon::current_thread_index().unwrap_or(0);
                let result = self
                    .process(&pool, job, slot)
                    .and_then(|object| {
                        finished.lock().map_err(lock_error)?.push((index, object));
                        Ok(())
                    });

                if let Err(e) = result {
                    abort.store(true, Ordering::SeqCst);
                    let mut first = first_error.lock().unwrap_or_else(PoisonError::into_inner);
                    if first.is_none() {
                        *first = Some(e);
                    } else {
                        tracing::warn!("Additional failure after abort: {}", e);
                    }
                }
            });
        });

        let stats = pool.stats();
        let closed = pool.close_all();

        if let Some(e) = first_error.into_inner().unwrap_or_else(PoisonError::into_inner) {
            return Err(e);
        }
        closed?;

        let mut finished = finished.into_inner().map_err(lock_error)?;
        if finished.len() != jobs.len() {
            return Err(Error::Aborted);
        }
        finished.sort_by_key(|(index, _)| *index);

        let objects: Vec<CompiledObject> = finished.into_iter().map(|(_, o)| o).collect();
        let compiled = objects.iter().filter(|o| o.recompiled).count();
        let outcome = BuildOutcome {
            reused: objects.len() - compiled,
            compiled,
            objects,
            sessions: stats,
        };

        tracing::debug!(
            "Compiled {} objects, reused {} ({} sessions, peak {})",
            outcome.compiled,
            outcome.reused,
            outcome.sessions.spawned,
            outcome.sessions.peak
        );
        Ok(outcome)
    }

    fn process(&self, pool: &SessionPool, job: &BuildJob, slot: usize) -> Result<CompiledObject> {
        let mut deps = vec![job.source.clone(), self.compiler.clone()];
        if let Some(image) = self.runtime_images.get(&job.arch) {
            deps.push(image.clone());
        }

        if !is_stale(&job.object, &deps) {
            tracing::debug!("Reusing {}", job.object.display());
            return Ok(CompiledObject {
                job: job.clone(),
                recompiled: false,
            });
        }

        if let Some(parent) = job.object.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!("Compile {} ({})", job.source.display(), job.arch);
        if let Some(callback) = &self.callback {
            callback.on_compile(job);
        }

        pool.acquire(SessionKey::new(slot, job.arch.clone()))?
            .submit(job)?;
        self.assembler
            .assemble(&job.arch, &job.intermediate(), &job.object)
            .map_err(|e| attribute(job, e))?;

        Ok(CompiledObject {
            job: job.clone(),
            recompiled: true,
        })
    }
}
