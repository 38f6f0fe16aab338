//! Persistent compiler sessions.
//!
//! Starting the source compiler is expensive, so each worker slot keeps one
//! interactive compiler process per architecture alive for the whole build
//! run and feeds it jobs over a line protocol (see [`super::protocol`]).
//!
//! Provides [`ProcessSession`] for a real compiler subprocess and
//! [`SessionPool`] for lazily creating, reusing and tearing down sessions.

use std::fmt;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use rustc_hash::FxHashMap;

use crate::arch::Arch;
use crate::config::BuildConfig;
use crate::error::{Error, Result};

use super::job::BuildJob;
use super::protocol::{AckError, CompileRequest, read_ack, write_quit, write_request};

/// Identifies one session: a worker slot compiling for one architecture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub slot: usize,
    pub arch: Arch,
}

impl SessionKey {
    pub fn new(slot: usize, arch: Arch) -> Self {
        Self { slot, arch }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {} ({})", self.slot, self.arch)
    }
}

/// A long-lived compiler handling one request at a time.
pub trait CompilerSession: Send {
    /// Compile one request. Returns once the intermediate file is on disk.
    fn submit(&mut self, request: &CompileRequest) -> Result<()>;

    /// Ask the compiler to exit and wait for it.
    fn terminate(&mut self) -> Result<()>;
}

/// Creates sessions on first use of a key.
pub trait SessionFactory: Send + Sync {
    fn spawn(&self, key: &SessionKey) -> Result<Box<dyn CompilerSession>>;
}

/// Where acknowledgments come from.
enum AckSource {
    /// Read directly on the submitting thread (no timeout).
    Direct(BufReader<ChildStdout>),
    /// Read by a helper thread so the submitter can time out.
    Channel(Receiver<std::result::Result<String, AckError>>),
}

/// Handle to a compiler subprocess.
pub struct ProcessSession {
    key: SessionKey,
    /// The child process.
    child: Child,
    /// Buffered stdin writer, dropped on terminate so the child sees EOF.
    stdin: Option<BufWriter<ChildStdin>>,
    acks: AckSource,
    timeout: Option<Duration>,
    /// Set once the process has been asked to quit or was killed.
    terminated: bool,
}

impl ProcessSession {
    /// Spawn a compiler process from a prepared command.
    pub fn spawn(key: SessionKey, mut command: Command, timeout: Option<Duration>) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Compiler diagnostics go straight to the terminal
            .spawn()
            .map_err(|e| {
                Error::Session(format!(
                    "failed to spawn compiler '{}' for {}: {}",
                    command.get_program().to_string_lossy(),
                    key,
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Session("failed to get compiler stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Session("failed to get compiler stdout".to_string()))?;

        let acks = match timeout {
            None => AckSource::Direct(BufReader::new(stdout)),
            Some(_) => {
                let (tx, rx) = crossbeam_channel::unbounded();
                let mut reader = BufReader::new(stdout);
                thread::Builder::new()
                    .name(format!("nativa-ack-{}-{}", key.slot, key.arch))
                    .spawn(move || {
                        loop {
                            let ack = read_ack(&mut reader);
                            let done = ack.is_err();
                            if tx.send(ack).is_err() || done {
                                break;
                            }
                        }
                    })?;
                AckSource::Channel(rx)
            }
        };

        tracing::debug!("Started compiler session {} (pid {})", key, child.id());

        Ok(Self {
            key,
            child,
            stdin: Some(BufWriter::new(stdin)),
            acks,
            timeout,
            terminated: false,
        })
    }

    fn exit_description(&mut self) -> String {
        match self.child.try_wait() {
            Ok(Some(status)) => format!("compiler exited with {status}"),
            _ => "compiler stopped responding".to_string(),
        }
    }

    fn wait_for_ack(&mut self) -> std::result::Result<String, String> {
        let received = match &mut self.acks {
            AckSource::Direct(reader) => read_ack(reader),
            AckSource::Channel(rx) => match self.timeout {
                Some(timeout) => match rx.recv_timeout(timeout) {
                    Ok(ack) => ack,
                    Err(RecvTimeoutError::Timeout) => {
                        self.kill();
                        return Err(format!(
                            "no acknowledgment within {}s, compiler killed",
                            timeout.as_secs_f64()
                        ));
                    }
                    Err(RecvTimeoutError::Disconnected) => Err(AckError::Eof),
                },
                None => rx.recv().unwrap_or(Err(AckError::Eof)),
            },
        };

        received.map_err(|e| match e {
            AckError::Eof => format!("{} ({})", e, self.exit_description()),
            other => other.to_string(),
        })
    }

    fn kill(&mut self) {
        self.terminated = true;
        self.stdin = None;
        if let Err(e) = self.child.kill() {
            tracing::debug!("Failed to kill compiler session {}: {}", self.key, e);
        }
        let _ = self.child.wait();
    }
}

impl CompilerSession for ProcessSession {
    fn submit(&mut self, request: &CompileRequest) -> Result<()> {
        if self.terminated {
            return Err(Error::Session(format!(
                "compiler session {} has been terminated",
                self.key
            )));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(Error::Session("compiler stdin is closed".to_string()));
        };
        if let Err(e) = write_request(stdin, request) {
            let status = self.exit_description();
            self.kill();
            return Err(Error::Session(format!("failed to send job: {e} ({status})")));
        }

        if let Err(message) = self.wait_for_ack() {
            self.kill();
            return Err(Error::Session(message));
        }

        if !request.intermediate.exists() {
            return Err(Error::Session(format!(
                "compiler acknowledged but did not write {}",
                request.intermediate.display()
            )));
        }

        Ok(())
    }

    fn terminate(&mut self) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.terminated = true;

        if let Some(mut stdin) = self.stdin.take() {
            // The process may already be gone; waiting below reports that.
            let _ = write_quit(&mut stdin);
        }

        let status = self
            .child
            .wait()
            .map_err(|e| Error::Session(format!("failed to wait for compiler {}: {}", self.key, e)))?;
        tracing::debug!("Compiler session {} exited with {}", self.key, status);

        if status.success() {
            Ok(())
        } else {
            Err(Error::Session(format!(
                "compiler session {} exited with {}",
                self.key, status
            )))
        }
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        if !self.terminated {
            self.kill();
        }
    }
}

/// Spawns the configured compiler with per-architecture environment.
pub struct ProcessSessionFactory {
    compiler: PathBuf,
    project_dir: PathBuf,
    opt_level: u8,
    bridge_files: Vec<PathBuf>,
    kernels: FxHashMap<Arch, PathBuf>,
    timeout: Option<Duration>,
}

impl ProcessSessionFactory {
    pub fn new(config: &BuildConfig, compiler: PathBuf) -> Self {
        let kernels = config
            .arch_set()
            .iter()
            .map(|arch| (arch.clone(), config.kernel_path(arch)))
            .collect();

        Self {
            compiler,
            project_dir: config.project_dir.clone(),
            opt_level: config.opt_level(),
            bridge_files: config.bridge_files.iter().map(|f| config.resolve(f)).collect(),
            kernels,
            timeout: config.session_timeout(),
        }
    }

    /// The command a session for `arch` is started with.
    pub fn command(&self, arch: &Arch) -> Result<Command> {
        let kernel = self
            .kernels
            .get(arch)
            .ok_or_else(|| Error::Config(format!("arch `{arch}' is not configured")))?;

        let mut cmd = Command::new(&self.compiler);
        cmd.current_dir(&self.project_dir)
            .env("VM_PLATFORM", "android")
            .env("VM_KERNEL_PATH", kernel)
            .env("VM_OPT_LEVEL", self.opt_level.to_string());

        for bs in &self.bridge_files {
            cmd.arg("--uses-bs").arg(bs);
        }
        cmd.arg("--project_dir")
            .arg(&self.project_dir)
            .arg("--emit-llvm-fast")
            .arg("");

        Ok(cmd)
    }
}

impl SessionFactory for ProcessSessionFactory {
    fn spawn(&self, key: &SessionKey) -> Result<Box<dyn CompilerSession>> {
        let cmd = self.command(&key.arch)?;
        Ok(Box::new(ProcessSession::spawn(key.clone(), cmd, self.timeout)?))
    }
}

type SessionCell = Arc<Mutex<Option<Box<dyn CompilerSession>>>>;

/// Helper to convert PoisonError to our Error type.
fn lock_error<T>(e: PoisonError<T>) -> Error {
    Error::Session(format!("session lock poisoned (thread panicked): {}", e))
}

/// Snapshot of pool activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Sessions created during the run.
    pub spawned: usize,
    /// Sessions currently alive.
    pub live: usize,
    /// Highest number of simultaneously alive sessions.
    pub peak: usize,
}

/// Table of sessions keyed by (slot, arch).
///
/// The table lock only covers finding or inserting a key's cell. Spawning
/// and submitting happen under the per-key cell lock, so concurrent first
/// use of one key creates a single session and distinct keys never wait on
/// each other.
pub struct SessionPool {
    factory: Arc<dyn SessionFactory>,
    table: Mutex<FxHashMap<SessionKey, SessionCell>>,
    spawned: AtomicUsize,
    live: AtomicUsize,
    peak: AtomicUsize,
    closed: AtomicBool,
}

impl SessionPool {
    /// Create an empty pool. No process is started until a key is used.
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            factory,
            table: Mutex::new(FxHashMap::default()),
            spawned: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Get the lease for a key. The session itself starts on first submit.
    pub fn acquire(&self, key: SessionKey) -> Result<SessionLease<'_>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Session("session pool is closed".to_string()));
        }
        let cell = {
            let mut table = self.table.lock().map_err(lock_error)?;
            table.entry(key.clone()).or_default().clone()
        };
        Ok(SessionLease {
            pool: self,
            key,
            cell,
        })
    }

    fn record_spawn(&self) {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);
    }

    /// Current pool statistics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            spawned: self.spawned.load(Ordering::SeqCst),
            live: self.live.load(Ordering::SeqCst),
            peak: self.peak.load(Ordering::SeqCst),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Terminate every live session and wait for it to exit.
    ///
    /// Runs once; later calls are no-ops. Every session is terminated even if
    /// an earlier one fails; the first failure is returned.
    pub fn close_all(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let cells: Vec<(SessionKey, SessionCell)> = self
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();

        let mut first_error = None;
        for (key, cell) in cells {
            let mut guard = cell.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(mut session) = guard.take() else {
                continue;
            };
            tracing::debug!("Terminating compiler session {}", key);
            if let Err(e) = session.terminate() {
                tracing::warn!("Failed to terminate compiler session {}: {}", key, e);
                first_error.get_or_insert(e);
            }
            self.live.fetch_sub(1, Ordering::SeqCst);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for SessionPool {
    fn drop(&mut self) {
        let _ = self.close_all();
    }
}

/// Access to one key's session.
pub struct SessionLease<'a> {
    pool: &'a SessionPool,
    key: SessionKey,
    cell: SessionCell,
}

impl SessionLease<'_> {
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Compile a job on this key's session, starting the session if needed.
    ///
    /// Blocks until the compiler acknowledges. Any failure is reported
    /// against the job's source file and architecture.
    pub fn submit(&self, job: &BuildJob) -> Result<()> {
        let job_error = |message: String| Error::compilation(&job.source, job.arch.as_str(), message);

        let mut guard = self.cell.lock().map_err(lock_error)?;
        if guard.is_none() {
            if self.pool.is_closed() {
                return Err(job_error("session pool is closed".to_string()));
            }
            let session = self
                .pool
                .factory
                .spawn(&self.key)
                .map_err(|e| job_error(format!("failed to start compiler: {e}")))?;
            self.pool.record_spawn();
            *guard = Some(session);
        }

        let session = guard
            .as_mut()
            .ok_or_else(|| job_error("no compiler session".to_string()))?;
        session
            .submit(&CompileRequest::from_job(job))
            .map_err(|e| job_error(e.to_string()))
    }
}
