//! In-process stand-ins for the compiler and assembler.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::arch::Arch;
use crate::error::{Error, Result};

use super::assembler::Assembler;
use super::protocol::CompileRequest;
use super::session::{CompilerSession, SessionFactory, SessionKey};

#[derive(Default)]
struct Counters {
    spawned: AtomicUsize,
    submitted: AtomicUsize,
    terminated: AtomicUsize,
}

/// Creates sessions that write the intermediate file themselves.
#[derive(Default)]
pub struct MockFactory {
    counters: Arc<Counters>,
    fail_on: Option<String>,
}

impl MockFactory {
    /// Sessions reject any source whose file name is `name`.
    pub fn failing_on(name: &str) -> Self {
        Self {
            fail_on: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn spawned(&self) -> usize {
        self.counters.spawned.load(Ordering::SeqCst)
    }

    /// Successfully compiled requests.
    pub fn submitted(&self) -> usize {
        self.counters.submitted.load(Ordering::SeqCst)
    }

    pub fn terminated(&self) -> usize {
        self.counters.terminated.load(Ordering::SeqCst)
    }
}

impl SessionFactory for MockFactory {
    fn spawn(&self, _key: &SessionKey) -> Result<Box<dyn CompilerSession>> {
        self.counters.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            counters: Arc::clone(&self.counters),
            fail_on: self.fail_on.clone(),
        }))
    }
}

struct MockSession {
    counters: Arc<Counters>,
    fail_on: Option<String>,
}

impl CompilerSession for MockSession {
    fn submit(&mut self, request: &CompileRequest) -> Result<()> {
        let name = request
            .source
            .file_name()
            .map(|n| n.to_string_lossy().to_string());
        if name.is_some() && name == self.fail_on {
            return Err(Error::Session("syntax error".to_string()));
        }
        if let Some(parent) = request.intermediate.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&request.intermediate, format!("{}\n", request.symbol))?;
        self.counters.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn terminate(&mut self) -> Result<()> {
        self.counters.terminated.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// "Assembles" by copying the intermediate to the object path.
pub struct CopyAssembler;

impl Assembler for CopyAssembler {
    fn assemble(&self, _arch: &Arch, intermediate: &Path, object: &Path) -> Result<()> {
        fs::copy(intermediate, object)?;
        Ok(())
    }
}
