//! Second-stage assembly of compiler intermediates into object files.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::arch::Arch;
use crate::error::{Error, Result};

/// Turns an intermediate (assembly) file into an object file.
pub trait Assembler: Send + Sync {
    fn assemble(&self, arch: &Arch, intermediate: &Path, object: &Path) -> Result<()>;
}

/// Runs `cc <asflags> -c <intermediate> -o <object>`.
pub struct CcAssembler {
    cc: PathBuf,
    flags: Box<dyn Fn(&Arch) -> Vec<String> + Send + Sync>,
}

impl CcAssembler {
    pub fn new(cc: PathBuf, flags: impl Fn(&Arch) -> Vec<String> + Send + Sync + 'static) -> Self {
        Self {
            cc,
            flags: Box::new(flags),
        }
    }

    fn command(&self, arch: &Arch, intermediate: &Path, object: &Path) -> Command {
        let mut cmd = Command::new(&self.cc);
        cmd.args((self.flags)(arch))
            .arg("-c")
            .arg(intermediate)
            .arg("-o")
            .arg(object);
        cmd
    }
}

impl Assembler for CcAssembler {
    fn assemble(&self, arch: &Arch, intermediate: &Path, object: &Path) -> Result<()> {
        let output = self
            .command(arch, intermediate, object)
            .output()
            .map_err(|e| {
                Error::Toolchain(format!("failed to run {}: {}", self.cc.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::compilation(
                intermediate,
                arch.as_str(),
                format!("assembler exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        Ok(())
    }
}
