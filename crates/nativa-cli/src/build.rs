//! Build command implementation for nativa CLI.
//!
//! Compiles stale sources, links the payload libraries and regenerates the
//! Java stubs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use nativa_core::{BuildConfig, BuildMode, BuildRun, CONFIG_FILE_NAME};

use crate::colors;
use crate::output::{self, ProgressPrinter};

/// Load the configuration, applying command-line overrides.
pub fn load_config(
    config_path: Option<&str>,
    release: bool,
    jobs: Option<usize>,
) -> anyhow::Result<BuildConfig> {
    let path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
    if !path.exists() {
        anyhow::bail!("Configuration file not found: {}", path.display());
    }

    let mut config = BuildConfig::load(&path)?;
    if release {
        config.mode = BuildMode::Release;
    }
    if let Some(jobs) = jobs {
        if jobs == 0 {
            anyhow::bail!("--jobs must be at least 1");
        }
        config.jobs = Some(jobs);
    }
    Ok(config)
}

fn print_header(verb: &str, config: &BuildConfig, project_dir: &Path) {
    let archs: Vec<&str> = config.archs.iter().map(|a| a.as_str()).collect();
    println!(
        "\n{}{}{} {}{}{} [{}] ({})",
        colors::BOLD,
        verb,
        colors::RESET,
        colors::CYAN,
        config.name,
        colors::RESET,
        archs.join(", "),
        project_dir.display()
    );
}

/// Execute a full build.
pub fn execute(config_path: Option<&str>, release: bool, jobs: Option<usize>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path, release, jobs)?;
    print_header("Building", &config, &config.project_dir);

    let project_dir = config.project_dir.clone();
    let slots = config.slot_count();
    let mut run = BuildRun::new(config)?;
    run.set_callback(Arc::new(ProgressPrinter::new(&project_dir)));

    let summary = run.run()?;
    output::diagnostics(run.diagnostics());

    println!(
        "\n{}Finished{} in {:.2}s: {} compiled, {} up to date, {} libraries linked, {} stubs written {}({} slots, {} compiler sessions){}",
        colors::GREEN,
        colors::RESET,
        start.elapsed().as_secs_f64(),
        summary.outcome.compiled,
        summary.outcome.reused,
        summary.links.iter().filter(|l| l.relinked).count(),
        summary.stubs.written.len(),
        colors::DIM,
        slots,
        summary.outcome.sessions.spawned,
        colors::RESET
    );

    Ok(())
}
