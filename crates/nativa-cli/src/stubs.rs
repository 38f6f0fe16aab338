//! Stubs command: regenerate Java stubs from existing class maps.

use nativa_core::{BuildDirs, generate_stubs};

use crate::build::load_config;
use crate::colors;
use crate::output;

pub fn execute(config_path: Option<&str>, release: bool) -> anyhow::Result<()> {
    let config = load_config(config_path, release, None)?;
    let dirs = BuildDirs::for_config(&config);

    let (report, diagnostics) = generate_stubs(&config, &dirs)?;
    for path in &report.written {
        output::action("Create", &path.display().to_string());
    }
    for path in &report.pruned {
        output::action("Remove", &path.display().to_string());
    }
    output::diagnostics(&diagnostics);

    println!(
        "{}Stubs{} {} written, {} unchanged, {} removed",
        colors::GREEN,
        colors::RESET,
        report.written.len(),
        report.unchanged.len(),
        report.pruned.len()
    );
    Ok(())
}
