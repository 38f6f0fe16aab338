//! Clean command: remove the build directory.

use crate::build::load_config;
use crate::colors;
use crate::output;

pub fn execute(config_path: Option<&str>, release: bool) -> anyhow::Result<()> {
    let config = load_config(config_path, release, None)?;
    let root = nativa_core::BuildDirs::for_config(&config).root;

    if nativa_core::clean(&config)? {
        output::action("Delete", &root.display().to_string());
    } else {
        println!("{}Nothing to clean{}", colors::DIM, colors::RESET);
    }
    Ok(())
}
