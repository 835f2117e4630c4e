//! Init command - write an example stockguard.toml

use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use stockguard::config::init_config;

/// Run the init command
pub fn run(dir: &Path, force: bool) -> Result<()> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Path does not exist: {}", dir.display()))?;

    if !dir.is_dir() {
        anyhow::bail!("Path is not a directory: {}", dir.display());
    }

    let path = init_config(&dir, force)?;
    println!(
        "{} Created {}",
        style("✓").green(),
        style(path.display()).cyan()
    );
    println!(
        "\nNext: {} to train a model",
        style("stockguard train <records.json>").bold()
    );
    Ok(())
}
