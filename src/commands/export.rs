use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::error::Error;
use crate::export::export_binary;
use crate::pyenv::Pyenv;
use crate::sync::report_export;
use crate::util::xdg;

pub fn execute(env: &str, bin_name: &str, bin_dir: Option<PathBuf>) -> Result<()> {
    let pyenv = Pyenv::new();
    let handle = pyenv
        .env(env)
        .with_context(|| format!("Environment '{env}' is not installed"))?;

    let export_dir = match bin_dir {
        Some(dir) => dir,
        None => xdg::export_bin_dir()?,
    };

    let status = export_binary(&handle.bin_dir(), bin_name, &export_dir)?;
    report_export(bin_name, &status);

    if status.is_conflict() {
        return Err(Error::ExportConflict(format!(
            "'{bin_name}' is already taken in {}",
            export_dir.display()
        ))
        .into());
    }

    Ok(())
}
