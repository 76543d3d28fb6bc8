use anyhow::Result;
use std::path::PathBuf;

use crate::registry::Registry;
use crate::sync::{SyncAction, SyncRunner};
use crate::util::xdg;
use crate::{commands, ui};

pub fn execute(
    registry: &Registry,
    action: SyncAction,
    directory: Option<String>,
    bin_dir: Option<PathBuf>,
    ide_prefix: String,
    no_ide: bool,
) -> Result<()> {
    if registry.is_empty() {
        ui::info("No environments declared; nothing to sync.");
        return Ok(());
    }

    let scope = match directory {
        Some(dir) => Some(commands::resolve_root(Some(&dir))?),
        None => None,
    };

    let export_dir = match bin_dir {
        Some(dir) => dir,
        None => xdg::export_bin_dir()?,
    };

    let selected = match &scope {
        Some(_) => 1,
        None => registry.len(),
    };

    let runner = SyncRunner::new(registry, action, scope, export_dir, ide_prefix, no_ide);
    let report = runner.run()?;

    if report.is_clean() {
        ui::success("Sync", format!("{selected} environment(s) reconciled."));
        Ok(())
    } else {
        for issue in report.issues() {
            ui::error(format!(
                "{}: {} phase: {}",
                issue.environment, issue.phase, issue.message
            ));
        }
        anyhow::bail!("Sync finished with {} error(s).", report.issues().len());
    }
}
