use anyhow::Result;
use std::io::Write;
use std::path::Path;

use crate::siteload::{self, LoaderConfig};

/// Compute and print the loader actions for one site directory.
///
/// Invoked by the sitecustomize shim at interpreter start; prints nothing
/// when the opt-out variable is set. Never fails the caller: the worst a
/// broken state file produces is stderr diagnostics and fewer lines.
pub fn execute(site_dir: &Path) -> Result<()> {
    let config = LoaderConfig::from_env();
    if config.disabled {
        return Ok(());
    }

    let entries = siteload::load_entries(site_dir);
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(siteload::emit(&entries).as_bytes())?;
    Ok(())
}
