use anyhow::{Context, Result};

use crate::registry::{InstallMethod, Registry};
use crate::setup::{Setup, SetupOptions};
use crate::{commands, ui};

pub fn execute(
    registry: &Registry,
    version: Option<String>,
    directory: Option<String>,
    install_method: InstallMethod,
    no_ide: bool,
    ide_prefix: String,
) -> Result<()> {
    let root = commands::resolve_root(directory.as_deref())?;

    let setup = Setup::from_directory(
        registry,
        root,
        SetupOptions {
            version,
            install_method,
            no_ide,
            ide_prefix,
        },
    )?;

    let name = setup.name().to_string();
    setup
        .run()
        .with_context(|| format!("Failed to set up environment '{name}'"))?;

    ui::success("Setup", format!("Environment '{name}' is ready."));
    Ok(())
}
