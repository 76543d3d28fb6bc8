use anyhow::{Context, Result};

use crate::cli::{Cli, Commands};
use crate::registry::{self, Registry};
use crate::util::xdg;

mod export;
mod pythonpath;
mod setup;
mod site_load;
mod sync;
mod teardown;

pub fn execute(cli: Cli) -> Result<()> {
    // The whole run works off one registry snapshot; a malformed config
    // aborts here, before anything is touched.
    let config_path = xdg::config_file()?;
    let raw = registry::load_config_file(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    let registry = Registry::load(raw)?;

    match cli.command {
        Commands::Sync {
            action,
            directory,
            bin_dir,
            ide_prefix,
            no_ide,
        } => sync::execute(&registry, action, directory, bin_dir, ide_prefix, no_ide),

        Commands::Setup {
            version,
            directory,
            install_method,
            no_ide,
            ide_prefix,
        } => setup::execute(
            &registry,
            version,
            directory,
            install_method,
            no_ide,
            ide_prefix,
        ),

        Commands::Pythonpath {
            action,
            targets,
            env,
            effective,
        } => pythonpath::execute(&registry, action, targets, env, effective),

        Commands::Export {
            env,
            bin_name,
            bin_dir,
        } => export::execute(&env, &bin_name, bin_dir),

        Commands::Teardown {
            directory,
            version,
            ide_prefix,
        } => teardown::execute(&registry, directory, version, ide_prefix),

        Commands::SiteLoad { site_dir } => site_load::execute(&site_dir),
    }
}

/// Resolve an optional directory argument to a canonical environment root.
pub(crate) fn resolve_root(directory: Option<&str>) -> Result<std::path::PathBuf> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    Ok(match directory {
        Some(dir) => registry::normalize_path(dir, &cwd),
        None => cwd,
    })
}
