use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::cli::PathAction;
use crate::pathstore::{self, PathStore};
use crate::pyenv::Pyenv;
use crate::registry::{InstallMethod, Registry};
use crate::siteload::{self, LoadedEntry};
use crate::ui;

/// One row of `pip list --format json` output.
#[derive(Debug, Deserialize)]
struct PipPackage {
    name: String,
}

pub fn execute(
    registry: &Registry,
    action: PathAction,
    targets: Vec<String>,
    env: Option<String>,
    effective: bool,
) -> Result<()> {
    let mutating = matches!(
        action,
        PathAction::Append | PathAction::Prepend | PathAction::Remove
    );
    if mutating && targets.is_empty() {
        anyhow::bail!("missing target: pass at least one directory or environment name");
    }

    let name = source_env_name(registry, env)?;
    let pyenv = Pyenv::new();
    let handle = pyenv
        .env(&name)
        .with_context(|| format!("Environment '{name}' is not installed"))?;
    let site_dir = handle.site_packages()?;

    let mut store = PathStore::for_site_packages(&site_dir);
    store.load()?;

    match action {
        PathAction::Show => {
            if effective {
                let entries = siteload::load_entries(&site_dir);
                for path in siteload::replay(&entries, Vec::new()) {
                    println!("{}", path.display());
                }
                for entry in &entries {
                    if let LoadedEntry::Statement(statement) = entry {
                        println!("# executes: {statement}");
                    }
                }
            } else {
                println!("{}", serde_json::to_string_pretty(store.directives())?);
            }
            return Ok(());
        }

        PathAction::Clear => {
            store.clear();
        }

        PathAction::Remove => {
            for target in &targets {
                let resolved = pathstore::resolve_target(registry, &pyenv, target)?;
                store.remove(&resolved);
            }
        }

        PathAction::Append | PathAction::Prepend => {
            for target in &targets {
                let resolved = pathstore::resolve_target(registry, &pyenv, target)?;
                match action {
                    PathAction::Append => store.append(resolved),
                    _ => store.prepend(resolved),
                }
            }
        }

        PathAction::Infer => {
            let inferred = infer_targets(registry, &handle, &name)?;
            if inferred.is_empty() {
                ui::info("No installed packages match a known environment root.");
            }
            for directory in inferred {
                ui::status("Adding", directory.display());
                store.append(directory);
            }
        }
    }

    store.save()?;
    if siteload::ensure_shim_installed(&site_dir)? {
        ui::status("Installing", format!("loader shim in {}", site_dir.display()));
    }

    Ok(())
}

/// Pick the environment the command operates on: the explicit flag, the
/// current directory's declared environment, or the directory basename.
fn source_env_name(registry: &Registry, env: Option<String>) -> Result<String> {
    if let Some(name) = env {
        return Ok(name);
    }

    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    if let Some(environment) = registry.find_by_root(&cwd) {
        return Ok(environment.name.clone());
    }

    cwd.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("Cannot derive an environment name from the current directory")
}

/// Match installed package names against environment roots in the configured
/// lookup directories. Package and directory names are compared after
/// lowercasing and mapping `-` to `_`, the usual distribution-name blur.
fn infer_targets(
    registry: &Registry,
    handle: &crate::pyenv::EnvHandle,
    own_name: &str,
) -> Result<Vec<PathBuf>> {
    let mut name_to_path: BTreeMap<String, PathBuf> = BTreeMap::new();
    for lookup_dir in registry.lookup_dirs() {
        let Ok(entries) = std::fs::read_dir(lookup_dir) else {
            continue;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_dir() || InstallMethod::detect(&path).is_err() {
                continue;
            }
            if let Some(dir_name) = path.file_name().and_then(|n| n.to_str()) {
                name_to_path.insert(normalize_package_name(dir_name), path);
            }
        }
    }

    let listing = handle.pip_out(&["list", "--no-index", "--format", "json"])?;
    let packages: Vec<PipPackage> =
        serde_json::from_str(&listing).context("Failed to parse pip list output")?;

    let own = normalize_package_name(own_name);
    let mut inferred = Vec::new();
    for package in packages {
        let normalized = normalize_package_name(&package.name);
        if normalized == own {
            continue;
        }
        if let Some(path) = name_to_path.get(&normalized) {
            inferred.push(path.clone());
        }
    }

    Ok(inferred)
}

fn normalize_package_name(name: &str) -> String {
    name.to_lowercase().replace('-', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_package_name() {
        assert_eq!(normalize_package_name("My-Package"), "my_package");
        assert_eq!(normalize_package_name("plain"), "plain");
    }
}
