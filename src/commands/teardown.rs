use anyhow::{Context, Result};
use std::fs;

use crate::ide::{self, IdeRegistry};
use crate::pyenv::Pyenv;
use crate::registry::Registry;
use crate::{commands, ui};

pub fn execute(
    registry: &Registry,
    directory: Option<String>,
    version: Option<String>,
    ide_prefix: String,
) -> Result<()> {
    let root = commands::resolve_root(directory.as_deref())?;
    let name = registry
        .find_by_root(&root)
        .map(|env| env.name.clone())
        .or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .context("Cannot derive an environment name from the directory")?;

    let mut version = version;

    let idea_dir = root.join(".idea");
    if idea_dir.exists() {
        ui::status("Removing", idea_dir.display());
        // the registry entry name embeds the version; recover it before the
        // project files disappear
        let misc = idea_dir.join("misc.xml");
        if version.is_none() && misc.exists() {
            let contents = fs::read_to_string(&misc)?;
            version = ide::extract_version_from_misc(&contents);
        }
        fs::remove_dir_all(&idea_dir)
            .with_context(|| format!("Failed to remove {:?}", idea_dir))?;
    }

    let pin_file = root.join(".python-version");
    if pin_file.exists() {
        ui::status("Removing", pin_file.display());
        fs::remove_file(&pin_file)
            .with_context(|| format!("Failed to remove {:?}", pin_file))?;
    }

    let pyenv = Pyenv::new();
    let versions = pyenv.versions()?;
    if versions.iter().any(|v| v == &name) {
        if version.is_none() {
            // `pyenv versions` lists virtualenvs as `X.Y.Z/envs/<name>`
            version = versions
                .iter()
                .filter(|v| v.contains('/'))
                .find(|v| v.ends_with(&format!("/{name}")) || v.contains(&name))
                .and_then(|v| v.split('/').next())
                .map(str::to_string);
        }
        pyenv.delete_virtualenv(&name)?;
    }

    if let Some(version) = version {
        let entry = ide::entry_name(&version, &name);
        match IdeRegistry::locate(&ide_prefix) {
            Some(path) => {
                let mut ide_registry = IdeRegistry::open(&path);
                ide_registry.remove(&entry)?;
                if ide_registry.save()? {
                    ui::status("Removing", format!("'{entry}' from {}", path.display()));
                }
            }
            None => {
                ui::warn(format!(
                    "Could not locate the {ide_prefix} interpreter registry; \
                     remove the entry '{entry}' by hand if it exists."
                ));
            }
        }
    }

    ui::success("Teardown", format!("Environment '{name}' cleaned up."));
    Ok(())
}
