use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};
use crate::ui;

/// Python snippet answering "where do packages for this interpreter live".
const SITE_PACKAGES_SNIPPET: &str =
    "import site, sys; sys.stdout.write(site.getsitepackages()[0])";

/// Thin wrapper over the `pyenv` CLI.
///
/// Everything denv knows about creating, deleting and locating virtualenvs
/// goes through here; the rest of the crate never spawns `pyenv` directly.
#[derive(Debug, Clone, Default)]
pub struct Pyenv;

impl Pyenv {
    pub fn new() -> Self {
        Self
    }

    /// All installed versions and virtualenvs, one name per line.
    pub fn versions(&self) -> Result<Vec<String>> {
        let out = run_out(Command::new("pyenv").args(["versions", "--bare"]))?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn has_env(&self, name: &str) -> Result<bool> {
        Ok(self.versions()?.iter().any(|v| v == name))
    }

    pub fn prefix(&self, name: &str) -> Result<PathBuf> {
        let out = run_out(Command::new("pyenv").args(["prefix", name]))?;
        Ok(PathBuf::from(out))
    }

    pub fn create_virtualenv(
        &self,
        version: &str,
        name: &str,
        env_vars: &BTreeMap<String, String>,
    ) -> Result<()> {
        run(
            Command::new("pyenv")
                .args(["virtualenv", version, name])
                .envs(env_vars),
        )
    }

    pub fn delete_virtualenv(&self, name: &str) -> Result<()> {
        run(Command::new("pyenv").args(["virtualenv-delete", "-f", name]))
    }

    /// Pin `name` as the interpreter for `root` (writes `.python-version`).
    pub fn set_local(&self, root: &Path, name: &str) -> Result<()> {
        run(Command::new("pyenv")
            .args(["local", name])
            .current_dir(root))
    }

    /// Handle on one virtualenv's interpreter tree.
    pub fn env(&self, name: &str) -> Result<EnvHandle> {
        Ok(EnvHandle {
            prefix: self.prefix(name)?,
        })
    }
}

/// One virtualenv's install location.
#[derive(Debug, Clone)]
pub struct EnvHandle {
    prefix: PathBuf,
}

impl EnvHandle {
    pub fn from_prefix(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.prefix.join("bin")
    }

    /// Ask the interpreter itself where its site-packages directory is.
    pub fn site_packages(&self) -> Result<PathBuf> {
        let python = self.bin_dir().join("python");
        let out = run_out(Command::new(python).args(["-c", SITE_PACKAGES_SNIPPET]))?;
        Ok(PathBuf::from(out))
    }

    pub fn pip(&self, args: &[&str], env_vars: &BTreeMap<String, String>) -> Result<()> {
        let pip = self.bin_dir().join("pip");
        run(Command::new(pip).args(args).envs(env_vars))
    }

    pub fn pip_out(&self, args: &[&str]) -> Result<String> {
        let pip = self.bin_dir().join("pip");
        run_out(Command::new(pip).args(args))
    }
}

/// Version reported by whatever `python` is on PATH, e.g. "3.11.4".
pub fn system_python_version() -> Result<String> {
    let out = run_out(Command::new("python").arg("--version"))?;
    out.split_whitespace()
        .nth(1)
        .map(str::to_string)
        .ok_or_else(|| Error::ExternalTool {
            command: "python --version".to_string(),
            status: format!("unexpected output {out:?}"),
        })
}

fn display_command(command: &Command) -> String {
    let mut parts = vec![command.get_program().to_string_lossy().into_owned()];
    parts.extend(
        command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned()),
    );
    parts.join(" ")
}

/// Run a command with inherited stdio, announcing it first.
pub(crate) fn run(command: &mut Command) -> Result<()> {
    let rendered = display_command(command);
    ui::status("Running", &rendered);
    tracing::debug!(command = %rendered, "spawning");

    let status = command.status()?;
    if !status.success() {
        return Err(Error::ExternalTool {
            command: rendered,
            status: status.to_string(),
        });
    }
    Ok(())
}

/// Run a command silently, capturing trimmed stdout.
fn run_out(command: &mut Command) -> Result<String> {
    let rendered = display_command(command);
    tracing::debug!(command = %rendered, "spawning");

    let output = command.output()?;
    if !output.status.success() {
        return Err(Error::ExternalTool {
            command: rendered,
            status: output.status.to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn install_stub(dir: &Path, name: &str, script: &str) {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn with_stub_path(dir: &Path) -> String {
        let original = std::env::var("PATH").unwrap_or_default();
        let stubbed = format!("{}:{}", dir.display(), original);
        std::env::set_var("PATH", &stubbed);
        original
    }

    #[test]
    #[serial]
    fn test_versions_parses_bare_output() {
        let temp = TempDir::new().unwrap();
        install_stub(temp.path(), "pyenv", "printf '3.8.2\\nbilling\\napi\\n'");
        let original_path = with_stub_path(temp.path());

        let versions = Pyenv::new().versions().unwrap();
        assert_eq!(versions, vec!["3.8.2", "billing", "api"]);
        assert!(Pyenv::new().has_env("billing").unwrap());
        assert!(!Pyenv::new().has_env("missing").unwrap());

        std::env::set_var("PATH", original_path);
    }

    #[test]
    #[serial]
    fn test_nonzero_exit_is_external_tool_error() {
        let temp = TempDir::new().unwrap();
        install_stub(temp.path(), "pyenv", "exit 3");
        let original_path = with_stub_path(temp.path());

        let result = Pyenv::new().versions();
        assert!(matches!(result, Err(Error::ExternalTool { .. })));

        std::env::set_var("PATH", original_path);
    }

    #[test]
    #[serial]
    fn test_system_python_version() {
        let temp = TempDir::new().unwrap();
        install_stub(temp.path(), "python", "echo 'Python 3.11.4'");
        let original_path = with_stub_path(temp.path());

        assert_eq!(system_python_version().unwrap(), "3.11.4");

        std::env::set_var("PATH", original_path);
    }

    #[test]
    fn test_env_handle_paths() {
        let handle = EnvHandle::from_prefix("/envs/billing");
        assert_eq!(handle.bin_dir(), PathBuf::from("/envs/billing/bin"));
    }
}
