use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::ide::{self, IdeRegistry};
use crate::pyenv::{self, EnvHandle, Pyenv};
use crate::registry::{Environment, InstallMethod, Registry};
use crate::siteload;
use crate::ui;

const MISC_TEMPLATE: &str = include_str!("../templates/idea/misc.xml");
const MODULE_TEMPLATE: &str = include_str!("../templates/idea/module.iml");
const VENV_CONF_TEMPLATE: &str = include_str!("../templates/idea/venv-conf.xml");

/// Default IDE product whose registry gets the interpreter entry.
pub const DEFAULT_IDE_PREFIX: &str = "PyCharm";

/// Options for provisioning outside a sync run.
#[derive(Debug, Clone)]
pub struct SetupOptions {
    pub version: Option<String>,
    pub install_method: InstallMethod,
    pub no_ide: bool,
    pub ide_prefix: String,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            version: None,
            install_method: InstallMethod::Auto,
            no_ide: false,
            ide_prefix: DEFAULT_IDE_PREFIX.to_string(),
        }
    }
}

/// Provisions one environment: virtualenv, packages, IDE registration.
///
/// All inputs are resolved at construction (auto-detection included) so that
/// `run` only executes; a detection failure surfaces before anything is
/// mutated.
#[derive(Debug)]
pub struct Setup {
    pyenv: Pyenv,
    root: PathBuf,
    name: String,
    version: String,
    install_method: InstallMethod,
    requirements: Vec<String>,
    env_vars: BTreeMap<String, String>,
    no_ide: bool,
    ide_prefix: String,
}

impl Setup {
    /// Provisioning driven by a declared environment (sync install phase).
    pub fn for_environment(
        registry: &Registry,
        environment: &Environment,
        ide_prefix: &str,
        no_ide: bool,
    ) -> Result<Setup> {
        let install_method = environment.install_method.resolve(&environment.root)?;

        Ok(Setup {
            pyenv: Pyenv::new(),
            root: environment.root.clone(),
            name: environment.name.clone(),
            version: environment.version.clone(),
            install_method,
            requirements: environment.requirements.clone(),
            env_vars: registry.env_vars().clone(),
            // externally-managed environments have no project tree to configure
            no_ide: no_ide || install_method == InstallMethod::External,
            ide_prefix: ide_prefix.to_string(),
        })
    }

    /// Provisioning driven by a directory and CLI flags (`denv setup`).
    pub fn from_directory(registry: &Registry, root: PathBuf, opts: SetupOptions) -> Result<Setup> {
        let declared = registry.find_by_root(&root);
        let name = declared
            .map(|env| env.name.clone())
            .unwrap_or_else(|| {
                root.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });

        let install_method = opts.install_method.resolve(&root)?;
        if install_method == InstallMethod::External && declared.is_none() {
            return Err(Error::configuration(format!(
                "externally-managed setup requires a config entry and none was found for {name}"
            )));
        }

        let version = match opts.version {
            Some(version) => version,
            None => pyenv::system_python_version()?,
        };

        Ok(Setup {
            pyenv: Pyenv::new(),
            root,
            name,
            version,
            install_method,
            requirements: declared.map(|env| env.requirements.clone()).unwrap_or_default(),
            env_vars: registry.env_vars().clone(),
            no_ide: opts.no_ide || install_method == InstallMethod::External,
            ide_prefix: opts.ide_prefix,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run(&self) -> Result<()> {
        let handle = self.create_env()?;
        self.install(&handle)?;

        match self.configure_ide(&handle) {
            Ok(()) => {}
            // a broken IDE registry must not fail provisioning itself
            Err(err @ Error::RegistryIo { .. }) => ui::error(err),
            Err(other) => return Err(other),
        }

        Ok(())
    }

    fn create_env(&self) -> Result<EnvHandle> {
        if !self.pyenv.has_env(&self.name)? {
            self.pyenv
                .create_virtualenv(&self.version, &self.name, &self.install_env())?;
        }
        if self.install_method != InstallMethod::External {
            self.pyenv.set_local(&self.root, &self.name)?;
        }
        self.pyenv.env(&self.name)
    }

    fn install(&self, handle: &EnvHandle) -> Result<()> {
        let progress = ui::Progress::new("Installing", format!("{} ({})", self.name, self.install_method));

        let result = self.run_installer(handle);
        match &result {
            Ok(()) => progress.success("Installed"),
            Err(err) => progress.fail("Failed", err),
        }
        result?;

        self.install_extra_requirements(handle)
    }

    fn run_installer(&self, handle: &EnvHandle) -> Result<()> {
        let env_vars = self.install_env();
        match self.install_method {
            InstallMethod::Pip => {
                let root = self.root.to_string_lossy();
                handle.pip(&["install", "-e", root.as_ref()], &env_vars)
            }
            InstallMethod::Poetry => self.run_poetry(handle, &env_vars),
            InstallMethod::MonoRepo => {
                let prefix = handle.prefix().to_string_lossy().into_owned();
                let mut command = std::process::Command::new("mre");
                command
                    .args(["install", "--virtual-env", &prefix])
                    .current_dir(&self.root)
                    .envs(&env_vars);
                pyenv::run(&mut command)
            }
            InstallMethod::Requirements => {
                let mut args: Vec<String> = vec!["install".into()];
                args.push("-r".into());
                args.push(self.root.join("requirements.txt").to_string_lossy().into_owned());
                if self.root.join("test-requirements.txt").exists() {
                    args.push("-r".into());
                    args.push(
                        self.root
                            .join("test-requirements.txt")
                            .to_string_lossy()
                            .into_owned(),
                    );
                }
                if self.root.join("constraints.txt").exists() {
                    args.push("-c".into());
                    args.push(self.root.join("constraints.txt").to_string_lossy().into_owned());
                }
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                handle.pip(&args, &env_vars)
            }
            // packages are managed elsewhere; only declared extras apply
            InstallMethod::External => Ok(()),
            InstallMethod::Auto => unreachable!("auto-detect resolves at construction"),
        }
    }

    fn run_poetry(&self, handle: &EnvHandle, env_vars: &BTreeMap<String, String>) -> Result<()> {
        let poetry = shellexpand::tilde("~/.poetry/bin/poetry").into_owned();
        let mut command = std::process::Command::new(poetry);
        command
            .arg("install")
            .current_dir(&self.root)
            .envs(env_vars)
            .env("VIRTUAL_ENV", handle.prefix());
        pyenv::run(&mut command)
    }

    fn install_extra_requirements(&self, handle: &EnvHandle) -> Result<()> {
        if self.requirements.is_empty() {
            return Ok(());
        }

        let mut args = vec!["install"];
        args.extend(self.requirements.iter().map(String::as_str));
        handle.pip(&args, &self.install_env())
    }

    /// Variables for every install command: the config's injected variables
    /// plus the loader opt-out so installer subprocesses see a clean path.
    fn install_env(&self) -> BTreeMap<String, String> {
        let mut env_vars = self.env_vars.clone();
        env_vars.insert(siteload::OPT_OUT_ENV.to_string(), "1".to_string());
        env_vars
    }

    fn configure_ide(&self, handle: &EnvHandle) -> Result<()> {
        if self.no_ide {
            return Ok(());
        }

        self.write_project_files()?;

        let fragment = render_template(
            VENV_CONF_TEMPLATE,
            &self.name,
            &self.version,
            Some(handle.prefix()),
        );
        let entry = ide::entry_name(&self.version, &self.name);

        match IdeRegistry::locate(&self.ide_prefix) {
            None => {
                ui::warn(format!(
                    "Could not locate the {} interpreter registry.\n\
                     Either register the interpreter from within the IDE or place this entry\n\
                     in jdk.table.xml once you find it:",
                    self.ide_prefix
                ));
                println!("{fragment}");
            }
            Some(path) => {
                let mut registry = IdeRegistry::open(&path);
                registry.upsert(&entry, &fragment)?;
                if registry.save()? {
                    ui::status("Updating", path.display());
                }
            }
        }

        Ok(())
    }

    /// Create the per-project IDE files, each only when absent.
    fn write_project_files(&self) -> Result<()> {
        let idea_dir = self.root.join(".idea");
        fs::create_dir_all(&idea_dir)?;

        let name_file = idea_dir.join(".name");
        if !name_file.exists() {
            fs::write(&name_file, &self.name)?;
        }

        let misc = idea_dir.join("misc.xml");
        if !misc.exists() {
            fs::write(
                &misc,
                render_template(MISC_TEMPLATE, &self.name, &self.version, None),
            )?;
        }

        let module = idea_dir.join(format!("{}.iml", self.name));
        if !module.exists() {
            fs::write(&module, MODULE_TEMPLATE)?;
        }

        Ok(())
    }
}

fn render_template(template: &str, name: &str, version: &str, prefix: Option<&Path>) -> String {
    let mut rendered = template
        .replace("{{name}}", name)
        .replace("{{version}}", version);
    if let Some(prefix) = prefix {
        rendered = rendered.replace("{{prefix}}", &prefix.to_string_lossy());
    }
    rendered
}
