use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;

use crate::error::{Error, Result};
use crate::export::{self, ExportStatus};
use crate::pathstore::{self, DirectiveMode, PathStore};
use crate::pyenv::Pyenv;
use crate::registry::{Environment, InstallMethod, Registry};
use crate::setup::Setup;
use crate::siteload;
use crate::ui;

/// Which reconciliation phases a sync run executes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SyncAction {
    /// Every phase in order: setup, pythonpath, export
    #[default]
    All,
    /// Provision the virtualenv, install packages, register with the IDE
    Setup,
    /// Rewrite the injected search-path directives
    Pythonpath,
    /// Reconcile exported binary symlinks
    Export,
}

impl SyncAction {
    fn includes(self, phase: SyncPhase) -> bool {
        match self {
            SyncAction::All => true,
            SyncAction::Setup => phase == SyncPhase::Install,
            SyncAction::Pythonpath => phase == SyncPhase::Pythonpath,
            SyncAction::Export => phase == SyncPhase::Export,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Install,
    Pythonpath,
    Export,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPhase::Install => write!(f, "install"),
            SyncPhase::Pythonpath => write!(f, "pythonpath"),
            SyncPhase::Export => write!(f, "export"),
        }
    }
}

/// One recorded failure, scoped to an environment and phase.
#[derive(Debug)]
pub struct SyncIssue {
    pub environment: String,
    pub phase: SyncPhase,
    pub message: String,
}

/// Collected outcome of a sync run.
///
/// Failures never stop the run; they are gathered here so the command can
/// print one environment-scoped diagnostic per issue and pick the exit code.
#[derive(Debug, Default)]
pub struct SyncReport {
    issues: Vec<SyncIssue>,
}

impl SyncReport {
    fn record(&mut self, environment: &str, phase: SyncPhase, error: &Error) {
        self.issues.push(SyncIssue {
            environment: environment.to_string(),
            phase,
            message: error.to_string(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues(&self) -> &[SyncIssue] {
        &self.issues
    }
}

/// Drives reconciliation across the registry.
///
/// Environments are processed strictly sequentially in declaration order;
/// for each one the selected phases run in fixed order. A failing phase is
/// recorded and the run moves on: one broken environment must not hold the
/// rest hostage, and re-running sync is the recovery path.
pub struct SyncRunner<'a> {
    registry: &'a Registry,
    pyenv: Pyenv,
    action: SyncAction,
    scope: Option<PathBuf>,
    export_dir: PathBuf,
    ide_prefix: String,
    no_ide: bool,
}

impl<'a> SyncRunner<'a> {
    pub fn new(
        registry: &'a Registry,
        action: SyncAction,
        scope: Option<PathBuf>,
        export_dir: PathBuf,
        ide_prefix: String,
        no_ide: bool,
    ) -> Self {
        Self {
            registry,
            pyenv: Pyenv::new(),
            action,
            scope,
            export_dir,
            ide_prefix,
            no_ide,
        }
    }

    pub fn run(&self) -> Result<SyncReport> {
        if let Some(scope) = &self.scope {
            if self.registry.find_by_root(scope).is_none() {
                return Err(Error::configuration(format!(
                    "no declared environment at {}",
                    scope.display()
                )));
            }
        }

        let mut report = SyncReport::default();

        for environment in self.registry.environments() {
            if let Some(scope) = &self.scope {
                if scope != &environment.root {
                    continue;
                }
            }

            ui::status("Syncing", &environment.name);

            if self.action.includes(SyncPhase::Install) {
                if let Err(err) = self.sync_install(environment) {
                    ui::error(format!("{}: install: {err}", environment.name));
                    report.record(&environment.name, SyncPhase::Install, &err);
                }
            }

            if self.action.includes(SyncPhase::Pythonpath) {
                if let Err(err) = self.sync_pythonpath(environment, &mut report) {
                    ui::error(format!("{}: pythonpath: {err}", environment.name));
                    report.record(&environment.name, SyncPhase::Pythonpath, &err);
                }
            }

            if self.action.includes(SyncPhase::Export) {
                self.sync_exports(environment, &mut report);
            }
        }

        Ok(report)
    }

    fn sync_install(&self, environment: &Environment) -> Result<()> {
        Setup::for_environment(self.registry, environment, &self.ide_prefix, self.no_ide)?.run()
    }

    /// Clear-then-replay the declared directives, in declared order.
    ///
    /// Skipped for externally-managed environments: their interpreter tree is
    /// not ours to write into.
    fn sync_pythonpath(&self, environment: &Environment, report: &mut SyncReport) -> Result<()> {
        if environment.install_method == InstallMethod::External {
            return Ok(());
        }

        let handle = self.pyenv.env(&environment.name)?;
        let site_dir = handle.site_packages()?;
        siteload::ensure_shim_installed(&site_dir)?;

        let mut store = PathStore::for_site_packages(&site_dir);
        store.clear();

        for directive in &environment.pythonpath {
            match pathstore::resolve_target(self.registry, &self.pyenv, &directive.target) {
                Ok(resolved) => match directive.mode {
                    DirectiveMode::Append => store.append(resolved),
                    DirectiveMode::Prepend => store.prepend(resolved),
                },
                // one unresolvable directive loses only itself
                Err(err) => {
                    ui::error(format!("{}: pythonpath: {err}", environment.name));
                    report.record(&environment.name, SyncPhase::Pythonpath, &err);
                }
            }
        }

        store.save()
    }

    fn sync_exports(&self, environment: &Environment, report: &mut SyncReport) {
        if environment.exports.is_empty() {
            return;
        }

        let handle = match self.pyenv.env(&environment.name) {
            Ok(handle) => handle,
            Err(err) => {
                ui::error(format!("{}: export: {err}", environment.name));
                report.record(&environment.name, SyncPhase::Export, &err);
                return;
            }
        };
        let bin_dir = handle.bin_dir();

        for name in &environment.exports {
            match export::export_binary(&bin_dir, name, &self.export_dir) {
                Ok(status) => {
                    report_export(name, &status);
                    if status.is_conflict() {
                        let err = Error::ExportConflict(conflict_message(name, &status));
                        report.record(&environment.name, SyncPhase::Export, &err);
                    }
                }
                Err(err) => {
                    ui::error(format!("{}: export: {err}", environment.name));
                    report.record(&environment.name, SyncPhase::Export, &err);
                }
            }
        }
    }
}

/// Print one status line per reconciled export.
pub fn report_export(name: &str, status: &ExportStatus) {
    match status {
        ExportStatus::Created => ui::success("Exported", format!("{name}: created symlink")),
        ExportStatus::AlreadyLinked => ui::status("Export", format!("{name}: already linked")),
        conflict => ui::warn(conflict_message(name, conflict)),
    }
}

fn conflict_message(name: &str, status: &ExportStatus) -> String {
    match status {
        ExportStatus::LinkedElsewhere(target) => {
            format!(
                "{name}: already linked, but to something else [{}]",
                target.display()
            )
        }
        ExportStatus::NotASymlink => {
            format!("{name}: export path already exists and is not a symlink")
        }
        _ => format!("{name}: no conflict"),
    }
}
