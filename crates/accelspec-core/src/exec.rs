//! External commands and pre-build requirement installs.
//!
//! Every child process goes through [`run_with_timeout`]; a command that
//! outlives its budget is killed and reported as fatal.

use std::io;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

/// Wall-clock budget for one external command.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Failed to start {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("{program} did not finish within {}s", timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Usage(String),
}

/// Run `cmd` to completion, killing it after `timeout`.
///
/// # Errors
///
/// Returns [`ExecError::Spawn`] if the program cannot be started and
/// [`ExecError::Timeout`] if it had to be killed.
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<ExitStatus, ExecError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
        program: program.clone(),
        source,
    })?;

    if let Some(status) = child.wait_timeout(timeout)? {
        debug!(%program, %status, "command finished");
        return Ok(status);
    }

    warn!(%program, "command timed out, killing");
    child.kill()?;
    child.wait()?;
    Err(ExecError::Timeout { program, timeout })
}

/// Percent-encode the user name and password of an index URL.
///
/// The last `@` separates the credentials from the host. URLs without
/// `user:password@` are returned unchanged.
pub fn quote_credentials(index_url: &str) -> String {
    static CREDENTIALS: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(?P<scheme>https?://)(?P<up>.*)@(?P<rest>[^@]*)$").expect("static pattern")
    });

    let Some(caps) = CREDENTIALS.captures(index_url) else {
        return index_url.to_string();
    };
    let Some((user, password)) = caps["up"].split_once(':') else {
        return index_url.to_string();
    };
    let Ok(mut url) = url::Url::parse(&format!("{}{}", &caps["scheme"], &caps["rest"])) else {
        return index_url.to_string();
    };
    if url.set_username(user).is_err() || url.set_password(Some(password)).is_err() {
        return index_url.to_string();
    }
    url.to_string()
}

/// Installs and removes Python requirements.
pub trait PackageTool {
    /// Whether `requirement` is already importable.
    fn is_installed(&self, requirement: &str) -> bool;

    /// Install `requirement`, optionally from `index_url`.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecError`] if the installer could not be run.
    fn install(&self, requirement: &str, index_url: Option<&str>) -> Result<(), ExecError>;

    /// Remove `requirement`.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecError`] if the installer could not be run.
    fn uninstall(&self, requirement: &str) -> Result<(), ExecError>;
}

/// `pip` driven through a Python interpreter.
#[derive(Debug, Clone)]
pub struct PipTool {
    python: PathBuf,
    timeout: Duration,
    quiet: bool,
}

impl PipTool {
    pub fn new(python: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            timeout: DEFAULT_TIMEOUT,
            quiet: true,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Show child output instead of discarding it.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.quiet = !verbose;
        self
    }

    fn python(&self) -> Command {
        let mut cmd = Command::new(&self.python);
        if self.quiet {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        cmd
    }
}

/// The importable module named by a requirement spec (`lxml>=4` -> `lxml`).
pub fn module_name(requirement: &str) -> &str {
    let end = requirement
        .find(['<', '>', '=', '!', '~', '[', ';'])
        .unwrap_or(requirement.len());
    requirement[..end].trim()
}

impl PackageTool for PipTool {
    fn is_installed(&self, requirement: &str) -> bool {
        let mut cmd = self.python();
        cmd.arg("-c").arg(format!("import {}", module_name(requirement)));
        run_with_timeout(&mut cmd, self.timeout).is_ok_and(|s| s.success())
    }

    fn install(&self, requirement: &str, index_url: Option<&str>) -> Result<(), ExecError> {
        let mut cmd = self.python();
        cmd.args(["-m", "pip", "install"]);
        if let Some(ix) = index_url {
            cmd.arg(format!("-i{ix}"));
        }
        cmd.arg(requirement);
        let status = run_with_timeout(&mut cmd, self.timeout)?;
        debug!(requirement, %status, "pip install");
        Ok(())
    }

    fn uninstall(&self, requirement: &str) -> Result<(), ExecError> {
        let mut cmd = self.python();
        cmd.args(["-m", "pip", "-q", "uninstall", "-y", requirement]);
        run_with_timeout(&mut cmd, self.timeout)?;
        Ok(())
    }
}

/// Outcome of one requirement group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOutcome {
    /// Every member is importable
    Installed(Vec<String>),
    /// `failed` could not be installed; `removed` were uninstalled again
    BackedOut { failed: String, removed: Vec<String> },
}

/// Install each whitespace-separated group; a group is all-or-nothing.
///
/// A member counts as installed when it is importable after the install
/// attempt. When one fails, members already installed in that group are
/// uninstalled and the next group is tried.
///
/// # Errors
///
/// Returns an [`ExecError`] if the installer itself cannot be run.
pub fn install_groups(
    tool: &dyn PackageTool,
    groups: &[String],
    index_url: Option<&str>,
) -> Result<Vec<GroupOutcome>, ExecError> {
    let mut outcomes = Vec::with_capacity(groups.len());
    'groups: for group in groups {
        let mut installed = Vec::new();
        for req in group.split_whitespace() {
            if !tool.is_installed(req) {
                tool.install(req, index_url)?;
            }
            if tool.is_installed(req) {
                installed.push(req.to_string());
                continue;
            }
            warn!(requirement = req, backing_out = ?installed, "pip install failed");
            for done in &installed {
                tool.uninstall(done)?;
            }
            outcomes.push(GroupOutcome::BackedOut {
                failed: req.to_string(),
                removed: installed,
            });
            continue 'groups;
        }
        if !installed.is_empty() {
            info!(requirements = ?installed, "pip installed");
        }
        outcomes.push(GroupOutcome::Installed(installed));
    }
    Ok(outcomes)
}

/// Requirement installs requested on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallPlan {
    /// Groups installed from the public index
    pub groups: Vec<String>,
    /// Public index URL, pip's default when absent
    pub index_url: Option<String>,
    /// Groups installed from the private index
    pub rl_groups: Vec<String>,
    /// Private index URLs given; exactly one is required with `rl_groups`
    pub rl_index_urls: Vec<String>,
}

impl InstallPlan {
    /// Run the plan: public groups first, then private groups.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Usage`] if private groups were given without
    /// exactly one private index URL, before anything is installed from it.
    pub fn perform(&self, tool: &dyn PackageTool) -> Result<Vec<GroupOutcome>, ExecError> {
        let public = self.index_url.as_deref().map(quote_credentials);
        let mut outcomes = install_groups(tool, &self.groups, public.as_deref())?;
        if self.rl_groups.is_empty() {
            return Ok(outcomes);
        }
        let [index] = self.rl_index_urls.as_slice() else {
            return Err(ExecError::Usage(format!(
                "rl-pip-install requires exactly 1 --rl-index-url not {}",
                self.rl_index_urls.len()
            )));
        };
        let quoted = quote_credentials(index);
        outcomes.extend(install_groups(tool, &self.rl_groups, Some(&quoted))?);
        Ok(outcomes)
    }
}
