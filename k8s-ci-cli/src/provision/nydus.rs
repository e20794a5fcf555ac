//! nydus snapshotter deployment through the kata-containers CI scripts
//!
//! The snapshotter itself is opaque to us: a fresh shallow clone of the kata
//! repository is taken and `gha-run.sh` does the actual work.

use crate::config::NydusSettings;
use anyhow::{Context, Result, bail};
use k8s_ci_lib::error::UnsupportedSubcommandSnafu;
use k8s_ci_lib::{Cmd, Host};
use std::path::PathBuf;
use tracing::{debug, info};

pub const SCRIPT_DIR: &str = "tests/integration/kubernetes";
pub const SCRIPT_NAME: &str = "gha-run.sh";
pub const DEPLOY_SUBCOMMAND: &str = "deploy-snapshotter";

/// Whether a bash `case` statement in `script` has an arm for `subcommand`
pub fn supports_subcommand(script: &str, subcommand: &str) -> bool {
    script.lines().any(|line| {
        let Some((pattern, _)) = line.trim_start().split_once(')') else {
            return false;
        };
        pattern
            .split('|')
            .any(|alternative| alternative.trim().trim_matches('"') == subcommand)
    })
}

pub struct NydusDeployer<'a> {
    host: &'a dyn Host,
    config: &'a NydusSettings,
}

impl<'a> NydusDeployer<'a> {
    pub fn new(host: &'a dyn Host, config: &'a NydusSettings) -> Self {
        Self { host, config }
    }

    pub fn deploy(&self) -> Result<()> {
        self.checkout()?;
        self.invoke(DEPLOY_SUBCOMMAND)
    }

    /// Remove the snapshotter, then the checkout used to do so
    pub fn undeploy(&self) -> Result<()> {
        self.checkout()?;
        self.invoke(self.config.removal_subcommand.as_str())?;
        self.host.remove_dir_all(&self.config.clone_path)?;
        Ok(())
    }

    fn script_dir(&self) -> PathBuf {
        self.config.clone_path.join(SCRIPT_DIR)
    }

    fn checkout(&self) -> Result<()> {
        let clone_path = &self.config.clone_path;
        self.host.remove_dir_all(clone_path)?;
        info!("Cloning {} into {}", self.config.repo_url, clone_path.display());
        self.host
            .run(
                &Cmd::new("git")
                    .args(["clone", "--depth", "1"])
                    .arg(self.config.repo_url.as_str())
                    .arg(clone_path.display().to_string()),
            )
            .with_context(|| format!("Failed to clone {}", self.config.repo_url))
    }

    fn validate(&self, subcommand: &str) -> Result<()> {
        let script = self.script_dir().join(SCRIPT_NAME);
        if self.host.is_dry_run() {
            debug!("Skipping sub-command check of {}", script.display());
            return Ok(());
        }

        let Some(content) = self.host.read_file(&script)? else {
            bail!("{} not found in the kata-containers checkout", script.display());
        };
        if !supports_subcommand(&content, subcommand) {
            return Err(UnsupportedSubcommandSnafu { script, subcommand }
                .build()
                .into());
        }
        Ok(())
    }

    fn invoke(&self, subcommand: &str) -> Result<()> {
        self.validate(subcommand)?;

        let cmd = Cmd::new("bash")
            .arg(SCRIPT_NAME)
            .arg(subcommand)
            .env("KUBERNETES", "vanilla")
            .env("KATA_HYPERVISOR", self.config.hypervisor.as_str())
            .env("CONTAINER_RUNTIME", "containerd")
            .env("SNAPSHOTTER", "nydus")
            .env("PULL_TYPE", "guest-pull")
            .current_dir(self.script_dir());
        self.host
            .run(&cmd)
            .with_context(|| format!("{SCRIPT_NAME} {subcommand} failed"))
    }
}
