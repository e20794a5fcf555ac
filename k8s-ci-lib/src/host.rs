//! Host abstraction: every command and file mutation goes through here
//!
//! [`SystemHost`] touches the real machine (escalating with `sudo` when not
//! root), [`DryRunHost`] only reports what would happen.

use crate::command::Cmd;
use crate::error::{CommandFailedSnafu, CommandSpawnSnafu, IoSnafu, Result};
use snafu::{ResultExt, ensure};
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};

pub trait Host {
    /// Run a command with inherited stdio, failing on non-zero exit
    fn run(&self, cmd: &Cmd) -> Result<()>;

    /// Run a command and capture its stdout
    fn output(&self, cmd: &Cmd) -> Result<String>;

    /// Write a file as root, replacing any previous content
    fn write_file(&self, path: &Path, contents: &str) -> Result<()>;

    /// Read a file, `None` if it does not exist
    fn read_file(&self, path: &Path) -> Result<Option<String>>;

    fn copy_file(&self, from: &Path, to: &Path) -> Result<()>;

    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Remove a file; absent files are not an error
    fn remove_file(&self, path: &Path) -> Result<()>;

    /// Recursively remove a directory; absent directories are not an error
    fn remove_dir_all(&self, path: &Path) -> Result<()>;

    /// Whether mutations are only being reported
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Executes against the local machine
#[derive(Debug, Clone)]
pub struct SystemHost {
    /// Prefix for privileged commands, empty when already root
    escalation: Vec<String>,
}

impl SystemHost {
    /// Detect whether privileged operations need `sudo`
    pub fn new() -> Self {
        // SAFETY: geteuid has no preconditions and cannot fail
        let euid = unsafe { libc::geteuid() };
        Self::with_sudo(euid != 0)
    }

    pub fn with_sudo(use_sudo: bool) -> Self {
        let escalation = if use_sudo { vec!["sudo".to_string()] } else { Vec::new() };
        Self { escalation }
    }

    /// Escalate through another command line, e.g. `sudo -n` or `doas`
    pub fn with_escalation<I, S>(prefix: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            escalation: prefix.into_iter().map(Into::into).collect(),
        }
    }

    fn use_sudo(&self) -> bool {
        !self.escalation.is_empty()
    }

    fn expression(&self, cmd: &Cmd) -> duct::Expression {
        let expression = match self.escalation.split_first() {
            Some((program, prefix)) if cmd.is_privileged() => {
                // sudo drops the caller's environment, hand it over through env(1)
                let mut args = prefix.to_vec();
                if !cmd.get_envs().is_empty() {
                    args.push("env".to_string());
                    args.extend(cmd.get_envs().iter().map(|(k, v)| format!("{k}={v}")));
                }
                args.push(cmd.program().to_string());
                args.extend(cmd.get_args().iter().cloned());
                duct::cmd(program.as_str(), args)
            }
            _ => cmd.get_envs().iter().fold(
                duct::cmd(cmd.program(), cmd.get_args()),
                |expression, (key, value)| expression.env(key, value),
            ),
        };

        match cmd.get_current_dir() {
            Some(dir) => expression.dir(dir),
            None => expression,
        }
    }

    fn trace(&self, cmd: &Cmd) {
        if cmd.is_privileged() && self.use_sudo() {
            debug!("+ {} {cmd}", self.escalation.join(" "));
        } else {
            debug!("+ {cmd}");
        }
    }

    /// Run a root-only helper such as `tee` or `rm` through sudo
    fn escalate(&self, cmd: &Cmd, stdin: Option<&str>) -> Result<()> {
        self.trace(cmd);
        let mut expression = self.expression(cmd).stdout_null();
        if let Some(stdin) = stdin {
            expression = expression.stdin_bytes(stdin.as_bytes().to_vec());
        }
        let output = expression
            .unchecked()
            .run()
            .context(CommandSpawnSnafu {
                command: cmd.to_string(),
            })?;
        ensure!(
            output.status.success(),
            CommandFailedSnafu {
                command: cmd.to_string(),
                status: output.status.to_string(),
            }
        );
        Ok(())
    }
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for SystemHost {
    fn run(&self, cmd: &Cmd) -> Result<()> {
        self.trace(cmd);
        let output = self
            .expression(cmd)
            .unchecked()
            .run()
            .context(CommandSpawnSnafu {
                command: cmd.to_string(),
            })?;

        ensure!(
            output.status.success(),
            CommandFailedSnafu {
                command: cmd.to_string(),
                status: output.status.to_string(),
            }
        );
        Ok(())
    }

    fn output(&self, cmd: &Cmd) -> Result<String> {
        self.trace(cmd);
        let output = self
            .expression(cmd)
            .stdout_capture()
            .unchecked()
            .run()
            .context(CommandSpawnSnafu {
                command: cmd.to_string(),
            })?;

        ensure!(
            output.status.success(),
            CommandFailedSnafu {
                command: cmd.to_string(),
                status: output.status.to_string(),
            }
        );
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        if self.use_sudo() {
            let tee = Cmd::sudo("tee").arg(path.display().to_string());
            return self.escalate(&tee, Some(contents));
        }
        debug!("+ write {}", path.display());
        std::fs::write(path, contents).context(IoSnafu { path })
    }

    fn read_file(&self, path: &Path) -> Result<Option<String>> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).context(IoSnafu { path }),
        }
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        if self.use_sudo() {
            let cp = Cmd::sudo("cp")
                .arg(from.display().to_string())
                .arg(to.display().to_string());
            return self.escalate(&cp, None);
        }
        debug!("+ cp {} {}", from.display(), to.display());
        std::fs::copy(from, to).context(IoSnafu { path: to })?;
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        if self.use_sudo() {
            let mkdir = Cmd::sudo("mkdir")
                .arg("-p")
                .arg(path.display().to_string());
            return self.escalate(&mkdir, None);
        }
        debug!("+ mkdir -p {}", path.display());
        std::fs::create_dir_all(path).context(IoSnafu { path })
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        if self.use_sudo() {
            let rm = Cmd::sudo("rm").arg("-f").arg(path.display().to_string());
            return self.escalate(&rm, None);
        }
        debug!("+ rm -f {}", path.display());
        match std::fs::remove_file(path) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err).context(IoSnafu { path }),
            _ => Ok(()),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        if self.use_sudo() {
            let rm = Cmd::sudo("rm").arg("-rf").arg(path.display().to_string());
            return self.escalate(&rm, None);
        }
        debug!("+ rm -rf {}", path.display());
        match std::fs::remove_dir_all(path) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err).context(IoSnafu { path }),
            _ => Ok(()),
        }
    }
}

/// Logs every mutation instead of performing it
#[derive(Debug, Clone, Default)]
pub struct DryRunHost;

impl Host for DryRunHost {
    fn run(&self, cmd: &Cmd) -> Result<()> {
        info!("[dry-run] {cmd}");
        Ok(())
    }

    fn output(&self, cmd: &Cmd) -> Result<String> {
        info!("[dry-run] {cmd}");
        Ok(String::new())
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        info!("[dry-run] write {} ({} bytes)", path.display(), contents.len());
        debug!("{contents}");
        Ok(())
    }

    fn read_file(&self, path: &Path) -> Result<Option<String>> {
        SystemHost::with_sudo(false).read_file(path)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        info!("[dry-run] cp {} {}", from.display(), to.display());
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        info!("[dry-run] mkdir -p {}", path.display());
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        info!("[dry-run] rm -f {}", path.display());
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        info!("[dry-run] rm -rf {}", path.display());
        Ok(())
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_run_reports_exit_status() {
        let host = SystemHost::with_sudo(false);
        assert!(host.run(&Cmd::new("true")).is_ok());

        let err = host.run(&Cmd::new("false")).unwrap_err();
        assert!(matches!(err, Error::CommandFailed { ref command, .. } if command == "false"));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let host = SystemHost::with_sudo(false);
        let err = host
            .run(&Cmd::new("k8s-ci-definitely-not-a-binary"))
            .unwrap_err();
        assert!(matches!(err, Error::CommandSpawn { .. }));
    }

    #[test]
    fn test_output_captures_stdout_with_env() {
        let host = SystemHost::with_sudo(false);
        let out = host
            .output(&Cmd::new("sh").arg("-c").arg("printf %s \"$GREETING\"").env("GREETING", "hello"))
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn test_file_operations_without_sudo() {
        let tmp = tempfile::tempdir().unwrap();
        let host = SystemHost::with_sudo(false);
        let dir = tmp.path().join("a/b");
        let file = dir.join("proxy.conf");

        host.create_dir_all(&dir).unwrap();
        host.write_file(&file, "[Service]\n").unwrap();
        assert_eq!(host.read_file(&file).unwrap().as_deref(), Some("[Service]\n"));

        host.remove_file(&file).unwrap();
        host.remove_file(&file).unwrap();
        assert_eq!(host.read_file(&file).unwrap(), None);

        host.remove_dir_all(&tmp.path().join("a")).unwrap();
        host.remove_dir_all(&tmp.path().join("a")).unwrap();
        assert!(!dir.exists());
    }

    /// Escalation through a shell shim that logs its argv before running it
    fn logging_escalation(log: &Path) -> SystemHost {
        let shim = format!("printf '%s\\n' \"$*\" >> '{}'; exec \"$@\"", log.display());
        SystemHost::with_escalation(["sh".to_string(), "-c".to_string(), shim, "sudo".to_string()])
    }

    #[test]
    fn test_privileged_operations_go_through_escalation() {
        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("escalated.log");
        let host = logging_escalation(&log);
        let dir = tmp.path().join("containerd.service.d");
        let file = dir.join("proxy.conf");
        let copy = tmp.path().join("copy.conf");

        host.create_dir_all(&dir).unwrap();
        host.write_file(&file, "[Service]\n").unwrap();
        let greeting = host
            .output(
                &Cmd::sudo("sh")
                    .arg("-c")
                    .arg("printf %s \"$GREETING\"")
                    .env("GREETING", "hello"),
            )
            .unwrap();
        host.copy_file(&file, &copy).unwrap();
        host.run(&Cmd::new("true")).unwrap();
        assert_eq!(host.read_file(&copy).unwrap().as_deref(), Some("[Service]\n"));
        host.remove_file(&file).unwrap();
        host.remove_dir_all(&dir).unwrap();

        assert_eq!(greeting, "hello");
        assert!(!dir.exists());
        let logged = std::fs::read_to_string(&log).unwrap();
        let expected = vec![
            format!("mkdir -p {}", dir.display()),
            format!("tee {}", file.display()),
            "env GREETING=hello sh -c printf %s \"$GREETING\"".to_string(),
            format!("cp {} {}", file.display(), copy.display()),
            format!("rm -f {}", file.display()),
            format!("rm -rf {}", dir.display()),
        ];
        assert_eq!(logged.lines().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_escalation_failure_is_reported() {
        let host = SystemHost::with_escalation(["false"]);
        let err = host
            .write_file(Path::new("/nonexistent/proxy.conf"), "")
            .unwrap_err();
        assert!(matches!(err, Error::CommandFailed { ref command, .. } if command.starts_with("tee")));
    }

    #[test]
    fn test_dry_run_does_not_touch_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("config.toml");
        let host = DryRunHost;

        host.write_file(&file, "version = 2").unwrap();
        host.run(&Cmd::new("false")).unwrap();
        assert!(!file.exists());
        assert!(host.is_dry_run());
    }
}
