//! In-memory doubles for [`Host`] and [`Fetcher`]
//!
//! Enabled for this crate's tests and, through the `testing` feature, for
//! downstream test suites.

use crate::command::Cmd;
use crate::error::{BadResponseSnafu, CommandFailedSnafu, Result};
use crate::fetch::Fetcher;
use crate::host::Host;
use async_trait::async_trait;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One observed mutation or command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Run(String),
    Write(PathBuf),
    Copy(PathBuf, PathBuf),
    CreateDir(PathBuf),
    RemoveFile(PathBuf),
    RemoveDir(PathBuf),
}

/// Records every call and keeps written files in memory
///
/// Commands succeed unless they match a pattern registered with
/// [`RecordingHost::fail_on`]; patterns are plain substrings of the rendered
/// command line.
#[derive(Debug, Default)]
pub struct RecordingHost {
    files: RefCell<BTreeMap<PathBuf, String>>,
    actions: RefCell<Vec<Action>>,
    failures: Vec<String>,
    responses: Vec<(String, String)>,
    side_effects: Vec<(String, PathBuf, String)>,
}

impl RecordingHost {
    /// Make matching commands exit non-zero
    #[must_use]
    pub fn fail_on(mut self, pattern: &str) -> Self {
        self.failures.push(pattern.to_string());
        self
    }

    /// Canned stdout for matching commands
    #[must_use]
    pub fn respond(mut self, pattern: &str, stdout: &str) -> Self {
        self.responses.push((pattern.to_string(), stdout.to_string()));
        self
    }

    /// Create `path` whenever a matching command succeeds
    #[must_use]
    pub fn materialize(mut self, pattern: &str, path: impl Into<PathBuf>, contents: &str) -> Self {
        self.side_effects
            .push((pattern.to_string(), path.into(), contents.to_string()));
        self
    }

    /// Pre-populate a file
    #[must_use]
    pub fn with_file(self, path: impl Into<PathBuf>, contents: &str) -> Self {
        self.files
            .borrow_mut()
            .insert(path.into(), contents.to_string());
        self
    }

    pub fn actions(&self) -> Vec<Action> {
        self.actions.borrow().clone()
    }

    /// Rendered command lines, in order
    pub fn commands(&self) -> Vec<String> {
        self.actions
            .borrow()
            .iter()
            .filter_map(|action| match action {
                Action::Run(command) => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn file(&self, path: &Path) -> Option<String> {
        self.files.borrow().get(path).cloned()
    }

    pub fn has_file(&self, path: &Path) -> bool {
        self.files.borrow().contains_key(path)
    }

    /// Whether `path` is a held file or a directory containing one
    pub fn exists(&self, path: &Path) -> bool {
        self.files
            .borrow()
            .keys()
            .any(|file| file.starts_with(path))
    }

    /// Paths of every file currently held
    pub fn files(&self) -> Vec<PathBuf> {
        self.files.borrow().keys().cloned().collect()
    }

    fn execute(&self, cmd: &Cmd) -> Result<String> {
        let line = cmd.to_string();
        self.actions.borrow_mut().push(Action::Run(line.clone()));

        if self.failures.iter().any(|pattern| line.contains(pattern)) {
            return CommandFailedSnafu {
                command: line,
                status: "exit status: 1",
            }
            .fail();
        }

        for (pattern, path, contents) in &self.side_effects {
            if line.contains(pattern) {
                self.files
                    .borrow_mut()
                    .insert(path.clone(), contents.clone());
            }
        }

        Ok(self
            .responses
            .iter()
            .find(|(pattern, _)| line.contains(pattern))
            .map(|(_, stdout)| stdout.clone())
            .unwrap_or_default())
    }
}

impl Host for RecordingHost {
    fn run(&self, cmd: &Cmd) -> Result<()> {
        self.execute(cmd).map(|_| ())
    }

    fn output(&self, cmd: &Cmd) -> Result<String> {
        self.execute(cmd)
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        self.actions
            .borrow_mut()
            .push(Action::Write(path.to_path_buf()));
        self.files
            .borrow_mut()
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn read_file(&self, path: &Path) -> Result<Option<String>> {
        Ok(self.file(path))
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        self.actions
            .borrow_mut()
            .push(Action::Copy(from.to_path_buf(), to.to_path_buf()));
        let contents = self.file(from).unwrap_or_default();
        self.files.borrow_mut().insert(to.to_path_buf(), contents);
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.actions
            .borrow_mut()
            .push(Action::CreateDir(path.to_path_buf()));
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.actions
            .borrow_mut()
            .push(Action::RemoveFile(path.to_path_buf()));
        self.files.borrow_mut().remove(path);
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.actions
            .borrow_mut()
            .push(Action::RemoveDir(path.to_path_buf()));
        self.files
            .borrow_mut()
            .retain(|file, _| !file.starts_with(path));
        Ok(())
    }
}

/// Serves fixed bodies per URL; unknown URLs answer with an error
#[derive(Debug, Default)]
pub struct CannedFetcher {
    bodies: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
}

impl CannedFetcher {
    #[must_use]
    pub fn with(mut self, url: &str, body: &str) -> Self {
        self.bodies.insert(url.to_string(), body.to_string());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Fetcher for CannedFetcher {
    async fn get_text(&self, url: &str) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }
        match self.bodies.get(url) {
            Some(body) => Ok(body.clone()),
            None => BadResponseSnafu {
                url,
                message: "404 Not Found",
            }
            .fail(),
        }
    }
}
