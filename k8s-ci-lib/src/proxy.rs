//! systemd drop-in carrying proxy settings into managed services

use crate::command::Cmd;
use crate::error::{InternalSnafu, Result};
use crate::host::Host;
use snafu::ensure;
use std::path::{Path, PathBuf};
use tracing::info;

pub const SNIPPET_FILE: &str = "proxy.conf";

/// Proxy environment of the invoking process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxySettings {
    pub https_proxy: Option<String>,
    pub http_proxy: Option<String>,
    pub no_proxy: Option<String>,
}

impl ProxySettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Lower-case variables win over upper-case ones, empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let pick = |lower: &str, upper: &str| {
            lookup(lower)
                .filter(|value| !value.is_empty())
                .or_else(|| lookup(upper).filter(|value| !value.is_empty()))
        };
        Self {
            https_proxy: pick("https_proxy", "HTTPS_PROXY"),
            http_proxy: pick("http_proxy", "HTTP_PROXY"),
            no_proxy: pick("no_proxy", "NO_PROXY"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.https_proxy.is_none() && self.http_proxy.is_none() && self.no_proxy.is_none()
    }

    /// Render the `[Service]` override with both spellings of every variable
    pub fn render(&self) -> String {
        let mut unit = String::from("[Service]\n");
        for (upper, lower, value) in [
            ("HTTPS_PROXY", "https_proxy", &self.https_proxy),
            ("HTTP_PROXY", "http_proxy", &self.http_proxy),
            ("NO_PROXY", "no_proxy", &self.no_proxy),
        ] {
            let value = value.as_deref().unwrap_or_default();
            unit.push_str(&format!("Environment=\"{upper}={value}\"\n"));
            unit.push_str(&format!("Environment=\"{lower}={value}\"\n"));
        }
        unit
    }
}

pub fn snippet_path(dropin_dir: &Path) -> PathBuf {
    dropin_dir.join(SNIPPET_FILE)
}

/// Write the proxy drop-in into `dropin_dir` and reload systemd
///
/// Does nothing when no proxy variable is set.
pub fn write_snippet(host: &dyn Host, settings: &ProxySettings, dropin_dir: &Path) -> Result<()> {
    ensure_dir_given(dropin_dir, "write_snippet")?;

    if settings.is_empty() {
        info!(
            "No proxy variables set, skipping {}",
            snippet_path(dropin_dir).display()
        );
        return Ok(());
    }

    host.create_dir_all(dropin_dir)?;
    host.write_file(&snippet_path(dropin_dir), &settings.render())?;
    daemon_reload(host)
}

/// Remove the proxy drop-in from `dropin_dir` and reload systemd
pub fn remove_snippet(host: &dyn Host, dropin_dir: &Path) -> Result<()> {
    ensure_dir_given(dropin_dir, "remove_snippet")?;

    host.remove_file(&snippet_path(dropin_dir))?;
    daemon_reload(host)
}

pub fn daemon_reload(host: &dyn Host) -> Result<()> {
    host.run(&Cmd::sudo("systemctl").arg("daemon-reload"))
}

fn ensure_dir_given(dropin_dir: &Path, caller: &str) -> Result<()> {
    ensure!(
        !dropin_dir.as_os_str().is_empty(),
        InternalSnafu {
            message: format!("{caller} called without a drop-in directory"),
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::RecordingHost;
    use std::collections::HashMap;

    const DROPIN: &str = "/etc/systemd/system/containerd.service.d";

    fn settings(vars: &[(&str, &str)]) -> ProxySettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ProxySettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_lowercase_wins_and_empty_is_unset() {
        let proxy = settings(&[
            ("https_proxy", "http://lower:3128"),
            ("HTTPS_PROXY", "http://upper:3128"),
            ("http_proxy", ""),
            ("HTTP_PROXY", "http://upper:8080"),
            ("NO_PROXY", ""),
        ]);
        assert_eq!(proxy.https_proxy.as_deref(), Some("http://lower:3128"));
        assert_eq!(proxy.http_proxy.as_deref(), Some("http://upper:8080"));
        assert_eq!(proxy.no_proxy, None);
        assert!(!proxy.is_empty());
        assert!(settings(&[("http_proxy", "")]).is_empty());
    }

    #[test]
    fn test_render_has_six_assignments() {
        let proxy = settings(&[
            ("HTTPS_PROXY", "http://proxy:3128"),
            ("no_proxy", "localhost,10.0.0.0/8"),
        ]);
        assert_eq!(
            proxy.render(),
            "[Service]\n\
             Environment=\"HTTPS_PROXY=http://proxy:3128\"\n\
             Environment=\"https_proxy=http://proxy:3128\"\n\
             Environment=\"HTTP_PROXY=\"\n\
             Environment=\"http_proxy=\"\n\
             Environment=\"NO_PROXY=localhost,10.0.0.0/8\"\n\
             Environment=\"no_proxy=localhost,10.0.0.0/8\"\n"
        );
    }

    #[test]
    fn test_write_without_proxy_is_noop() {
        let host = RecordingHost::default();
        write_snippet(&host, &ProxySettings::default(), Path::new(DROPIN)).unwrap();
        assert!(host.actions().is_empty());
        assert!(!host.has_file(&snippet_path(Path::new(DROPIN))));
    }

    #[test]
    fn test_write_creates_snippet_and_reloads() {
        let host = RecordingHost::default();
        let proxy = settings(&[("http_proxy", "http://proxy:3128")]);
        write_snippet(&host, &proxy, Path::new(DROPIN)).unwrap();

        let written = host.file(&snippet_path(Path::new(DROPIN))).unwrap();
        assert!(written.contains("Environment=\"http_proxy=http://proxy:3128\""));
        assert_eq!(host.commands(), vec!["systemctl daemon-reload"]);
    }

    #[test]
    fn test_remove_absent_snippet_is_ok() {
        let host = RecordingHost::default();
        remove_snippet(&host, Path::new(DROPIN)).unwrap();
        assert_eq!(host.commands(), vec!["systemctl daemon-reload"]);
    }

    #[test]
    fn test_missing_directory_is_internal_error() {
        let host = RecordingHost::default();
        let proxy = settings(&[("http_proxy", "http://proxy:3128")]);

        let err = write_snippet(&host, &proxy, Path::new("")).unwrap_err();
        assert!(matches!(err, Error::Internal { .. }));
        assert!(err.to_string().contains("file an issue"));

        let err = remove_snippet(&host, Path::new("")).unwrap_err();
        assert!(matches!(err, Error::Internal { .. }));
        assert!(host.actions().is_empty());
    }
}
