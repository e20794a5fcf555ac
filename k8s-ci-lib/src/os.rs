//! Distribution detection from os-release metadata
//!
//! Identity is read once at startup and handed to every component, nothing
//! else reads `/etc/os-release`.

use crate::error::{OsReleaseSnafu, Result, UnsupportedOsSnafu};
use snafu::{OptionExt, ResultExt};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// Package-manager family a distribution belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// Debian, Ubuntu and derivatives (apt)
    Debian,
    /// RHEL, CentOS, Fedora and derivatives (dnf)
    RedHat,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::Debian => f.write_str("debian"),
            Family::RedHat => f.write_str("redhat"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsIdentity {
    pub id: String,
    pub name: String,
    pub version_id: Option<String>,
    pub id_like: Vec<String>,
    pub family: Family,
}

impl OsIdentity {
    /// Read and classify the os-release file at `path`
    pub fn detect(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context(OsReleaseSnafu { path })?;
        let identity = Self::parse(&content)?;
        debug!(
            "Detected {} ({}) as {} family",
            identity.name, identity.id, identity.family
        );
        Ok(identity)
    }

    /// Classify os-release content
    pub fn parse(content: &str) -> Result<Self> {
        let fields = parse_fields(content);
        let id = fields.get("ID").cloned().unwrap_or_default().to_lowercase();
        let name = fields
            .get("NAME")
            .or_else(|| fields.get("PRETTY_NAME"))
            .cloned()
            .unwrap_or_else(|| id.clone());
        let id_like: Vec<String> = fields
            .get("ID_LIKE")
            .map(|like| like.split_whitespace().map(str::to_lowercase).collect())
            .unwrap_or_default();

        let family = classify(&id, &id_like).context(UnsupportedOsSnafu {
            id: id.clone(),
            name: name.clone(),
        })?;

        Ok(Self {
            id,
            name,
            version_id: fields.get("VERSION_ID").cloned(),
            id_like,
            family,
        })
    }
}

/// Parse `KEY=value` lines, stripping one level of quoting
fn parse_fields(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), unquote(value.trim())))
        .collect()
}

fn unquote(value: &str) -> String {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.replace("\\\"", "\"").replace("\\$", "$");
        }
    }
    value.to_string()
}

fn classify(id: &str, id_like: &[String]) -> Option<Family> {
    const DEBIAN: [&str; 2] = ["debian", "ubuntu"];
    const REDHAT: [&str; 4] = ["rhel", "centos", "fedora", "rocky"];

    let candidates = std::iter::once(id).chain(id_like.iter().map(String::as_str));
    for candidate in candidates {
        if DEBIAN.contains(&candidate) {
            return Some(Family::Debian);
        }
        if REDHAT.contains(&candidate) {
            return Some(Family::RedHat);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::io::Write;

    const UBUNTU: &str = r#"PRETTY_NAME="Ubuntu 22.04.4 LTS"
NAME="Ubuntu"
VERSION_ID="22.04"
VERSION="22.04.4 LTS (Jammy Jellyfish)"
ID=ubuntu
ID_LIKE=debian
"#;

    const CENTOS: &str = r#"NAME="CentOS Stream"
VERSION="9"
ID="centos"
ID_LIKE="rhel fedora"
VERSION_ID="9"
"#;

    #[test]
    fn test_parse_ubuntu() {
        let os = OsIdentity::parse(UBUNTU).unwrap();
        assert_eq!(os.id, "ubuntu");
        assert_eq!(os.name, "Ubuntu");
        assert_eq!(os.version_id.as_deref(), Some("22.04"));
        assert_eq!(os.family, Family::Debian);
    }

    #[test]
    fn test_parse_centos() {
        let os = OsIdentity::parse(CENTOS).unwrap();
        assert_eq!(os.id, "centos");
        assert_eq!(os.id_like, vec!["rhel", "fedora"]);
        assert_eq!(os.family, Family::RedHat);
    }

    #[test]
    fn test_derivative_classified_through_id_like() {
        let os = OsIdentity::parse("ID=almalinux\nID_LIKE=\"rhel centos fedora\"\n").unwrap();
        assert_eq!(os.family, Family::RedHat);

        let os = OsIdentity::parse("# comment\n\nID=pop\nID_LIKE=\"ubuntu debian\"\n").unwrap();
        assert_eq!(os.family, Family::Debian);
    }

    #[test]
    fn test_unsupported_distribution() {
        for content in ["ID=arch\nNAME=\"Arch Linux\"\n", "ID=opensuse-leap\nID_LIKE=\"suse opensuse\"\n", ""] {
            let err = OsIdentity::parse(content).unwrap_err();
            assert!(matches!(err, Error::UnsupportedOs { .. }), "{content:?}");
        }
    }

    #[test]
    fn test_detect_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CENTOS.as_bytes()).unwrap();

        let os = OsIdentity::detect(file.path()).unwrap();
        assert_eq!(os.family, Family::RedHat);
    }

    #[test]
    fn test_detect_missing_file() {
        let err = OsIdentity::detect(Path::new("/nonexistent/os-release")).unwrap_err();
        assert!(matches!(err, Error::OsRelease { .. }));
    }
}
