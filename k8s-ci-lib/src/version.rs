//! Release version resolution for containerd and Kubernetes

use crate::error::{BadResponseSnafu, InvalidVersionSnafu, Result, VersionLookupSnafu};
use crate::fetch::Fetcher;
use regex::Regex;
use serde::Deserialize;
use snafu::{OptionExt, ResultExt};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::info;

pub const CONTAINERD_RELEASES_URL: &str =
    "https://api.github.com/repos/containerd/containerd/releases?per_page=100";

pub const KUBERNETES_STABLE_URL: &str = "https://dl.k8s.io/release/stable.txt";

static RELEASE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v(\d+)\.(\d+)\.(\d+)$").expect("valid release tag regex"));

/// Requested containerd version
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VersionSelector {
    /// Highest `vX.Y.Z` release published upstream
    #[default]
    Latest,
    Exact(String),
}

impl FromStr for VersionSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "latest" => VersionSelector::Latest,
            other => VersionSelector::Exact(other.to_string()),
        })
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSelector::Latest => f.write_str("latest"),
            VersionSelector::Exact(version) => f.write_str(version),
        }
    }
}

impl VersionSelector {
    /// Resolve to a concrete `vX.Y.Z` tag
    pub async fn resolve(&self, fetcher: &dyn Fetcher) -> Result<String> {
        match self {
            VersionSelector::Exact(version) => {
                validate(version)?;
                Ok(version.clone())
            }
            VersionSelector::Latest => {
                let body = fetcher
                    .get_text(CONTAINERD_RELEASES_URL)
                    .await
                    .context(VersionLookupSnafu {
                        query: manual_query(),
                    })?;
                let version = latest_from_releases(&body).context(VersionLookupSnafu {
                    query: manual_query(),
                })?;
                info!("Resolved latest containerd release to {version}");
                Ok(version)
            }
        }
    }
}

/// Shell pipeline an operator can run to reproduce the lookup
pub fn manual_query() -> String {
    format!(
        "curl -fsSL '{CONTAINERD_RELEASES_URL}' | jq -r '.[].tag_name' | grep -E '^v[0-9]+\\.[0-9]+\\.[0-9]+$' | sort -V | tail -n 1"
    )
}

/// Check `version` is a plain `vMAJOR.MINOR.PATCH` tag
pub fn validate(version: &str) -> Result<semver::Version> {
    parse_tag(version).context(InvalidVersionSnafu {
        value: version,
        query: manual_query(),
    })
}

fn parse_tag(tag: &str) -> Option<semver::Version> {
    if !RELEASE_TAG.is_match(tag) {
        return None;
    }
    semver::Version::parse(&tag[1..]).ok()
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

/// Pick the highest strict `vX.Y.Z` tag from a GitHub releases listing
pub fn latest_from_releases(body: &str) -> Result<String> {
    let releases: Vec<Release> = serde_json::from_str(body).map_err(|err| {
        BadResponseSnafu {
            url: CONTAINERD_RELEASES_URL,
            message: err.to_string(),
        }
        .build()
    })?;

    highest_tag(releases.iter().map(|release| release.tag_name.as_str())).context(
        BadResponseSnafu {
            url: CONTAINERD_RELEASES_URL,
            message: "no vMAJOR.MINOR.PATCH release found",
        },
    )
}

/// Highest tag by semantic version; release candidates and other shapes are skipped
pub fn highest_tag<'a>(tags: impl IntoIterator<Item = &'a str>) -> Option<String> {
    tags.into_iter()
        .filter_map(|tag| parse_tag(tag).map(|version| (version, tag)))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, tag)| tag.to_string())
}

/// Derive the `vMAJOR.MINOR` package channel from a stable release marker
pub fn kubernetes_channel(stable: &str) -> Result<String> {
    let stable = stable.trim();
    let captures = RELEASE_TAG.captures(stable).context(BadResponseSnafu {
        url: KUBERNETES_STABLE_URL,
        message: format!("unexpected stable release marker '{stable}'"),
    })?;
    Ok(format!("v{}.{}", &captures[1], &captures[2]))
}

/// Query the current stable Kubernetes minor channel, e.g. `v1.31`
pub async fn resolve_kubernetes_channel(fetcher: &dyn Fetcher) -> Result<String> {
    let stable = fetcher.get_text(KUBERNETES_STABLE_URL).await?;
    let channel = kubernetes_channel(&stable)?;
    info!("Using Kubernetes package channel {channel}");
    Ok(channel)
}
