//! Error taxonomy shared by every provisioning step

use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display(
        "unsupported distribution '{id}' ({name}); only Debian- and RedHat-derived systems are supported"
    ))]
    UnsupportedOs { id: String, name: String },

    #[snafu(display("failed to read distribution metadata from {}", path.display()))]
    OsRelease {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display(
        "invalid containerd version '{value}', expected vMAJOR.MINOR.PATCH\nTo list the available releases run:\n  {query}"
    ))]
    InvalidVersion { value: String, query: String },

    #[snafu(display(
        "could not determine the latest containerd release\nTo diagnose run:\n  {query}"
    ))]
    VersionLookup {
        query: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("internal error: {message}. This is a bug, please file an issue"))]
    Internal { message: String },

    #[snafu(display("command `{command}` failed with {status}"))]
    CommandFailed { command: String, status: String },

    #[snafu(display("failed to execute `{command}`"))]
    CommandSpawn {
        command: String,
        source: std::io::Error,
    },

    #[snafu(display("I/O error on {}", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to build HTTP client"))]
    HttpClient { source: reqwest::Error },

    #[snafu(display("request to {url} failed"))]
    Http { url: String, source: reqwest::Error },

    #[snafu(display("unexpected response from {url}: {message}"))]
    BadResponse { url: String, message: String },

    #[snafu(display(
        "{} does not support sub-command '{subcommand}'",
        script.display()
    ))]
    UnsupportedSubcommand { script: PathBuf, subcommand: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
