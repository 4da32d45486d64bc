use crate::{poll, tunnel, upsert};
use snafu::Snafu;

pub type Result<T> = std::result::Result<T, Error>;

/// The error type for [`Repository`](super::Repository).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)))]
pub enum Error {
    #[snafu(display("Unable to install the repository into '{}': {}", namespace, source))]
    Install {
        namespace: String,
        source: upsert::Error,
    },

    #[snafu(display("Unable to list {}s in '{}': {}", kind, namespace, source))]
    List {
        kind: String,
        namespace: String,
        source: kube::Error,
    },

    #[snafu(display("Unable to build the {} manifest: {}", kind, source))]
    Manifest {
        kind: String,
        source: serde_json::Error,
    },

    #[snafu(display("Unable to read {} '{}': {}", kind, name, source))]
    Parse {
        kind: String,
        name: String,
        source: serde_json::Error,
    },

    #[snafu(display("Expected one repository {} in '{}', found {}", kind, namespace, count))]
    NotUnique {
        kind: String,
        namespace: String,
        count: usize,
    },

    #[snafu(display("Entry '{}' of secret '{}' is empty", entry, secret))]
    EmptyKey { secret: String, entry: String },

    #[snafu(display("Entry '{}' of secret '{}' is not UTF-8: {}", entry, secret, source))]
    KeyEncoding {
        secret: String,
        entry: String,
        source: std::string::FromUtf8Error,
    },

    #[snafu(display("Unable to find a ready repository pod: {}", source))]
    Poll { source: poll::Error },

    #[snafu(display("Unable to open a connection to the repository: {}", source))]
    Tunnel { source: tunnel::Error },
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Poll { source } => source.is_cancelled(),
            Error::Tunnel { source } => source.is_cancelled(),
            _ => false,
        }
    }
}
