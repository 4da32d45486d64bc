use crate::clients::{HttpStatusCode, StatusCode};
use snafu::Snafu;

/// The `Result` type returned by `clients`.
pub type Result<T> = std::result::Result<T, Error>;

/// The public error type returned by `clients`.
#[derive(Debug, Snafu)]
pub struct Error(InnerError);

/// The private error type returned by `clients`.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)))]
pub(crate) enum InnerError {
    #[snafu(display("Error initializing the Kubernetes client: {}", source))]
    Initialization { source: kube::Error },

    #[snafu(display("Unable to {} for '{}': {}", operation, name, source))]
    KubeApiCallFor {
        /// What we were trying to do, e.g. 'set status'.
        operation: String,
        /// The name of the k8s object we were trying to do this for, e.g. 'my-test'.
        name: String,
        /// The error from kube-rs.
        source: kube::Error,
    },

    #[snafu(display(
        "Refusing to move test run '{}' from phase '{}' to '{}'",
        name,
        from,
        to
    ))]
    PhaseTransition {
        name: String,
        from: String,
        to: String,
    },
}

impl HttpStatusCode for InnerError {
    fn status_code(&self) -> Option<StatusCode> {
        match self {
            InnerError::KubeApiCallFor { source, .. } | InnerError::Initialization { source } => {
                source.status_code()
            }
            InnerError::PhaseTransition { .. } => None,
        }
    }

    fn status_reason(&self) -> Option<&str> {
        match self {
            InnerError::KubeApiCallFor { source, .. } | InnerError::Initialization { source } => {
                source.status_reason()
            }
            InnerError::PhaseTransition { .. } => None,
        }
    }
}

impl HttpStatusCode for Error {
    fn status_code(&self) -> Option<StatusCode> {
        self.0.status_code()
    }

    fn status_reason(&self) -> Option<&str> {
        self.0.status_reason()
    }
}
