use snafu::Snafu;
use testrun_model::{clients, repository, upsert, Phase};

pub(crate) type Result<T> = std::result::Result<T, Error>;

/// The error type returned from `reconcile`. `kube-runtime` requires that it implements
/// `std::error::Error`.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum Error {
    #[snafu(display("No action handles test run '{}' in phase {}", test_name, phase))]
    NoAction { test_name: String, phase: String },

    #[snafu(display(
        "Test run '{}' in phase {} is claimed by more than one action: {}",
        test_name,
        phase,
        actions
    ))]
    AmbiguousAction {
        test_name: String,
        phase: String,
        actions: String,
    },

    #[snafu(display("Unable to convert {} for test run '{}': {}", what, test_name, source))]
    Manifest {
        test_name: String,
        what: String,
        source: serde_json::Error,
    },

    #[snafu(display(
        "Unable to check for the viewer role binding in namespace '{}': {}",
        namespace,
        source
    ))]
    GetViewer {
        namespace: String,
        source: kube::Error,
    },

    #[snafu(display("Unable to create the viewer in namespace '{}': {}", namespace, source))]
    CreateViewer {
        namespace: String,
        source: upsert::Error,
    },

    #[snafu(display(
        "Unable to read the repository of namespace '{}': {}",
        namespace,
        source
    ))]
    Repository {
        namespace: String,
        source: repository::Error,
    },

    #[snafu(display("Unable to start test run '{}': {}", test_name, source))]
    Start {
        test_name: String,
        source: upsert::Error,
    },

    #[snafu(display("Unable to get the test pod of '{}': {}", test_name, source))]
    GetPod {
        test_name: String,
        source: kube::Error,
    },

    #[snafu(display(
        "Unable to move test run '{}' to phase {}: {}",
        test_name,
        phase,
        source
    ))]
    SetStatus {
        test_name: String,
        phase: Phase,
        source: clients::Error,
    },

    #[snafu(display("Unable to read the controller configuration: {}", source))]
    Config { source: envy::Error },

    #[snafu(display("Invalid duration '{}' for '{}'", input, setting))]
    InvalidDuration { setting: String, input: String },
}
