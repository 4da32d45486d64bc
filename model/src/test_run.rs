use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A request to run a set of tests in the cluster. The `CustomResource` derive also produces a
/// struct named `TestRun` which represents a test run CRD object in the k8s API.
#[derive(Clone, CustomResource, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[kube(
    derive = "Default",
    derive = "PartialEq",
    group = "testrun.dev",
    kind = "TestRun",
    namespaced,
    plural = "testruns",
    singular = "testrun",
    status = "TestRunStatus",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    version = "v1"
)]
#[serde(rename_all = "camelCase")]
pub struct TestRunSpec {
    /// The test source that will be mounted into the test pod.
    pub source: SourceFile,
    /// An optional settings file. When `name` is empty, `content` is handed to the test pod as an
    /// inline dependency list instead of a mounted file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<SourceFile>,
    /// Environment for the test pod, each entry in `KEY=VALUE` form.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
}

/// A named file with inline content.
#[derive(Serialize, Deserialize, Debug, Default, Eq, PartialEq, Clone, JsonSchema)]
pub struct SourceFile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
}

/// Written by the controller. A `TestRun` without a status has not been seen yet.
#[derive(Serialize, Deserialize, Debug, Default, Eq, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestRunStatus {
    pub phase: Phase,
    pub test_id: String,
}

#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Clone, Copy, Hash, JsonSchema)]
pub enum Phase {
    /// The test run has been acknowledged and is waiting for its test pod.
    Pending,
    /// The test pod has been submitted.
    Running,
    /// The test pod exited successfully.
    Passed,
    /// The test pod exited with a failure.
    Failed,
    /// The test run cannot make progress.
    Error,
    /// The test run is being removed.
    Deleting,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Pending
    }
}

impl Phase {
    /// Position of the phase in the lifecycle. Terminal phases share the last rank.
    fn rank(self) -> u8 {
        match self {
            Phase::Pending => 0,
            Phase::Running => 1,
            Phase::Passed | Phase::Failed | Phase::Error | Phase::Deleting => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Pending => "Pending",
            Phase::Running => "Running",
            Phase::Passed => "Passed",
            Phase::Failed => "Failed",
            Phase::Error => "Error",
            Phase::Deleting => "Deleting",
        }
    }

    /// Terminal phases are never handed to an action.
    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// Transitions only move forward, except for `Error` which can be entered from anywhere.
    pub fn can_transition_to(self, next: Phase) -> bool {
        next == Phase::Error || (!self.is_terminal() && next.rank() > self.rank())
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self.as_str(), f)
    }
}

impl TestRun {
    /// The phase of the run, `None` if the controller has not initialized the status yet.
    pub fn phase(&self) -> Option<Phase> {
        self.status.as_ref().map(|status| status.phase)
    }

    /// The id assigned during initialization, or an empty string.
    pub fn test_id(&self) -> &str {
        self.status
            .as_ref()
            .map(|status| status.test_id.as_str())
            .unwrap_or("")
    }

    /// The name of the settings file to mount, if there is one.
    pub fn settings_file_name(&self) -> Option<&str> {
        self.spec
            .settings
            .as_ref()
            .map(|settings| settings.name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// Inline settings content, if there is any.
    pub fn settings_content(&self) -> Option<&str> {
        self.spec
            .settings
            .as_ref()
            .map(|settings| settings.content.as_str())
            .filter(|content| !content.is_empty())
    }
}
