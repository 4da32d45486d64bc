use crate::constants::{parse_duration, DEFAULT_ERROR_REQUEUE, DEFAULT_REQUEUE};
use crate::error::{self, Result};
use serde::Deserialize;
use snafu::{OptionExt, ResultExt};
use std::time::Duration;
use testrun_model::constants::{DEFAULT_BUCKET, DEFAULT_TEST_IMAGE};

/// Environment variables read by the controller all start with this.
const ENV_PREFIX: &str = "TESTRUN_";

/// The controller settings as they appear in the environment, e.g. `TESTRUN_TEST_IMAGE`.
#[derive(Debug, Deserialize)]
struct Settings {
    #[serde(default = "default_test_image")]
    test_image: String,
    #[serde(default = "default_bucket")]
    repository_bucket: String,
    #[serde(default = "default_requeue")]
    requeue: String,
    #[serde(default = "default_error_requeue")]
    error_requeue: String,
}

fn default_test_image() -> String {
    DEFAULT_TEST_IMAGE.to_string()
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

fn default_requeue() -> String {
    DEFAULT_REQUEUE.to_string()
}

fn default_error_requeue() -> String {
    DEFAULT_ERROR_REQUEUE.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ControllerConfig {
    /// The image of the test pods.
    pub(crate) test_image: String,
    /// The bucket test pods are told to use when the namespace has a repository.
    pub(crate) repository_bucket: String,
    /// Delay before a test run that is still in progress is looked at again.
    pub(crate) requeue: Duration,
    /// Delay before a failed reconciliation is retried.
    pub(crate) error_requeue: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            test_image: default_test_image(),
            repository_bucket: default_bucket(),
            requeue: Duration::from_secs(5),
            error_requeue: Duration::from_secs(30),
        }
    }
}

impl ControllerConfig {
    pub(crate) fn from_env() -> Result<Self> {
        Self::from_iter(std::env::vars())
    }

    fn from_iter<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let settings: Settings = envy::prefixed(ENV_PREFIX)
            .from_iter(vars)
            .context(error::ConfigSnafu)?;
        Ok(Self {
            requeue: duration("requeue", &settings.requeue)?,
            error_requeue: duration("error_requeue", &settings.error_requeue)?,
            test_image: settings.test_image,
            repository_bucket: settings.repository_bucket,
        })
    }
}

fn duration(setting: &str, input: &str) -> Result<Duration> {
    parse_duration(input).context(error::InvalidDurationSnafu { setting, input })
}

#[cfg(test)]
mod test {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults() {
        let config = ControllerConfig::from_iter(vars(&[("PATH", "/usr/bin")])).unwrap();
        assert_eq!(config, ControllerConfig::default());
    }

    #[test]
    fn overrides() {
        let config = ControllerConfig::from_iter(vars(&[
            ("TESTRUN_TEST_IMAGE", "example.com/runtime:1"),
            ("TESTRUN_REPOSITORY_BUCKET", "artifacts"),
            ("TESTRUN_REQUEUE", "1m"),
        ]))
        .unwrap();
        assert_eq!(config.test_image, "example.com/runtime:1");
        assert_eq!(config.repository_bucket, "artifacts");
        assert_eq!(config.requeue, Duration::from_secs(60));
        assert_eq!(config.error_requeue, Duration::from_secs(30));
    }

    #[test]
    fn bad_duration() {
        let error =
            ControllerConfig::from_iter(vars(&[("TESTRUN_ERROR_REQUEUE", "5y")])).unwrap_err();
        assert!(error.to_string().contains("5y"), "{}", error);
    }
}
