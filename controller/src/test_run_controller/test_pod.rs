use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, EnvVar, EnvVarSource, Pod, PodSpec,
    SecretKeySelector, Volume, VolumeMount,
};
use std::collections::BTreeMap;
use testrun_model::constants::{
    ENV_DEPENDENCIES, ENV_S3_REPOSITORY_ACCESS_KEY, ENV_S3_REPOSITORY_BUCKET,
    ENV_S3_REPOSITORY_SECRET_KEY, ENV_S3_REPOSITORY_URL, ENV_SETTINGS_FILE, ENV_TERMINATION_LOG,
    ENV_TESTS_PATH, TERMINATION_LOG_PATH, TESTS_PATH, TEST_COMMAND, TEST_CONTAINER, TEST_VOLUME,
    VIEWER,
};
use testrun_model::repository::Credentials;
use testrun_model::TestRun;

/// What a test pod needs to reach the artifact repository of its namespace.
#[derive(Debug, Clone)]
pub(crate) struct RepositoryAccess {
    pub(crate) url: String,
    pub(crate) bucket: String,
    pub(crate) credentials: Credentials,
}

/// Builds the config map and pod of a test run. Both are fully determined by the test run, so
/// building them twice yields the same objects.
#[derive(Debug, Clone)]
pub(crate) struct TestPodBuilder<'a> {
    pub(crate) test_run: &'a TestRun,
    pub(crate) image: &'a str,
    pub(crate) repository: Option<RepositoryAccess>,
}

impl TestPodBuilder<'_> {
    /// Maps file name to content for the test source and, if it is a file, the settings.
    pub(crate) fn config_map(&self) -> ConfigMap {
        let spec = &self.test_run.spec;
        let mut data = BTreeMap::new();
        data.insert(spec.source.name.clone(), spec.source.content.clone());
        if let (Some(name), Some(settings)) =
            (self.test_run.settings_file_name(), spec.settings.as_ref())
        {
            data.insert(name.to_owned(), settings.content.clone());
        }
        ConfigMap {
            metadata: self.test_run.child_meta(),
            data: Some(data),
            ..ConfigMap::default()
        }
    }

    pub(crate) fn pod(&self) -> Pod {
        Pod {
            metadata: self.test_run.child_meta(),
            spec: Some(PodSpec {
                service_account_name: Some(VIEWER.to_owned()),
                containers: vec![Container {
                    name: TEST_CONTAINER.to_owned(),
                    image: Some(self.image.to_owned()),
                    command: Some(TEST_COMMAND.iter().map(|s| (*s).to_owned()).collect()),
                    termination_message_policy: Some("FallbackToLogsOnError".to_owned()),
                    termination_message_path: Some(TERMINATION_LOG_PATH.to_owned()),
                    image_pull_policy: Some("IfNotPresent".to_owned()),
                    volume_mounts: Some(vec![VolumeMount {
                        name: TEST_VOLUME.to_owned(),
                        mount_path: TESTS_PATH.to_owned(),
                        ..VolumeMount::default()
                    }]),
                    env: Some(self.env_vars()),
                    ..Container::default()
                }],
                restart_policy: Some(String::from("Never")),
                volumes: Some(vec![Volume {
                    name: TEST_VOLUME.to_owned(),
                    config_map: Some(ConfigMapVolumeSource {
                        name: Some(self.test_run.resource_name()),
                        ..ConfigMapVolumeSource::default()
                    }),
                    ..Volume::default()
                }]),
                ..PodSpec::default()
            }),
            ..Pod::default()
        }
    }

    fn env_vars(&self) -> Vec<EnvVar> {
        let mut vars = vec![
            env_var(ENV_TERMINATION_LOG, TERMINATION_LOG_PATH),
            env_var(ENV_TESTS_PATH, TESTS_PATH),
        ];
        vars.extend(
            parse_env(&self.test_run.spec.env)
                .into_iter()
                .map(|(name, value)| env_var(name, value)),
        );

        if let Some(name) = self.test_run.settings_file_name() {
            vars.push(env_var(ENV_SETTINGS_FILE, format!("{}/{}", TESTS_PATH, name)));
        } else if let Some(content) = self.test_run.settings_content() {
            vars.push(env_var(ENV_DEPENDENCIES, content));
        }

        if let Some(repository) = &self.repository {
            let credentials = &repository.credentials;
            vars.push(env_var(ENV_S3_REPOSITORY_URL, &repository.url));
            vars.push(env_var(ENV_S3_REPOSITORY_BUCKET, &repository.bucket));
            vars.push(secret_env_var(
                ENV_S3_REPOSITORY_ACCESS_KEY,
                &credentials.secret_name,
                &credentials.access_key_entry,
            ));
            vars.push(secret_env_var(
                ENV_S3_REPOSITORY_SECRET_KEY,
                &credentials.secret_name,
                &credentials.secret_key_entry,
            ));
        }
        vars
    }
}

/// Parses `KEY=VALUE` entries in order. Entries are split on the first `=` and both halves are
/// trimmed; entries without `=` or with an empty half are dropped.
pub(crate) fn parse_env(entries: &[String]) -> Vec<(String, String)> {
    entries
        .iter()
        .filter_map(|entry| entry.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .filter(|(key, value)| !key.is_empty() && !value.is_empty())
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}

fn env_var<S1, S2>(name: S1, value: S2) -> EnvVar
where
    S1: Into<String>,
    S2: Into<String>,
{
    EnvVar {
        name: name.into(),
        value: Some(value.into()),
        value_from: None,
    }
}

fn secret_env_var(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_owned(),
        value: None,
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: Some(secret.to_owned()),
                key: key.to_owned(),
                optional: None,
            }),
            ..EnvVarSource::default()
        }),
    }
}
