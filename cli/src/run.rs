use anyhow::{Context, Result};
use clap::{value_parser, Parser};
use std::path::{Path, PathBuf};
use testrun_model::clients::TestRunClient;
use testrun_model::{create_test_run_crd, SourceFile, TestRunSpec};

/// Run the test in a local file. The file is handed to the test pod together with the optional
/// settings.
#[derive(Debug, Parser)]
pub(crate) struct Run {
    /// Path to the test source.
    #[clap(value_parser = value_parser!(PathBuf))]
    path: PathBuf,

    /// The namespace to run the test in.
    #[clap(long, short = 'n', default_value = "default")]
    namespace: String,

    /// Name of the test run. Defaults to the file name of the test without its extension.
    #[clap(long)]
    name: Option<String>,

    /// A settings file that is mounted next to the test.
    #[clap(long, value_parser = value_parser!(PathBuf))]
    settings: Option<PathBuf>,

    /// Dependencies for the test, passed to the test pod as they are. Ignored when `--settings`
    /// is given.
    #[clap(long, conflicts_with = "settings")]
    dependencies: Option<String>,

    /// Environment for the test pod in `KEY=VALUE` form. Can be repeated.
    #[clap(long = "env", short = 'e')]
    env: Vec<String>,
}

impl Run {
    pub(crate) async fn run(self, client: kube::Client) -> Result<()> {
        let name = match &self.name {
            Some(name) => name.clone(),
            None => test_name(&self.path)?,
        };
        let spec = self.spec().await?;
        let test_run = create_test_run_crd(name.as_str(), self.namespace.as_str(), spec);
        TestRunClient::new_from_k8s_client(client)
            .create(&test_run)
            .await
            .context(format!("Unable to create test run '{}'", name))?;
        println!("Successfully added '{}'.", name);
        Ok(())
    }

    async fn spec(&self) -> Result<TestRunSpec> {
        let settings = match (&self.settings, &self.dependencies) {
            (Some(path), _) => Some(read_source(path).await?),
            (None, Some(dependencies)) => Some(SourceFile {
                name: String::new(),
                content: dependencies.clone(),
            }),
            (None, None) => None,
        };
        Ok(TestRunSpec {
            source: read_source(&self.path).await?,
            settings,
            env: self.env.clone(),
        })
    }
}

async fn read_source(path: &Path) -> Result<SourceFile> {
    let content = tokio::fs::read_to_string(path)
        .await
        .context(format!("Unable to read '{}'", path.display()))?;
    Ok(SourceFile {
        name: file_name(path)?,
        content,
    })
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .context(format!("'{}' is not a file", path.display()))
}

/// A test run name derived from the test file, e.g. `login` for `features/login.feature`. Object
/// names are lowercase.
fn test_name(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_lowercase().replace(&['_', '.'][..], "-"))
        .filter(|name| !name.is_empty())
        .context(format!(
            "Unable to derive a test run name from '{}', use --name",
            path.display()
        ))
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn names_from_paths() {
        assert_eq!(test_name(Path::new("features/login.feature")).unwrap(), "login");
        assert_eq!(
            test_name(Path::new("Checkout_Flow.feature")).unwrap(),
            "checkout-flow"
        );
        assert!(test_name(Path::new("/")).is_err());
    }

    #[tokio::test]
    async fn spec_from_files() {
        let dir = TempDir::new().unwrap();
        let test = dir.path().join("login.feature");
        let settings = dir.path().join("settings.yaml");
        std::fs::write(&test, "Feature: login").unwrap();
        std::fs::write(&settings, "dependencies: []").unwrap();
        let run = Run {
            path: test,
            namespace: "default".into(),
            name: None,
            settings: Some(settings),
            dependencies: None,
            env: vec!["A=B".into()],
        };
        let spec = run.spec().await.unwrap();
        assert_eq!(spec.source.name, "login.feature");
        assert_eq!(spec.source.content, "Feature: login");
        let settings = spec.settings.unwrap();
        assert_eq!(settings.name, "settings.yaml");
        assert_eq!(settings.content, "dependencies: []");
        assert_eq!(spec.env, vec!["A=B".to_string()]);
    }

    #[tokio::test]
    async fn inline_dependencies() {
        let dir = TempDir::new().unwrap();
        let test = dir.path().join("login.feature");
        std::fs::write(&test, "Feature: login").unwrap();
        let run = Run {
            path: test,
            namespace: "default".into(),
            name: None,
            settings: None,
            dependencies: Some("org.example:lib:1.0".into()),
            env: Vec::new(),
        };
        let settings = run.spec().await.unwrap().settings.unwrap();
        assert!(settings.name.is_empty());
        assert_eq!(settings.content, "org.example:lib:1.0");
    }
}
