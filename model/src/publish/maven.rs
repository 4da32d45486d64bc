use super::deploy::{BuildError, BuildTool};
use async_trait::async_trait;
use log::info;
use serde::Deserialize;
use snafu::{ensure, ResultExt, Snafu};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

const POM: &str = "pom.xml";
const MAVEN_WRAPPER: &str = "./mvnw";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Unable to read '{}': {}", path.display(), source))]
    ReadPom {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to parse '{}': {}", path.display(), source))]
    ParsePom {
        path: PathBuf,
        source: quick_xml::de::DeError,
    },

    #[snafu(display("Unable to run '{}' in '{}': {}", MAVEN_WRAPPER, dir.display(), source))]
    Spawn {
        dir: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("'{} deploy' in '{}' failed with {}", MAVEN_WRAPPER, dir.display(), status))]
    Failed {
        dir: PathBuf,
        status: std::process::ExitStatus,
    },
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct Project {
    #[serde(default)]
    parent: Parent,
    #[serde(default)]
    group_id: String,
    #[serde(default)]
    artifact_id: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    packaging: String,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct Parent {
    #[serde(default)]
    group_id: String,
    #[serde(default)]
    version: String,
}

impl Project {
    fn parse(pom: &str) -> Result<Self, quick_xml::de::DeError> {
        quick_xml::de::from_str(pom)
    }

    /// `groupId:artifactId:version`, with `:packaging` appended for anything but a jar. Group and
    /// version are inherited from the parent when the project does not set them.
    fn id(&self) -> String {
        fn or_parent<'a>(own: &'a str, parent: &'a str) -> &'a str {
            if own.is_empty() {
                parent
            } else {
                own
            }
        }
        let mut id = format!(
            "{}:{}:{}",
            or_parent(&self.group_id, &self.parent.group_id),
            self.artifact_id,
            or_parent(&self.version, &self.parent.version)
        );
        if !self.packaging.is_empty() && self.packaging != "jar" {
            id.push(':');
            id.push_str(&self.packaging);
        }
        id
    }
}

/// Builds Maven projects with the project's Maven wrapper.
#[derive(Debug, Clone, Copy, Default)]
pub struct Maven;

#[async_trait]
impl BuildTool for Maven {
    async fn project_id(&self, project_dir: &Path) -> Result<String, BuildError> {
        let path = project_dir.join(POM);
        let pom = tokio::fs::read_to_string(&path)
            .await
            .context(ReadPomSnafu { path: &path })?;
        let project = Project::parse(&pom).context(ParsePomSnafu { path: &path })?;
        Ok(project.id())
    }

    async fn stage(&self, project_dir: &Path, staging_dir: &Path) -> Result<(), BuildError> {
        info!("Running the Maven deploy phase of '{}'", project_dir.display());
        let status = Command::new(MAVEN_WRAPPER)
            .arg("deploy")
            .arg("-DskipTests")
            .arg(format!(
                "-DaltDeploymentRepository=snapshot-repo::default::file:{}",
                staging_dir.display()
            ))
            .current_dir(project_dir)
            .stdin(Stdio::null())
            .status()
            .await
            .context(SpawnSnafu { dir: project_dir })?;
        ensure!(
            status.success(),
            FailedSnafu {
                dir: project_dir,
                status
            }
        );
        info!("Maven deploy phase of '{}' completed", project_dir.display());
        Ok(())
    }
}
