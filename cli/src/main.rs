/*!

This is the command line interface for installing the test run controller into a cluster, running
tests in it, and publishing build artifacts to the artifact repository of a namespace.

!*/

mod deploy;
mod install;
mod install_repository;
mod publish;
mod run;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Builder;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use log::LevelFilter;
use std::path::{Path, PathBuf};

/// The command line interface for running tests in a cluster.
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Args {
    /// Set logging verbosity [trace|debug|info|warn|error]. If the environment variable `RUST_LOG`
    /// is present, it overrides the default logging behavior. See https://docs.rs/env_logger/latest
    #[clap(long = "log-level", default_value = "info")]
    log_level: LevelFilter,
    /// Path to the kubeconfig file. Also can be passed with the KUBECONFIG environment variable.
    #[clap(long = "kubeconfig")]
    kubeconfig: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// Install the controller and the TestRun CRD into the cluster.
    Install(install::Install),
    /// Run a test in the cluster.
    Run(run::Run),
    /// Install the artifact repository into a namespace.
    InstallRepository(install_repository::InstallRepository),
    /// Build a Maven project and publish it to the artifact repository of a namespace.
    Deploy(deploy::Deploy),
    /// Publish a directory to the artifact repository of a namespace.
    Publish(publish::Publish),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(args.log_level);
    if let Err(e) = run(args).await {
        eprintln!("{:?}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let client = k8s_client(args.kubeconfig.as_deref()).await?;
    match args.command {
        Command::Install(install) => install.run(client).await,
        Command::Run(run) => run.run(client).await,
        Command::InstallRepository(install_repository) => install_repository.run(client).await,
        Command::Deploy(deploy) => deploy.run(client).await,
        Command::Publish(publish) => publish.run(client).await,
    }
}

async fn k8s_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let path = match kubeconfig {
        Some(path) => path,
        None => {
            return Client::try_default()
                .await
                .context("Unable to create default k8s client")
        }
    };
    let kubeconfig = Kubeconfig::read_from(path)
        .with_context(|| format!("Unable to read kubeconfig '{}'", path.display()))?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .with_context(|| format!("Unable to load kubeconfig '{}'", path.display()))?;
    Client::try_from(config).context("Unable to create k8s client from kubeconfig")
}

/// Initialize the logger with the value passed by `--log-level` (or its default) when the
/// `RUST_LOG` environment variable is not present. If present, the `RUST_LOG` environment variable
/// overrides `--log-level`/`level`.
fn init_logger(level: LevelFilter) {
    match std::env::var(env_logger::DEFAULT_FILTER_ENV).ok() {
        Some(_) => {
            // RUST_LOG exists; env_logger will use it.
            Builder::from_default_env().init();
        }
        None => {
            // RUST_LOG does not exist; use default log level for this crate and the model.
            Builder::new()
                .filter(Some(env!("CARGO_CRATE_NAME")), level)
                .filter(Some("testrun_model"), level)
                .init();
        }
    }
}

#[test]
fn parse_subcommands() {
    let args = Args::try_parse_from([
        "testrun",
        "run",
        "--namespace",
        "tests",
        "--env",
        "A=B",
        "--env",
        "C=D",
        "login.feature",
    ])
    .unwrap();
    assert!(matches!(args.command, Command::Run(_)));
    assert_eq!(args.log_level, LevelFilter::Info);

    let args = Args::try_parse_from([
        "testrun",
        "--log-level",
        "debug",
        "deploy",
        "--direct",
        "--bucket",
        "maven/releases",
    ])
    .unwrap();
    assert!(matches!(args.command, Command::Deploy(_)));
    assert_eq!(args.log_level, LevelFilter::Debug);
}
