/*!

This library provides the `TestRun` custom resource definition and the building blocks that act on
the cluster on its behalf: an idempotent upsert of cluster objects, a pod readiness poller, port
forwarding tunnels, the per-namespace artifact repository and publishing to it.

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

pub use clients::create_test_run_crd;
pub use crd_ext::CrdExt;
pub use manifest::{Manifest, ObjectType};
pub use test_run::{Phase, SourceFile, TestRun, TestRunSpec, TestRunStatus};

pub mod clients;
pub mod constants;
mod crd_ext;
mod manifest;
pub mod poll;
pub mod publish;
pub mod repository;
pub mod system;
mod test_run;
pub mod tunnel;
pub mod upsert;
