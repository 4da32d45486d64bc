/*!

Provides utilities for testing the TestRun system using `kind` and `docker`.
We call this testing modality `selftest` to distinguish it from the tests that `TestRun`s execute.

!*/

pub mod cluster;
mod test_settings;

pub use cluster::Cluster;
