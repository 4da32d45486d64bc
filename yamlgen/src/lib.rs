/*!

This crate is used to write out the YAML representation of the `TestRun` CRD.
The CRD is defined in Rust and we typically install it using the `testrun` CLI, thus the YAML
representation is not strictly necessary.

This `lib.rs` file is intentionally empty as `yamlgen` provides a `build.rs` that is invoked during
builds of other crates that specify `yamlgen` as a `build-dependency`.

!*/
