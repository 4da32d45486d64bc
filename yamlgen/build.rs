/*!

The custom resource definition is modeled as a Rust struct in the model crate. Here we generate
the corresponding k8s yaml file. It is not needed to install the controller, since the `testrun`
CLI installs the CRD from the Rust definition, but it comes in handy for reference, testing and
development. Crates that depend on the file can add yamlgen as a build dependency to ensure the
file is current. Scripts can call `cargo build --package yamlgen`.

!*/

use kube::CustomResourceExt;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use testrun_model::TestRun;

const YAMLGEN_DIR: &str = env!("CARGO_MANIFEST_DIR");
const HEADER: &str = "# This file is generated. Do not edit.\n";

fn main() {
    // Re-run this build script if the model changes.
    println!("cargo:rerun-if-changed=../model/src");

    let dir = PathBuf::from(YAMLGEN_DIR).join("deploy");
    std::fs::create_dir_all(&dir)
        .unwrap_or_else(|e| panic!("unable to create '{}': {}", dir.display(), e));
    let path = dir.join("testrun-crd.yaml");

    let mut f = File::create(&path)
        .unwrap_or_else(|e| panic!("unable to open file '{}' for writing: {}", path.display(), e));

    f.write_all(HEADER.as_bytes())
        .expect("unable to write file header");
    serde_yaml::to_writer(&f, &TestRun::crd()).expect("unable to write TestRun CRD");
}
