/// Helper macro to avoid retyping the base domain-like name of our system when creating further
/// string constants from it. When given no parameters, this returns the base domain-like name of
/// the system. When given a string literal parameter it adds `/parameter` to the end.
macro_rules! testrun {
    () => {
        "testrun.dev"
    };
    ($s:literal) => {
        concat!(testrun!(), "/", $s)
    };
}

// System identifiers
pub const API_VERSION: &str = testrun!("v1");
pub const NAMESPACE: &str = "testrun-system";
pub const TESTRUN: &str = testrun!();

// Component names
pub const CONTROLLER: &str = "controller";
pub const REPOSITORY: &str = "repository";
pub const VIEWER: &str = "testrun-viewer";

// Label keys
pub const LABEL_APP: &str = testrun!("app");
pub const LABEL_TEST: &str = testrun!("test");
pub const LABEL_TEST_ID: &str = testrun!("test-id");
pub const LABEL_COMPONENT: &str = testrun!("component");
pub const LABEL_REPOSITORY_COMPONENT: &str = concat!("repository.", testrun!(), "/component");

// Label values
pub const APP_TESTRUN: &str = "testrun";
pub const COMPONENT_SERVER: &str = "server";

// Test pod
pub const TEST_CONTAINER: &str = "test";
pub const TEST_VOLUME: &str = "tests";
pub const TESTS_PATH: &str = "/etc/testrun/tests";
pub const TERMINATION_LOG_PATH: &str = "/dev/termination-log";
pub const DEFAULT_TEST_IMAGE: &str = "ghcr.io/testrun/runtime:latest";
pub const TEST_COMMAND: [&str; 3] = ["/usr/local/bin/run-tests", "--tests", TESTS_PATH];

// Environment variables handed to the test pod
pub const ENV_TERMINATION_LOG: &str = "TERMINATION_LOG";
pub const ENV_TESTS_PATH: &str = "TESTS_PATH";
pub const ENV_SETTINGS_FILE: &str = "SETTINGS_FILE";
pub const ENV_DEPENDENCIES: &str = "DEPENDENCIES";
pub const ENV_S3_REPOSITORY_URL: &str = "S3_REPOSITORY_URL";
pub const ENV_S3_REPOSITORY_BUCKET: &str = "S3_REPOSITORY_BUCKET";
pub const ENV_S3_REPOSITORY_ACCESS_KEY: &str = "S3_REPOSITORY_ACCESS_KEY";
pub const ENV_S3_REPOSITORY_SECRET_KEY: &str = "S3_REPOSITORY_SECRET_KEY";

// Artifact repository
pub const REPOSITORY_PORT: u16 = 9000;
pub const DEFAULT_BUCKET: &str = "testrun";
pub const DEFAULT_REPOSITORY_IMAGE: &str = "quay.io/minio/minio:RELEASE.2023-03-24T21-41-23Z";
pub const DEFAULT_REPOSITORY_STORAGE: &str = "8Gi";
pub const ACCESS_KEY_ENTRY: &str = "access-key";
pub const SECRET_KEY_ENTRY: &str = "secret-key";

// Standard tags https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
pub const APP_NAME: &str = "app.kubernetes.io/name";
pub const APP_COMPONENT: &str = "app.kubernetes.io/component";
pub const APP_PART_OF: &str = "app.kubernetes.io/part-of";
pub const APP_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

#[test]
fn testrun_constants_macro_test() {
    assert_eq!("testrun.dev", testrun!());
    assert_eq!("testrun.dev/v1", API_VERSION);
    assert_eq!("testrun.dev/foo", testrun!("foo"));
    assert_eq!(
        "repository.testrun.dev/component",
        LABEL_REPOSITORY_COMPONENT
    );
}
