mod error;
mod http_status_code;
#[cfg(any(test, feature = "mock"))]
mod memory;
mod store;
mod test_run_client;

pub use error::{Error, Result};
pub use http_status_code::{api_error, HttpStatusCode, StatusCode};
#[cfg(any(test, feature = "mock"))]
pub use memory::MemoryStore;
pub use store::{label_selector, ClusterStore, KubeStore};
pub use test_run_client::{create_test_run_crd, TestRunClient};
