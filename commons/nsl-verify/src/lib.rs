//! Namespace lifecycle verification: a bounded poller, a bulk
//! create/delete convergence driver, a cascade-deletion verifier and a
//! label patch check, all driven through a [`nsl_client::ResourceClient`].

pub mod bulk;
pub mod cascade;
pub mod config;
pub mod error;
pub mod patch;
pub mod poller;

pub use bulk::{BulkLifecycleDriver, BulkReport, LifecycleBatch};
pub use cascade::{CascadeReport, CascadeVerifier};
pub use config::{BulkConfig, CascadeConfig, VerifyConfig};
pub use error::{DeleteFailure, VerifyError, VerifyResult};
pub use patch::verify_label_patch;
pub use poller::{PollError, PollOutcome, PollStats, Poller};
