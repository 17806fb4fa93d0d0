pub mod error;
pub mod traits;
pub mod types;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "kube")]
pub mod k8s;

pub use error::*;
pub use traits::*;
pub use types::*;
