//! Service layer
//!
//! Services contain the pipeline's business logic: moving artifacts through
//! the store, driving remote builds, staging artifacts locally and verifying
//! deployed applications. They use repositories for HTTP and never talk to
//! the container engine directly.

mod build;
mod probe;
mod staging;
mod store;

pub use build::{BuildRequest, BuildTrigger};
pub use probe::RuntimeProbe;
pub use staging::extract_archive;

// Re-export trait and implementation
pub use store::ArtifactStore;
pub use store::BlobArtifactStore;
