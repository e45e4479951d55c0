//! Repository layer
//!
//! Repositories are thin HTTP adapters over the services running inside
//! test containers. They carry no business logic and take the container's
//! base URL per call, since every container gets its own ephemeral port.
//!
//! All repositories are trait-based to enable testing and mocking.

mod build;
mod health;

// Re-export traits
pub use build::BuildRepository;
pub use health::HealthRepository;

// Re-export implementations
pub use build::HttpBuildRepository;
pub use health::HttpHealthRepository;
