//! Matrix Core
//!
//! Core types and abstractions for the build/deploy/verify matrix.
//!
//! This crate contains:
//! - Domain types: configuration, version combinations, containers, artifacts, results
//! - Error taxonomy shared by the HTTP client and the runner
//! - Bounded retry policies used by every polling loop

pub mod domain;
pub mod error;
pub mod retry;
