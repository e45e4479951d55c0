//! Core domain types
//!
//! This module contains the structures shared between the HTTP client (which
//! decodes build-service records) and the runner (which drives the matrix).

pub mod artifact;
pub mod build;
pub mod combination;
pub mod config;
pub mod container;
pub mod result;
