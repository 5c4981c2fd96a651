//! Scribe mover operator
//!
//! Reconciles the Kubernetes Job that runs a data mover (rsync, restic or
//! rclone) for a DataMover resource, and abandons the Job once it has
//! failed too many times.

pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod job;
pub mod metrics;
pub mod mover;
pub mod reconcilers;

pub use error::{Error, Result};
