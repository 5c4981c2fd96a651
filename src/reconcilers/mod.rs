//! Reconcilers for Scribe CRDs
//!
//! This module contains the business logic for reconciling each CRD type.
//! Reconcilers are responsible for:
//! - Validating CRD specs
//! - Driving the mover Job
//! - Updating resource status

pub mod data_mover;
