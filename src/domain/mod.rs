//! Domain layer for the kernelwatch build supervisor
//!
//! This module contains the build run model, configuration types, errors and
//! the ports the services depend on.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{BuildError, BuildResult};
