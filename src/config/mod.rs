//! Configuration module
//!
//! Handles loading and validation of `retrodrive` configuration files:
//! proxy backend selection, engine timing, the simulated page and the
//! answers the workflow picks on the form.

pub mod loader;
pub mod schema;

pub use loader::{ConfigLoader, LoadResult, LoadWarning, validate};
pub use schema::*;
