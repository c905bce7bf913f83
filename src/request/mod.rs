//! Building and validating the comparison request.

pub mod loader;

pub use loader::{load, LoadArgs};
