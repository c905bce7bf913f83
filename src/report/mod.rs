//! Report emission and rendering.

pub mod emitter;
pub mod generator;

pub use emitter::{emit, RenderPayload};
pub use generator::{renderer_for, write_summary};
