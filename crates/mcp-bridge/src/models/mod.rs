//! Tool parameter models.
//!
//! Every tool argument object deserializes into one of these; unknown enum values are
//! rejected by `serde` before a tool runs.

mod enums;
mod inputs;

pub use enums::{OutputFormat, WriteMode};
pub use inputs::*;
