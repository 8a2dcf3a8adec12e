//! Data models for the OBD gateway

mod envelope;
mod sample;
mod status;

pub use envelope::*;
pub use sample::*;
pub use status::*;
