//! Shared types for the proxy rotator workspace

mod error;

pub use error::{Error, Result};
