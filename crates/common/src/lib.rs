//! Common types for oauthctl

mod error;
pub mod paths;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
