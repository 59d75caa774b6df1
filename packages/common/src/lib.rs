//! Shared plumbing for the easel crates: errors, engine configuration and
//! tracing setup.

pub mod config;
pub mod error;
pub mod logging;
pub mod result;

pub use config::*;
pub use error::*;
pub use logging::init_tracing;
pub use result::*;
