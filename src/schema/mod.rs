//! Schema module - configuration, system definition and report types.

mod config;
mod definition;
mod report;

pub use config::*;
pub use definition::*;
pub use report::*;
