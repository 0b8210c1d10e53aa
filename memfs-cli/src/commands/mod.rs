//! CLI command implementations.

pub mod run;
pub mod tar;
pub mod version;
