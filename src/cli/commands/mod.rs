//! CLI command implementations

pub mod config;
pub mod replay;

pub use config::execute as config;
pub use replay::execute as replay;
