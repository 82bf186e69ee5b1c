//! Support code for the `delegate` command line tool.

pub mod config;

pub use config::{ConfigError, FileConfig};
