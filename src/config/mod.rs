//! Configuration module for Archive-Dispatch
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section has defaults, so an empty file yields the built-in service set.
//!
//! # Example
//!
//! ```no_run
//! use archive_dispatch::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("dispatch.toml")).unwrap();
//! println!("Configured services: {:?}", config.service_names());
//! ```

pub mod defaults;
mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, DispatchMode, DispatcherConfig, MarkerConfig, OutputConfig, ServiceConfig,
    ServiceKind, SourceConfig, SourceFormat, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
