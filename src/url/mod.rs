//! URL handling module for Archive-Dispatch
//!
//! This module provides target URL cleaning and validation, endpoint template
//! expansion, and deterministic container naming.

mod domain;
mod naming;
mod normalize;
mod template;

// Re-export main functions
pub use domain::{extract_domain, origin_of};
pub use naming::container_file_name;
pub use normalize::{clean_url, validate_target_url};
pub use template::expand_template;
