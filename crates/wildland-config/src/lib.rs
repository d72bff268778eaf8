//! On-disk configuration file and per-type manifest catalog directories
//! (spec.md §4.8), including the shared write-temp-then-rename atomicity
//! helper reused by every manifest-writing call site.

mod catalog;
mod config;
mod error;

pub use catalog::{atomic_write, Catalog, ObjectType};
pub use config::Config;
pub use error::{ConfigError, Result};
