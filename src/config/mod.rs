//! Configuration loading and management.
//!
//! All LunaSentri configuration is environment-driven (`spec.md` Sec. 6
//! lists the full surface); this module is split the way the teacher
//! splits its own config module, just across env-parsing concerns instead
//! of TOML sub-blocks:
//! - [`defaults`]: default constant values
//! - [`validation`]: post-load sanity checks
//! - [`types`]: the `Config` struct itself and its `load()` entry point

mod defaults;
mod types;
mod validation;

pub use types::{Config, LogFormat};
