//! Transformation stacks
//!
//! A stack is a named recipe: ordered filters, ordered post-processors and
//! encode settings. [`StackConfigResolver`] merges each stack over the
//! default settings once at startup; [`StackExecutor`] runs a resolved
//! stack against an artifact.

pub mod config;
pub mod executor;

pub use config::{StackConfig, StackConfigResolver, StackSettings};
pub use executor::{export, try_export, Export, StackExecutor};
