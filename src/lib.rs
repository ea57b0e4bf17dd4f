// Imagestack image transformation library
//
// Named stacks of filters and post-processors applied to source images,
// with derivatives cached in a pluggable image store.

pub mod artifact;
pub mod codec;
pub mod coalescing;
pub mod config;
pub mod constants;
pub mod error;
pub mod filter;
pub mod format;
pub mod loader;
pub mod logging;
pub mod metrics;
pub mod options;
pub mod postprocessor;
pub mod registry;
pub mod signing;
pub mod stack;
pub mod store;
pub mod transformer;
pub mod warmup;

pub use artifact::ImageArtifact;
pub use error::TransformError;
pub use format::ImageFormat;
pub use transformer::Transformer;
