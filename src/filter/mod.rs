//! Filters operating on decoded images
//!
//! A filter consumes the current [`DecodedImage`] handle and returns the
//! next one. Filters run strictly in the order a stack declares them; crop
//! before resize is not the same as resize before crop.
//!
//! Built-in filters are registered under the names stacks use:
//!
//! | name              | options                                              |
//! |-------------------|------------------------------------------------------|
//! | `thumbnail`       | `size: [w, h]`, `mode: inset|outbound`, `allow_upscale` |
//! | `resize`          | `size: [w, h]`                                       |
//! | `scale`           | `dim: [w, h]` or `to: factor`                        |
//! | `upscale`         | `min: [w, h]` or `by: factor`                        |
//! | `downscale`       | `max: [w, h]` or `by: factor`                        |
//! | `relative_resize` | one of `heighten`, `widen`, `increase`, `scale`      |
//! | `crop`            | `start: [x, y]`, `size: [w, h]`                      |
//! | `flip`            | `axis: x|y`                                          |
//! | `rotate`          | `angle: 0|90|180|270`                                |
//! | `grayscale`       |                                                      |
//! | `auto_rotate`     |                                                      |
//! | `strip`           |                                                      |

pub mod resize;
pub mod transform;

use std::sync::Arc;

use crate::codec::DecodedImage;
use crate::error::TransformError;
use crate::options::Options;
use crate::registry::{Registry, RegistryBuilder, RegistryError};

pub use resize::{
    RelativeResizeFilter, ResizeFilter, ScaleFilter, ScaleMode, ThumbnailFilter, ThumbnailMode,
};
pub use transform::{
    AutoRotateFilter, CropFilter, FlipFilter, GrayscaleFilter, RotateFilter, StripFilter,
};

/// A named transformation applied to a decoded image
pub trait Filter: Send + Sync {
    /// Transform `image` according to `options`
    ///
    /// The handle is taken by value: returning a new handle releases the
    /// old one immediately.
    fn apply(&self, image: DecodedImage, options: &Options)
        -> Result<DecodedImage, TransformError>;
}

pub type FilterRegistry = Registry<dyn Filter>;

/// Builder pre-populated with every built-in filter
///
/// Callers may register additional filters before calling `build()`.
pub fn builtin_filters() -> Result<RegistryBuilder<dyn Filter>, RegistryError> {
    FilterRegistry::builder("filter")
        .register(ThumbnailFilter::NAME, Arc::new(ThumbnailFilter))?
        .register(ResizeFilter::NAME, Arc::new(ResizeFilter))?
        .register("scale", Arc::new(ScaleFilter::new(ScaleMode::Scale)))?
        .register("upscale", Arc::new(ScaleFilter::new(ScaleMode::Upscale)))?
        .register("downscale", Arc::new(ScaleFilter::new(ScaleMode::Downscale)))?
        .register(RelativeResizeFilter::NAME, Arc::new(RelativeResizeFilter))?
        .register(CropFilter::NAME, Arc::new(CropFilter))?
        .register(FlipFilter::NAME, Arc::new(FlipFilter))?
        .register(RotateFilter::NAME, Arc::new(RotateFilter))?
        .register(GrayscaleFilter::NAME, Arc::new(GrayscaleFilter))?
        .register(AutoRotateFilter::NAME, Arc::new(AutoRotateFilter))?
        .register(StripFilter::NAME, Arc::new(StripFilter))
}
