//! Size-changing filters
//!
//! All resampling goes through [`resize_exact`], which uses
//! fast_image_resize with a Lanczos3 kernel.

use fast_image_resize::{FilterType, Image, PixelType, ResizeAlg, Resizer};
use image::DynamicImage;
use std::num::NonZeroU32;

use super::Filter;
use crate::codec::DecodedImage;
use crate::error::TransformError;
use crate::options::{OptionReader, Options};

/// Resize every layer of `image` to exactly `width` x `height`
pub(crate) fn resize_layers(
    image: DecodedImage,
    filter: &str,
    width: u32,
    height: u32,
) -> Result<DecodedImage, TransformError> {
    if image.width() == width && image.height() == height {
        return Ok(image);
    }
    image.map_layers(|layer| resize_exact(&layer, filter, width, height))
}

/// Resample one image with Lanczos3
pub(crate) fn resize_exact(
    img: &DynamicImage,
    filter: &str,
    target_w: u32,
    target_h: u32,
) -> Result<DynamicImage, TransformError> {
    let failed = |message: String| TransformError::filter_failed(filter, message);

    let src_width =
        NonZeroU32::new(img.width()).ok_or_else(|| failed("source width is 0".into()))?;
    let src_height =
        NonZeroU32::new(img.height()).ok_or_else(|| failed("source height is 0".into()))?;
    let dst_width = NonZeroU32::new(target_w).ok_or_else(|| failed("target width is 0".into()))?;
    let dst_height =
        NonZeroU32::new(target_h).ok_or_else(|| failed("target height is 0".into()))?;

    let src_image = Image::from_vec_u8(
        src_width,
        src_height,
        img.to_rgba8().into_raw(),
        PixelType::U8x4,
    )
    .map_err(|e| failed(format!("failed to create source image: {:?}", e)))?;

    let mut dst_image = Image::new(dst_width, dst_height, PixelType::U8x4);
    let mut resizer = Resizer::new(ResizeAlg::Convolution(FilterType::Lanczos3));
    resizer
        .resize(&src_image.view(), &mut dst_image.view_mut())
        .map_err(|e| failed(format!("resize operation failed: {:?}", e)))?;

    let rgba_image = image::RgbaImage::from_raw(target_w, target_h, dst_image.into_vec())
        .ok_or_else(|| failed("failed to create output image buffer".into()))?;
    Ok(DynamicImage::ImageRgba8(rgba_image))
}

fn scaled(side: u32, ratio: f64) -> u32 {
    ((f64::from(side) * ratio).round() as u32).max(1)
}

/// How a thumbnail fits its bounding box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThumbnailMode {
    /// Fit inside the box, keeping the aspect ratio
    #[default]
    Inset,
    /// Cover the box, then crop the overflow around the center
    Outbound,
}

impl ThumbnailMode {
    fn parse(reader: &OptionReader<'_>) -> Result<Self, TransformError> {
        match reader.str("mode")? {
            None | Some("inset") => Ok(ThumbnailMode::Inset),
            Some("outbound") => Ok(ThumbnailMode::Outbound),
            Some(other) => Err(TransformError::invalid_option(
                ThumbnailFilter::NAME,
                "mode",
                format!("unknown mode '{}', expected inset or outbound", other),
            )),
        }
    }
}

/// Geometry of a thumbnail: resize target plus the optional centered crop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ThumbnailPlan {
    pub resize: (u32, u32),
    pub crop: Option<(u32, u32, u32, u32)>,
}

pub(crate) fn plan_thumbnail(
    (src_w, src_h): (u32, u32),
    (box_w, box_h): (Option<u32>, Option<u32>),
    mode: ThumbnailMode,
    allow_upscale: bool,
) -> ThumbnailPlan {
    let width_ratio = box_w.map(|w| f64::from(w) / f64::from(src_w));
    let height_ratio = box_h.map(|h| f64::from(h) / f64::from(src_h));

    let mut ratio = match (width_ratio, height_ratio, mode) {
        (Some(w), Some(h), ThumbnailMode::Inset) => w.min(h),
        (Some(w), Some(h), ThumbnailMode::Outbound) => w.max(h),
        (Some(w), None, _) => w,
        (None, Some(h), _) => h,
        (None, None, _) => 1.0,
    };
    if !allow_upscale && ratio > 1.0 {
        ratio = 1.0;
    }

    let resize = (scaled(src_w, ratio), scaled(src_h, ratio));
    let crop = match (mode, box_w, box_h) {
        (ThumbnailMode::Outbound, Some(w), Some(h)) => {
            let crop_w = w.min(resize.0).max(1);
            let crop_h = h.min(resize.1).max(1);
            if (crop_w, crop_h) == resize {
                None
            } else {
                Some((
                    (resize.0 - crop_w) / 2,
                    (resize.1 - crop_h) / 2,
                    crop_w,
                    crop_h,
                ))
            }
        }
        _ => None,
    };

    ThumbnailPlan { resize, crop }
}

/// `thumbnail`: fit or cover a bounding box
#[derive(Debug, Default)]
pub struct ThumbnailFilter;

impl ThumbnailFilter {
    pub const NAME: &'static str = "thumbnail";
}

impl Filter for ThumbnailFilter {
    fn apply(
        &self,
        image: DecodedImage,
        options: &Options,
    ) -> Result<DecodedImage, TransformError> {
        let reader = options.reader(Self::NAME);
        let size = reader.dimensions("size")?.ok_or_else(|| {
            TransformError::invalid_option(Self::NAME, "size", "option is required")
        })?;
        let mode = ThumbnailMode::parse(&reader)?;
        let allow_upscale = reader.bool("allow_upscale")?.unwrap_or(false);

        let plan = plan_thumbnail((image.width(), image.height()), size, mode, allow_upscale);
        let image = resize_layers(image, Self::NAME, plan.resize.0, plan.resize.1)?;
        match plan.crop {
            Some((x, y, w, h)) => image.map_layers(|layer| Ok(layer.crop_imm(x, y, w, h))),
            None => Ok(image),
        }
    }
}

/// `resize`: exact dimensions, aspect ratio not preserved
#[derive(Debug, Default)]
pub struct ResizeFilter;

impl ResizeFilter {
    pub const NAME: &'static str = "resize";
}

impl Filter for ResizeFilter {
    fn apply(
        &self,
        image: DecodedImage,
        options: &Options,
    ) -> Result<DecodedImage, TransformError> {
        let (width, height) = options.reader(Self::NAME).required_pair("size")?;
        resize_layers(image, Self::NAME, width, height)
    }
}

/// Which direction a [`ScaleFilter`] may go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleMode {
    /// `scale`: `dim` fits the box, `to` multiplies
    Scale,
    /// `upscale`: only grows, `min` is the box to reach, `by` adds a fraction
    Upscale,
    /// `downscale`: only shrinks, `max` is the box to fit, `by` removes a fraction
    Downscale,
}

impl ScaleMode {
    fn name(&self) -> &'static str {
        match self {
            ScaleMode::Scale => "scale",
            ScaleMode::Upscale => "upscale",
            ScaleMode::Downscale => "downscale",
        }
    }

    fn box_key(&self) -> &'static str {
        match self {
            ScaleMode::Scale => "dim",
            ScaleMode::Upscale => "min",
            ScaleMode::Downscale => "max",
        }
    }

    fn factor_key(&self) -> &'static str {
        match self {
            ScaleMode::Scale => "to",
            ScaleMode::Upscale | ScaleMode::Downscale => "by",
        }
    }
}

/// `scale`, `upscale` and `downscale`: proportional resizing
#[derive(Debug)]
pub struct ScaleFilter {
    mode: ScaleMode,
}

impl ScaleFilter {
    pub fn new(mode: ScaleMode) -> Self {
        Self { mode }
    }

    fn ratio(&self, src: (u32, u32), options: &Options) -> Result<f64, TransformError> {
        let name = self.mode.name();
        let reader = options.reader(name);
        let (src_w, src_h) = (f64::from(src.0), f64::from(src.1));

        if let Some((w, h)) = reader.dimensions(self.mode.box_key())? {
            let width_ratio = w.map(|w| f64::from(w) / src_w);
            let height_ratio = h.map(|h| f64::from(h) / src_h);
            let ratio = match (self.mode, width_ratio, height_ratio) {
                (ScaleMode::Upscale, Some(a), Some(b)) => a.max(b),
                (_, Some(a), Some(b)) => a.min(b),
                (_, Some(a), None) | (_, None, Some(a)) => a,
                (_, None, None) => 1.0,
            };
            return Ok(ratio);
        }

        let factor_key = self.mode.factor_key();
        let factor = reader.f64(factor_key)?.ok_or_else(|| {
            TransformError::invalid_option(
                name,
                self.mode.box_key(),
                format!("either '{}' or '{}' is required", self.mode.box_key(), factor_key),
            )
        })?;
        if factor <= 0.0 {
            return Err(TransformError::invalid_option(
                name,
                factor_key,
                "must be greater than zero",
            ));
        }
        Ok(match self.mode {
            ScaleMode::Scale => factor,
            ScaleMode::Upscale => 1.0 + factor,
            ScaleMode::Downscale => 1.0 - factor.min(0.99),
        })
    }
}

impl Filter for ScaleFilter {
    fn apply(
        &self,
        image: DecodedImage,
        options: &Options,
    ) -> Result<DecodedImage, TransformError> {
        let src = (image.width(), image.height());
        let ratio = self.ratio(src, options)?;

        let skip = match self.mode {
            ScaleMode::Scale => false,
            ScaleMode::Upscale => ratio <= 1.0,
            ScaleMode::Downscale => ratio >= 1.0,
        };
        if skip {
            return Ok(image);
        }
        resize_layers(
            image,
            self.mode.name(),
            scaled(src.0, ratio),
            scaled(src.1, ratio),
        )
    }
}

/// `relative_resize`: resize relative to the current dimensions
#[derive(Debug, Default)]
pub struct RelativeResizeFilter;

impl RelativeResizeFilter {
    pub const NAME: &'static str = "relative_resize";
}

impl Filter for RelativeResizeFilter {
    fn apply(
        &self,
        image: DecodedImage,
        options: &Options,
    ) -> Result<DecodedImage, TransformError> {
        let reader = options.reader(Self::NAME);
        let (w, h) = (image.width(), image.height());
        let ratio_w = |target: u32| f64::from(target) / f64::from(w);
        let ratio_h = |target: u32| f64::from(target) / f64::from(h);

        let (width, height) = if let Some(target) = reader.u32("heighten")? {
            (scaled(w, ratio_h(target)), target.max(1))
        } else if let Some(target) = reader.u32("widen")? {
            (target.max(1), scaled(h, ratio_w(target)))
        } else if let Some(delta) = reader.u32("increase")? {
            (w.saturating_add(delta), h.saturating_add(delta))
        } else if let Some(factor) = reader.f64("scale")? {
            if factor <= 0.0 {
                return Err(TransformError::invalid_option(
                    Self::NAME,
                    "scale",
                    "must be greater than zero",
                ));
            }
            (scaled(w, factor), scaled(h, factor))
        } else {
            return Err(TransformError::invalid_option(
                Self::NAME,
                "heighten",
                "one of heighten, widen, increase or scale is required",
            ));
        };

        resize_layers(image, Self::NAME, width, height)
    }
}
