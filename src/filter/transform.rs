//! Geometry and color filters that do not resample

use super::Filter;
use crate::codec::DecodedImage;
use crate::error::TransformError;
use crate::options::Options;

/// `crop`: cut a rectangle starting at `start`
///
/// The requested size is clamped to the area remaining after `start`; a
/// start point outside the image is an error.
#[derive(Debug, Default)]
pub struct CropFilter;

impl CropFilter {
    pub const NAME: &'static str = "crop";
}

impl Filter for CropFilter {
    fn apply(
        &self,
        image: DecodedImage,
        options: &Options,
    ) -> Result<DecodedImage, TransformError> {
        let reader = options.reader(Self::NAME);
        let (x, y) = reader.pair("start")?.unwrap_or((0, 0));
        let (w, h) = reader.required_pair("size")?;

        let (img_w, img_h) = (image.width(), image.height());
        if x >= img_w || y >= img_h {
            return Err(TransformError::filter_failed(
                Self::NAME,
                format!(
                    "start point ({}, {}) lies outside the {}x{} image",
                    x, y, img_w, img_h
                ),
            ));
        }
        let w = w.min(img_w - x).max(1);
        let h = h.min(img_h - y).max(1);
        image.map_layers(|layer| Ok(layer.crop_imm(x, y, w, h)))
    }
}

/// `flip`: mirror along the x (horizontal) or y (vertical) axis
#[derive(Debug, Default)]
pub struct FlipFilter;

impl FlipFilter {
    pub const NAME: &'static str = "flip";
}

impl Filter for FlipFilter {
    fn apply(
        &self,
        image: DecodedImage,
        options: &Options,
    ) -> Result<DecodedImage, TransformError> {
        match options.reader(Self::NAME).str("axis")? {
            None | Some("x") | Some("horizontal") => image.map_layers(|layer| Ok(layer.fliph())),
            Some("y") | Some("vertical") => image.map_layers(|layer| Ok(layer.flipv())),
            Some(other) => Err(TransformError::invalid_option(
                Self::NAME,
                "axis",
                format!("unknown axis '{}', expected x or y", other),
            )),
        }
    }
}

/// `rotate`: clockwise rotation by a multiple of 90 degrees
#[derive(Debug, Default)]
pub struct RotateFilter;

impl RotateFilter {
    pub const NAME: &'static str = "rotate";
}

impl Filter for RotateFilter {
    fn apply(
        &self,
        image: DecodedImage,
        options: &Options,
    ) -> Result<DecodedImage, TransformError> {
        let angle = options.reader(Self::NAME).f64("angle")?.unwrap_or(0.0);
        // Normalize negative angles, e.g. -90 → 270
        let normalized = angle.rem_euclid(360.0);
        match normalized as u32 {
            0 if normalized == 0.0 => Ok(image),
            90 if normalized == 90.0 => image.map_layers(|layer| Ok(layer.rotate90())),
            180 if normalized == 180.0 => image.map_layers(|layer| Ok(layer.rotate180())),
            270 if normalized == 270.0 => image.map_layers(|layer| Ok(layer.rotate270())),
            _ => Err(TransformError::invalid_option(
                Self::NAME,
                "angle",
                format!("{} is not a multiple of 90", angle),
            )),
        }
    }
}

/// `grayscale`: desaturate every frame
#[derive(Debug, Default)]
pub struct GrayscaleFilter;

impl GrayscaleFilter {
    pub const NAME: &'static str = "grayscale";
}

impl Filter for GrayscaleFilter {
    fn apply(
        &self,
        image: DecodedImage,
        _options: &Options,
    ) -> Result<DecodedImage, TransformError> {
        // Keep an alpha channel so transparent sources stay transparent
        image.map_layers(|layer| {
            Ok(if layer.color().has_alpha() {
                image::DynamicImage::ImageLumaA8(layer.to_luma_alpha8())
            } else {
                image::DynamicImage::ImageLuma8(layer.to_luma8())
            })
        })
    }
}

/// `auto_rotate`: apply the EXIF orientation to the pixels
///
/// After this filter the image is upright and carries no orientation, so a
/// second `auto_rotate` is a no-op.
#[derive(Debug, Default)]
pub struct AutoRotateFilter;

impl AutoRotateFilter {
    pub const NAME: &'static str = "auto_rotate";
}

impl Filter for AutoRotateFilter {
    fn apply(
        &self,
        image: DecodedImage,
        _options: &Options,
    ) -> Result<DecodedImage, TransformError> {
        let orientation = image.orientation();
        let image = match orientation {
            Some(2) => image.map_layers(|l| Ok(l.fliph()))?,
            Some(3) => image.map_layers(|l| Ok(l.rotate180()))?,
            Some(4) => image.map_layers(|l| Ok(l.flipv()))?,
            Some(5) => image.map_layers(|l| Ok(l.rotate90().fliph()))?,
            Some(6) => image.map_layers(|l| Ok(l.rotate90()))?,
            Some(7) => image.map_layers(|l| Ok(l.rotate270().fliph()))?,
            Some(8) => image.map_layers(|l| Ok(l.rotate270()))?,
            _ => image,
        };
        Ok(image.with_orientation(None))
    }
}

/// `strip`: drop metadata carried alongside the pixels
///
/// Encoders never write EXIF, so the only metadata left on a decoded handle
/// is the orientation tag.
#[derive(Debug, Default)]
pub struct StripFilter;

impl StripFilter {
    pub const NAME: &'static str = "strip";
}

impl Filter for StripFilter {
    fn apply(
        &self,
        image: DecodedImage,
        _options: &Options,
    ) -> Result<DecodedImage, TransformError> {
        Ok(image.with_orientation(None))
    }
}
