//! Decode / encode capability
//!
//! The pipeline never touches pixel codecs directly. It goes through the
//! [`ImageCodec`] trait, which turns an [`ImageArtifact`] into an owned
//! [`DecodedImage`] handle and back. [`RasterCodec`] is the default
//! implementation on top of the `image` crate (plus `ravif` for AVIF).

use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::io::Reader as ImageReader;
use image::{AnimationDecoder, Delay, DynamicImage, Frame, ImageEncoder as _};
use std::io::Cursor;

use crate::artifact::ImageArtifact;
use crate::error::TransformError;
use crate::format::ImageFormat;

/// One frame of a decoded image
#[derive(Debug, Clone)]
pub struct Layer {
    pub image: DynamicImage,
    /// Display time of this frame (zero for still images)
    pub delay: Delay,
}

impl Layer {
    pub fn still(image: DynamicImage) -> Self {
        Self {
            image,
            delay: Delay::from_numer_denom_ms(0, 1),
        }
    }
}

/// Owned in-memory image handle
///
/// Exactly one pipeline stage owns a handle at a time. Filters take it by
/// value and hand back a (possibly new) handle; whatever they do not return
/// is dropped on the spot, so intermediate decodes never accumulate.
#[derive(Debug)]
pub struct DecodedImage {
    layers: Vec<Layer>,
    source_format: Option<ImageFormat>,
    orientation: Option<u32>,
}

impl DecodedImage {
    pub fn still(image: DynamicImage) -> Self {
        Self {
            layers: vec![Layer::still(image)],
            source_format: None,
            orientation: None,
        }
    }

    /// Build a multi-frame handle; fails if `layers` is empty
    pub fn from_layers(layers: Vec<Layer>) -> Result<Self, TransformError> {
        if layers.is_empty() {
            return Err(TransformError::decode_failed("image has no frames"));
        }
        Ok(Self {
            layers,
            source_format: None,
            orientation: None,
        })
    }

    pub fn with_source_format(mut self, format: Option<ImageFormat>) -> Self {
        self.source_format = format;
        self
    }

    pub fn with_orientation(mut self, orientation: Option<u32>) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn source_format(&self) -> Option<ImageFormat> {
        self.source_format
    }

    /// EXIF orientation (1-8) of the source, if it carried one
    pub fn orientation(&self) -> Option<u32> {
        self.orientation
    }

    pub fn primary(&self) -> &DynamicImage {
        &self.layers[0].image
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn is_animated(&self) -> bool {
        self.layers.len() > 1
    }

    pub fn width(&self) -> u32 {
        self.primary().width()
    }

    pub fn height(&self) -> u32 {
        self.primary().height()
    }

    /// Apply `f` to every frame, consuming the handle
    pub fn map_layers<F>(self, mut f: F) -> Result<Self, TransformError>
    where
        F: FnMut(DynamicImage) -> Result<DynamicImage, TransformError>,
    {
        let mut layers = Vec::with_capacity(self.layers.len());
        for layer in self.layers {
            layers.push(Layer {
                image: f(layer.image)?,
                delay: layer.delay,
            });
        }
        Ok(Self {
            layers,
            source_format: self.source_format,
            orientation: self.orientation,
        })
    }
}

/// Encoder settings derived from the merged stack configuration
///
/// Optional knobs stay `None` unless the stack set them explicitly; a codec
/// must not substitute sentinel values for absent settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeOptions {
    pub quality: u8,
    pub jpeg_quality: Option<u8>,
    pub png_compression_level: Option<u8>,
    pub png_compression_filter: Option<u8>,
    /// Only set when the source was a GIF and the stack asked for animation
    pub animated: Option<bool>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            quality: crate::constants::DEFAULT_QUALITY,
            jpeg_quality: None,
            png_compression_level: None,
            png_compression_filter: None,
            animated: None,
        }
    }
}

impl EncodeOptions {
    pub fn is_animated(&self) -> bool {
        self.animated == Some(true)
    }
}

/// Opaque decode/encode capability used by the stack executor
pub trait ImageCodec: Send + Sync {
    /// Decode an artifact into an owned handle
    fn decode(&self, artifact: &ImageArtifact) -> Result<DecodedImage, TransformError>;

    /// Encode a handle into `format`
    fn encode(
        &self,
        image: &DecodedImage,
        format: ImageFormat,
        options: &EncodeOptions,
    ) -> Result<Vec<u8>, TransformError>;
}

/// Codec backed by the `image` crate and `ravif`
#[derive(Debug, Clone)]
pub struct RasterCodec {
    /// AVIF speed preset (1-10, where 1 is slowest/best quality)
    pub avif_speed: u8,
}

impl Default for RasterCodec {
    fn default() -> Self {
        Self { avif_speed: 6 }
    }
}

impl RasterCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_gif(&self, data: &[u8]) -> Result<DecodedImage, TransformError> {
        let decoder = GifDecoder::new(Cursor::new(data))
            .map_err(|e| TransformError::decode_failed(e.to_string()))?;
        let frames = decoder
            .into_frames()
            .collect_frames()
            .map_err(|e| TransformError::decode_failed(e.to_string()))?;
        let layers = frames
            .into_iter()
            .map(|frame| {
                let delay = frame.delay();
                Layer {
                    image: DynamicImage::ImageRgba8(frame.into_buffer()),
                    delay,
                }
            })
            .collect();
        DecodedImage::from_layers(layers)
    }

    fn encode_jpeg(&self, image: &DynamicImage, options: &EncodeOptions) -> Result<Vec<u8>, TransformError> {
        let quality = options.jpeg_quality.unwrap_or(options.quality).clamp(1, 100);
        // JPEG has no alpha channel
        let rgb = image.to_rgb8();
        let mut output = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut output, quality)
            .write_image(rgb.as_raw(), rgb.width(), rgb.height(), image::ColorType::Rgb8)
            .map_err(|e| TransformError::encode_failed("jpeg", e.to_string()))?;
        Ok(output.into_inner())
    }

    fn encode_png(&self, image: &DynamicImage, options: &EncodeOptions) -> Result<Vec<u8>, TransformError> {
        let rgba = image.to_rgba8();
        let mut output = Cursor::new(Vec::new());
        let encoder = match (options.png_compression_level, options.png_compression_filter) {
            (None, None) => PngEncoder::new(&mut output),
            (level, filter) => PngEncoder::new_with_quality(
                &mut output,
                level.map(png_compression).unwrap_or(CompressionType::Default),
                filter.map(png_filter).unwrap_or(FilterType::Adaptive),
            ),
        };
        encoder
            .write_image(rgba.as_raw(), rgba.width(), rgba.height(), image::ColorType::Rgba8)
            .map_err(|e| TransformError::encode_failed("png", e.to_string()))?;
        Ok(output.into_inner())
    }

    fn encode_webp(&self, image: &DecodedImage, options: &EncodeOptions) -> Result<Vec<u8>, TransformError> {
        if options.is_animated() && image.is_animated() {
            return Err(TransformError::encode_failed(
                "webp",
                "animated WebP encoding is not supported",
            ));
        }
        let rgba = image.primary().to_rgba8();
        let mut output = Cursor::new(Vec::new());
        // The image crate only writes lossless WebP
        WebPEncoder::new_lossless(&mut output)
            .write_image(rgba.as_raw(), rgba.width(), rgba.height(), image::ColorType::Rgba8)
            .map_err(|e| TransformError::encode_failed("webp", e.to_string()))?;
        Ok(output.into_inner())
    }

    fn encode_gif(&self, image: &DecodedImage, options: &EncodeOptions) -> Result<Vec<u8>, TransformError> {
        let frames: Vec<Frame> = if options.is_animated() {
            image
                .layers()
                .iter()
                .map(|layer| Frame::from_parts(layer.image.to_rgba8(), 0, 0, layer.delay))
                .collect()
        } else {
            vec![Frame::new(image.primary().to_rgba8())]
        };

        let mut output = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut output);
            if options.is_animated() {
                encoder
                    .set_repeat(Repeat::Infinite)
                    .map_err(|e| TransformError::encode_failed("gif", e.to_string()))?;
            }
            encoder
                .encode_frames(frames)
                .map_err(|e| TransformError::encode_failed("gif", e.to_string()))?;
        }
        Ok(output)
    }

    fn encode_avif(&self, image: &DynamicImage, options: &EncodeOptions) -> Result<Vec<u8>, TransformError> {
        let rgba = image.to_rgba8();
        let (width, height) = (rgba.width() as usize, rgba.height() as usize);
        let pixels: Vec<ravif::RGBA8> = rgba
            .pixels()
            .map(|p| ravif::RGBA8::new(p[0], p[1], p[2], p[3]))
            .collect();
        let encoded = ravif::Encoder::new()
            .with_quality(f32::from(options.quality.clamp(1, 100)))
            .with_speed(self.avif_speed.clamp(1, 10))
            .encode_rgba(imgref::Img::new(pixels.as_slice(), width, height))
            .map_err(|e| TransformError::encode_failed("avif", e.to_string()))?;
        Ok(encoded.avif_file)
    }
}

impl ImageCodec for RasterCodec {
    fn decode(&self, artifact: &ImageArtifact) -> Result<DecodedImage, TransformError> {
        let data = artifact.content();
        let format = artifact.format();

        let decoded = if format == Some(ImageFormat::Gif) {
            self.decode_gif(data)?
        } else {
            let image = ImageReader::new(Cursor::new(data.as_ref()))
                .with_guessed_format()
                .map_err(|e| TransformError::decode_failed(e.to_string()))?
                .decode()
                .map_err(|e| TransformError::decode_failed(e.to_string()))?;
            DecodedImage::still(image)
        };

        let orientation = if format == Some(ImageFormat::Jpeg) {
            read_orientation(data)
        } else {
            None
        };

        Ok(decoded
            .with_source_format(format)
            .with_orientation(orientation))
    }

    fn encode(
        &self,
        image: &DecodedImage,
        format: ImageFormat,
        options: &EncodeOptions,
    ) -> Result<Vec<u8>, TransformError> {
        match format {
            ImageFormat::Jpeg => self.encode_jpeg(image.primary(), options),
            ImageFormat::Png => self.encode_png(image.primary(), options),
            ImageFormat::WebP => self.encode_webp(image, options),
            ImageFormat::Gif => self.encode_gif(image, options),
            ImageFormat::Avif => self.encode_avif(image.primary(), options),
        }
    }
}

/// Read the EXIF orientation tag (1-8) from a JPEG payload
fn read_orientation(data: &[u8]) -> Option<u32> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(data))
        .ok()?;
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?
        .value
        .get_uint(0)
        .filter(|o| (1..=8).contains(o))
}

/// zlib-style level 0-9 onto the encoder's presets
fn png_compression(level: u8) -> CompressionType {
    match level {
        0..=2 => CompressionType::Fast,
        3..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

/// libpng filter numbering (0 none, 1 sub, 2 up, 3 avg, 4 paeth, 5 adaptive)
fn png_filter(filter: u8) -> FilterType {
    match filter {
        0 => FilterType::NoFilter,
        1 => FilterType::Sub,
        2 => FilterType::Up,
        3 => FilterType::Avg,
        4 => FilterType::Paeth,
        _ => FilterType::Adaptive,
    }
}
