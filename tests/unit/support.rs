// Shared fixtures for the tests in tests/unit/

use async_trait::async_trait;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, Frame, Rgba, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use imagestack::filter::builtin_filters;
use imagestack::loader::{ChainLoader, LoadError, Loader};
use imagestack::postprocessor::{builtin_post_processors, PostProcessorsConfig};
use imagestack::stack::{StackConfigResolver, StackExecutor, StackSettings};
use imagestack::ImageArtifact;

pub fn gradient(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128, 255])
    })
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(gradient(width, height))
        .write_to(&mut buffer, image::ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}

pub fn animated_gif_bytes(width: u32, height: u32, frames: u32) -> Vec<u8> {
    let mut buffer = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut buffer);
        encoder.set_repeat(Repeat::Infinite).unwrap();
        for i in 0..frames {
            let frame = RgbaImage::from_pixel(width, height, Rgba([(i * 60) as u8, 0, 200, 255]));
            encoder
                .encode_frame(Frame::from_parts(
                    frame,
                    0,
                    0,
                    Delay::from_numer_denom_ms(100, 1),
                ))
                .unwrap();
        }
    }
    buffer
}

/// Loader serving fixed bytes for any id except "missing", counting calls
pub struct CountingLoader {
    bytes: Vec<u8>,
    pub calls: AtomicUsize,
}

impl CountingLoader {
    pub fn new(bytes: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            bytes,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Loader for CountingLoader {
    async fn find(&self, source_id: &str) -> Result<ImageArtifact, LoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if source_id == "missing" {
            return Err(LoadError::NotFound(source_id.to_string()));
        }
        Ok(ImageArtifact::from_bytes(self.bytes.clone()))
    }
}

/// Loader that always fails with the given message
pub struct FailingLoader(pub &'static str);

#[async_trait]
impl Loader for FailingLoader {
    async fn find(&self, _source_id: &str) -> Result<ImageArtifact, LoadError> {
        Err(LoadError::Http(self.0.to_string()))
    }
}

/// Executor over the built-in filters and post-processors
pub fn executor(defaults: &str, stacks: &str) -> StackExecutor {
    let defaults: StackSettings = serde_yaml::from_str(defaults).unwrap();
    let stacks: HashMap<String, StackSettings> = serde_yaml::from_str(stacks).unwrap();
    StackExecutor::new(
        Arc::new(StackConfigResolver::new(&defaults, &stacks)),
        Arc::new(builtin_filters().unwrap().build()),
        Arc::new(
            builtin_post_processors(&PostProcessorsConfig::default())
                .unwrap()
                .build(),
        ),
    )
}

pub fn chain(loader: Arc<dyn Loader>) -> ChainLoader {
    ChainLoader::new().with_loader("fixture", loader)
}
