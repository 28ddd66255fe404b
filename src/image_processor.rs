//! # Image Processing Module
//!
//! Codec adapter: decode, resize ed encode WebP di una singola immagine.
//!
//! ## Architettura
//!
//! Il motore di conversione dipende solo dal trait `ImageCodec`; l'implementazione
//! di default `ImageProcessor` lavora interamente in memoria:
//!
//! | Fase    | Implementazione                                    |
//! |---------|----------------------------------------------------|
//! | Decode  | crate `image`, formato rilevato dal contenuto      |
//! | Resize  | crate `image`, filtro Lanczos3                     |
//! | Encode  | crate `webp` (libwebp), lossy alla qualità data    |
//!
//! ## Formati supportati
//!
//! Insieme chiuso: PNG, JPEG, TIFF. Qualsiasi altro formato rilevato dal contenuto
//! (anche con estensione corretta) produce un `DecodeError`.
//!
//! ## Memoria
//!
//! Ogni decode è limitato da `image::io::Limits::max_alloc`, così che molti decode
//! paralleli di immagini enormi non esauriscano la memoria.

use crate::error::OptimizeError;
use crate::resize::RESIZE_FILTER;
use image::io::{Limits, Reader as ImageReader};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

/// Formati sorgente accettati dal decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Png,
    Jpeg,
    Tiff,
}

impl SourceFormat {
    /// Riconosce il formato da un'estensione (case-insensitive)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(SourceFormat::Png),
            "jpg" | "jpeg" => Some(SourceFormat::Jpeg),
            "tif" | "tiff" => Some(SourceFormat::Tiff),
            _ => None,
        }
    }

    fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(SourceFormat::Png),
            ImageFormat::Jpeg => Some(SourceFormat::Jpeg),
            ImageFormat::Tiff => Some(SourceFormat::Tiff),
            _ => None,
        }
    }
}

/// Boundary over the decode/resize/encode primitives used by the engine
pub trait ImageCodec: Send + Sync {
    /// Decode raw file bytes into an image
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, OptimizeError>;

    /// Resize to exactly `width`x`height`
    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage;

    /// Encode to lossy WebP at `quality` (0-100)
    fn encode(&self, image: &DynamicImage, quality: u8) -> Result<Vec<u8>, OptimizeError>;
}

/// Default in-memory codec backed by `image` and `webp`
#[derive(Debug, Clone, Default)]
pub struct ImageProcessor {
    /// Allocation ceiling for a single decode
    max_alloc: Option<u64>,
}

impl ImageProcessor {
    pub fn new(max_alloc: Option<u64>) -> Self {
        Self { max_alloc }
    }

    fn limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_alloc = self.max_alloc;
        limits
    }
}

impl ImageCodec for ImageProcessor {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, OptimizeError> {
        let mut reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| OptimizeError::Decode(format!("cannot read image header: {}", e)))?;

        let format = reader
            .format()
            .ok_or_else(|| OptimizeError::Decode("unrecognized image data".to_string()))?;

        if SourceFormat::from_image_format(format).is_none() {
            return Err(OptimizeError::Decode(format!(
                "unsupported image format: {:?}",
                format
            )));
        }

        reader.limits(self.limits());
        let image = reader
            .decode()
            .map_err(|e| OptimizeError::Decode(e.to_string()))?;

        debug!(
            "Decoded {:?} image {}x{}",
            format,
            image.width(),
            image.height()
        );
        Ok(image)
    }

    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        image.resize_exact(width, height, RESIZE_FILTER)
    }

    fn encode(&self, image: &DynamicImage, quality: u8) -> Result<Vec<u8>, OptimizeError> {
        let (width, height) = (image.width(), image.height());
        let quality = quality.min(100) as f32;

        // libwebp accetta solo buffer RGB8/RGBA8
        let encoded = if image.color().has_alpha() {
            let rgba = image.to_rgba8();
            let encoder = webp::Encoder::from_rgba(rgba.as_raw(), width, height);
            encoder.encode_simple(false, quality).map(|memory| memory.to_vec())
        } else {
            let rgb = image.to_rgb8();
            let encoder = webp::Encoder::from_rgb(rgb.as_raw(), width, height);
            encoder.encode_simple(false, quality).map(|memory| memory.to_vec())
        };

        encoded.map_err(|e| OptimizeError::Encode(format!("libwebp failed: {:?}", e)))
    }
}
