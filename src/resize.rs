//! # Image Resize Module
//!
//! Ridimensionamento delle immagini in memoria con il crate `image`.
//!
//! ## Caratteristiche
//! - **Fit**: riduce le immagini che superano i limiti mantenendo l'aspect ratio
//! - **Lanczos3**: filtro di alta qualità per il downscale
//! - **Mai ingrandire**: immagini già entro i limiti restano invariate
//! - **Varianti responsive**: copie `{stem}-{width}w.{ext}` a larghezze fisse
//!
//! ## Struttura Output Varianti
//! ```text
//! assets/img_responsive/
//! ├── hero-400w.jpg
//! ├── hero-800w.jpg
//! └── projects/
//!     └── logo-400w.png
//! ```

use crate::image_processor::{ColorMode, ImageProcessor};
use crate::optimizer::path_resolver::PathResolver;
use anyhow::Result;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::path::{Path, PathBuf};
use tracing::debug;

/// JPEG quality used for responsive variants
pub const VARIANT_JPEG_QUALITY: u8 = 85;

/// Downscale `img` so both dimensions fit within `max_width` x `max_height`.
/// Aspect ratio is preserved; images already within bounds are returned as-is.
pub fn fit_within(img: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width <= max_width && height <= max_height {
        return img;
    }

    debug!(
        "Downscaling {}x{} to fit within {}x{}",
        width, height, max_width, max_height
    );
    img.resize(max_width, max_height, FilterType::Lanczos3)
}

/// Dimensions `fit_within` would produce, without touching pixels
pub fn fitted_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }

    let ratio = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    let new_width = ((width as f64 * ratio).round() as u32).max(1);
    let new_height = ((height as f64 * ratio).round() as u32).max(1);
    (new_width, new_height)
}

/// Creates fixed-width responsive copies of an image
#[derive(Debug, Clone)]
pub struct ResponsiveVariants {
    widths: Vec<u32>,
}

impl ResponsiveVariants {
    pub fn new(widths: Vec<u32>) -> Self {
        Self { widths }
    }

    /// Widths strictly smaller than the image width; larger variants would upscale
    pub fn applicable_widths(&self, image_width: u32) -> Vec<u32> {
        self.widths
            .iter()
            .copied()
            .filter(|&w| w < image_width)
            .collect()
    }

    /// Encode every applicable variant.
    ///
    /// Returns `(output_path, bytes)` pairs; writing them is left to the
    /// caller. Alpha or palette images become PNG, everything else JPEG.
    pub fn render(
        &self,
        image: &DynamicImage,
        color_mode: ColorMode,
        source: &Path,
        resolver: &PathResolver,
    ) -> Result<Vec<(PathBuf, Vec<u8>)>> {
        let (width, height) = image.dimensions();
        let mut rendered = Vec::new();

        for target_width in self.applicable_widths(width) {
            let ratio = target_width as f64 / width as f64;
            let target_height = ((height as f64 * ratio) as u32).max(1);
            let resized = image.resize_exact(target_width, target_height, FilterType::Lanczos3);

            let (extension, bytes) = if color_mode.has_transparency() {
                ("png", ImageProcessor::encode_png(&resized)?)
            } else {
                ("jpg", ImageProcessor::encode_jpeg(&resized, VARIANT_JPEG_QUALITY)?)
            };

            let output = resolver.variant_path(source, target_width, extension)?;
            debug!("Rendered variant {} ({}x{})", output.display(), target_width, target_height);
            rendered.push((output, bytes));
        }

        Ok(rendered)
    }
}
