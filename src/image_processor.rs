//! # Image Processing Module
//!
//! Questo modulo gestisce la decodifica, la ricodifica e la conversione WebP
//! delle immagini, interamente in memoria.
//!
//! ## Formati Supportati
//!
//! | Formato | Ricodifica | WebP | Libreria |
//! |---------|------------|------|----------|
//! | JPEG    | ✅         | ✅   | image (decode), mozjpeg (encode) |
//! | PNG     | ✅         | ✅   | image, png + color_quant (palette) |
//! | GIF     | ❌         | ✅   | image (decode) |
//!
//! ## Pipeline di Ricodifica
//!
//! L'orientamento EXIF viene applicato in decodifica, prima di ogni
//! trasformazione: dimensioni e pixel sono sempre quelli visualizzati.
//!
//! ### JPEG:
//! 1. Alpha o palette → RGB opaco
//! 2. Downscale Lanczos entro `max_width` x `max_height`
//! 3. Encode progressivo con tabelle di Huffman ottimizzate
//!
//! ### PNG:
//! 1. Downscale Lanczos entro i limiti
//! 2. Con alpha → PNG lossless RGBA
//! 3. RGB o palette → tentativo di palette adattiva a 256 colori, fallback PNG normale
//!
//! ### WebP (copia derivata):
//! - Alpha o palette → RGBA, altrimenti RGB
//! - `method = 6` (massimo sforzo di compressione)
//!
//! ## Esempio
//!
//! ```ignore
//! let processor = ImageProcessor::new(config);
//! let loaded = processor.inspect(&path)?;
//! if let Some(reencoded) = processor.reencode(&loaded)? {
//!     println!("{} -> {} bytes", loaded.asset.size, reencoded.bytes.len());
//! }
//! ```

use crate::config::OptimizationConfig;
use crate::error::OptimizeError;
use crate::resize::fit_within;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Encode strategy, selected once per file from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Other,
}

impl ImageKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase());

        match ext.as_deref() {
            Some("jpg") | Some("jpeg") => Self::Jpeg,
            Some("png") => Self::Png,
            _ => Self::Other,
        }
    }
}

/// Pixel layout of the source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Gray,
    GrayAlpha,
    Rgb,
    Rgba,
    Indexed,
}

impl ColorMode {
    fn from_color_type(color: image::ColorType) -> Self {
        use image::ColorType;
        match color {
            ColorType::L8 | ColorType::L16 => Self::Gray,
            ColorType::La8 | ColorType::La16 => Self::GrayAlpha,
            ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => Self::Rgba,
            _ => Self::Rgb,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(self, Self::GrayAlpha | Self::Rgba)
    }

    /// Alpha channel or indexed palette: derived copies keep transparency
    pub fn has_transparency(self) -> bool {
        self.has_alpha() || self == Self::Indexed
    }
}

/// Metadata of an image file, read fresh from disk
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub path: PathBuf,
    pub size: u64,
    pub width: u32,
    pub height: u32,
    pub color_mode: ColorMode,
    pub format: ImageFormat,
}

/// A decoded, upright image with its metadata
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub asset: ImageAsset,
    pub image: DynamicImage,
}

/// Output of a successful re-encode.
///
/// `image` holds the pixels that were encoded (after resize),
/// so the WebP copy can be derived from what ends up on disk.
#[derive(Debug, Clone)]
pub struct Reencoded {
    pub bytes: Vec<u8>,
    pub image: DynamicImage,
    pub color_mode: ColorMode,
}

/// In-process image optimizer for a single file at a time
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    config: OptimizationConfig,
}

impl ImageProcessor {
    pub fn new(config: OptimizationConfig) -> Self {
        Self { config }
    }

    /// Verify that the compiled-in imaging backend can do everything a run needs.
    pub fn check_dependencies() -> Result<(), OptimizeError> {
        for format in [ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::Gif] {
            if !format.reading_enabled() {
                return Err(OptimizeError::MissingDependency(format!(
                    "{:?} decoder is not available",
                    format
                )));
            }
        }

        if !ImageFormat::Png.writing_enabled() {
            return Err(OptimizeError::MissingDependency("PNG encoder is not available".into()));
        }

        if webp::WebPConfig::new().is_err() {
            return Err(OptimizeError::MissingDependency("libwebp encoder could not be initialized".into()));
        }

        Ok(())
    }

    /// Decode a file and collect its metadata.
    ///
    /// Fails with `UnreadableImage` on corrupt data or unsupported codecs.
    pub fn inspect(&self, path: &Path) -> Result<LoadedImage, OptimizeError> {
        let bytes = std::fs::read(path)?;
        let size = bytes.len() as u64;

        let reader = ImageReader::new(Cursor::new(bytes.as_slice()))
            .with_guessed_format()
            .map_err(|e| OptimizeError::unreadable(path, e))?;
        let format = reader
            .format()
            .ok_or_else(|| OptimizeError::unreadable(path, "unrecognized image format"))?;

        let mut decoder = reader
            .into_decoder()
            .map_err(|e| OptimizeError::unreadable(path, e))?;
        let color_type = decoder.color_type();
        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
        let mut image = DynamicImage::from_decoder(decoder)
            .map_err(|e| OptimizeError::unreadable(path, e))?;
        image.apply_orientation(orientation);

        let color_mode = if Self::is_indexed(format, &bytes) {
            ColorMode::Indexed
        } else {
            ColorMode::from_color_type(color_type)
        };

        debug!(
            "Inspected {}: {}x{} {:?} {:?}, {} bytes",
            path.display(),
            image.width(),
            image.height(),
            color_mode,
            format,
            size
        );

        Ok(LoadedImage {
            asset: ImageAsset {
                path: path.to_path_buf(),
                size,
                width: image.width(),
                height: image.height(),
                color_mode,
                format,
            },
            image,
        })
    }

    /// GIFs are always palette based; PNGs declare it in their header.
    fn is_indexed(format: ImageFormat, bytes: &[u8]) -> bool {
        match format {
            ImageFormat::Gif => true,
            ImageFormat::Png => png::Decoder::new(Cursor::new(bytes))
                .read_info()
                .map(|reader| reader.info().color_type == png::ColorType::Indexed)
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Re-encode in the file's own format.
    ///
    /// Returns `Ok(None)` for formats that are not re-encoded (GIF).
    pub fn reencode(&self, loaded: &LoadedImage) -> Result<Option<Reencoded>, OptimizeError> {
        match ImageKind::from_path(&loaded.asset.path) {
            ImageKind::Jpeg => self.reencode_jpeg(loaded).map(Some),
            ImageKind::Png => self.reencode_png(loaded).map(Some),
            ImageKind::Other => Ok(None),
        }
    }

    fn reencode_jpeg(&self, loaded: &LoadedImage) -> Result<Reencoded, OptimizeError> {
        let mode = loaded.asset.color_mode;
        let image = if mode.has_alpha() || mode == ColorMode::Indexed {
            DynamicImage::ImageRgb8(loaded.image.to_rgb8())
        } else {
            loaded.image.clone()
        };

        let image = fit_within(image, self.config.max_width, self.config.max_height);

        let bytes = Self::encode_jpeg(&image, self.config.jpeg_quality)?;
        let color_mode = if mode == ColorMode::Gray { ColorMode::Gray } else { ColorMode::Rgb };

        Ok(Reencoded { bytes, image, color_mode })
    }

    fn reencode_png(&self, loaded: &LoadedImage) -> Result<Reencoded, OptimizeError> {
        let image = fit_within(
            loaded.image.clone(),
            self.config.max_width,
            self.config.max_height,
        );
        let mode = loaded.asset.color_mode;

        let (bytes, color_mode) = match mode {
            ColorMode::Rgb | ColorMode::Indexed => match Self::encode_indexed_png(&image.to_rgba8()) {
                Ok(bytes) => (bytes, ColorMode::Indexed),
                Err(e) => {
                    debug!(
                        "Palette conversion failed for {}, keeping full color: {}",
                        loaded.asset.path.display(),
                        e
                    );
                    (Self::encode_png(&image)?, mode)
                }
            },
            _ => (Self::encode_png(&image)?, mode),
        };

        Ok(Reencoded { bytes, image, color_mode })
    }

    /// Encode a derived WebP copy at the configured quality, max effort.
    pub fn derive_webp(&self, image: &DynamicImage, color_mode: ColorMode) -> Result<Vec<u8>, OptimizeError> {
        let (width, height) = (image.width(), image.height());
        let keep_alpha = color_mode.has_transparency();

        let pixels = if keep_alpha {
            image.to_rgba8().into_raw()
        } else {
            image.to_rgb8().into_raw()
        };

        let encoder = if keep_alpha {
            webp::Encoder::from_rgba(&pixels, width, height)
        } else {
            webp::Encoder::from_rgb(&pixels, width, height)
        };

        let mut webp_config = webp::WebPConfig::new()
            .map_err(|_| OptimizeError::Encode("failed to initialize WebP config".into()))?;
        webp_config.quality = self.config.webp_quality as f32;
        webp_config.method = 6;

        let memory = encoder
            .encode_advanced(&webp_config)
            .map_err(|e| OptimizeError::Encode(format!("WebP encoding failed: {:?}", e)))?;

        Ok(memory.to_vec())
    }

    /// Progressive JPEG with optimized Huffman tables.
    pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, OptimizeError> {
        let (color_space, pixels) = match image {
            DynamicImage::ImageLuma8(luma) => (mozjpeg::ColorSpace::JCS_GRAYSCALE, luma.as_raw().clone()),
            other => (mozjpeg::ColorSpace::JCS_RGB, other.to_rgb8().into_raw()),
        };
        let (width, height) = (image.width() as usize, image.height() as usize);

        // libjpeg reports fatal errors by unwinding
        let encoded = std::panic::catch_unwind(|| -> std::io::Result<Vec<u8>> {
            let mut comp = mozjpeg::Compress::new(color_space);
            comp.set_size(width, height);
            comp.set_quality(quality as f32);
            comp.set_progressive_mode();
            comp.set_optimize_coding(true);

            let mut comp = comp.start_compress(Vec::new())?;
            comp.write_scanlines(&pixels)?;
            comp.finish()
        })
        .map_err(|_| OptimizeError::Encode("JPEG encoder aborted".into()))?;

        encoded.map_err(|e| OptimizeError::Encode(format!("JPEG encoding failed: {}", e)))
    }

    /// Lossless PNG at maximum compression, keeping the image's channels.
    pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, OptimizeError> {
        let mut buffer = Vec::new();
        let encoder = PngEncoder::new_with_quality(
            &mut buffer,
            CompressionType::Best,
            PngFilterType::Adaptive,
        );
        image.write_with_encoder(encoder)?;
        Ok(buffer)
    }

    /// 8-bit indexed PNG with an adaptive palette of at most 256 colors.
    ///
    /// Images that already use 256 colors or fewer get an exact palette;
    /// anything else is quantized with NeuQuant.
    pub fn encode_indexed_png(rgba: &RgbaImage) -> Result<Vec<u8>, OptimizeError> {
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(OptimizeError::Encode("empty image".into()));
        }

        let (palette, indices) = match Self::exact_palette(rgba) {
            Some(exact) => exact,
            None => Self::quantized_palette(rgba),
        };

        let mut rgb_palette = Vec::with_capacity(palette.len() * 3);
        let mut alpha = Vec::with_capacity(palette.len());
        for color in &palette {
            rgb_palette.extend_from_slice(&color[..3]);
            alpha.push(color[3]);
        }

        let mut buffer = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut buffer, width, height);
            encoder.set_color(png::ColorType::Indexed);
            encoder.set_depth(png::BitDepth::Eight);
            encoder.set_compression(png::Compression::Best);
            encoder.set_palette(rgb_palette);
            if alpha.iter().any(|&a| a < 255) {
                encoder.set_trns(alpha);
            }

            let mut writer = encoder.write_header()?;
            writer.write_image_data(&indices)?;
            writer.finish()?;
        }

        Ok(buffer)
    }

    fn exact_palette(rgba: &RgbaImage) -> Option<(Vec<[u8; 4]>, Vec<u8>)> {
        let mut lookup: HashMap<[u8; 4], u8> = HashMap::new();
        let mut palette = Vec::new();
        let mut indices = Vec::with_capacity(rgba.as_raw().len() / 4);

        for pixel in rgba.pixels() {
            let index = match lookup.get(&pixel.0) {
                Some(&index) => index,
                None => {
                    if palette.len() == 256 {
                        return None;
                    }
                    let index = palette.len() as u8;
                    lookup.insert(pixel.0, index);
                    palette.push(pixel.0);
                    index
                }
            };
            indices.push(index);
        }

        Some((palette, indices))
    }

    fn quantized_palette(rgba: &RgbaImage) -> (Vec<[u8; 4]>, Vec<u8>) {
        let quantizer = color_quant::NeuQuant::new(10, 256, rgba.as_raw());
        let palette = quantizer
            .color_map_rgba()
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect();
        let indices = rgba
            .as_raw()
            .chunks_exact(4)
            .map(|pixel| quantizer.index_of(pixel) as u8)
            .collect();
        (palette, indices)
    }
}
