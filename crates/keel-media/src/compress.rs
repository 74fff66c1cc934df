//! Image downscaling and re-encoding.

use crate::error::MediaError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, Frame, GenericImageView, ImageFormat};
use keel_types::{AttachmentPayload, estimate_bytes};
use std::collections::HashSet;

/// The default largest allowed pixel dimension.
pub const DEFAULT_MAX_DIMENSION: u32 = 1024;

/// The default lossy encoding quality.
pub const DEFAULT_QUALITY: f32 = 0.8;

/// JPEG qualities tried, in order, when the first encoding is not smaller.
const FALLBACK_QUALITIES: [f32; 4] = [0.6, 0.4, 0.2, 0.05];

/// Images with at most this many distinct colours are treated as palette images.
const PALETTE_COLORS: usize = 256;

/// Controls for [`compress`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressOptions {
    /// Largest allowed width or height in pixels.
    pub max_dimension: u32,
    /// Lossy encoding factor in `0.0..=1.0`.
    pub quality: f32,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            quality: DEFAULT_QUALITY,
        }
    }
}

impl CompressOptions {
    pub fn validate(&self) -> Result<(), MediaError> {
        if self.max_dimension == 0 {
            return Err(MediaError::InvalidOptions(
                "max_dimension must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.quality) {
            return Err(MediaError::InvalidOptions(format!(
                "quality {} is outside 0..=1",
                self.quality
            )));
        }
        Ok(())
    }
}

/// Output of [`compress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedImage {
    /// Standard base64 encoding of the image.
    pub encoded_image: String,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    /// False when the input was already within bounds and returned as-is.
    pub resized: bool,
}

impl CompressedImage {
    pub fn byte_size(&self) -> u64 {
        estimate_bytes(&self.encoded_image)
    }

    pub fn into_payload(self) -> AttachmentPayload {
        AttachmentPayload::new(self.mime_type, self.encoded_image)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Png,
    Jpeg,
    Gif,
}

impl OutputFormat {
    fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Gif => "image/gif",
        }
    }
}

/// Downscale an image so its largest dimension is at most `max_dimension`.
///
/// Images already within bounds are returned unchanged. Oversized images are
/// resized with their aspect ratio preserved so the largest dimension equals
/// `max_dimension`, and the result is always strictly smaller than the input;
/// when no encoding achieves that, [`MediaError::NotReduced`] is returned.
///
/// Palette images (few colours, opaque or binary alpha) are sampled with
/// nearest-neighbour so no new colours appear, and may be re-encoded as GIF.
pub fn compress(
    encoded_image: &str,
    mime_type: &str,
    options: &CompressOptions,
) -> Result<CompressedImage, MediaError> {
    options.validate()?;

    let format = source_format(mime_type)
        .ok_or_else(|| MediaError::Decode(format!("unsupported image type '{mime_type}'")))?;
    let encoded_image = encoded_image.trim();
    let raw = STANDARD
        .decode(encoded_image)
        .map_err(|e| MediaError::Decode(format!("invalid base64: {e}")))?;
    let image = image::load_from_memory_with_format(&raw, format)
        .map_err(|e| MediaError::Decode(e.to_string()))?;

    let (width, height) = (image.width(), image.height());
    if width.max(height) <= options.max_dimension {
        return Ok(CompressedImage {
            encoded_image: encoded_image.to_string(),
            mime_type: mime_type.to_string(),
            width,
            height,
            resized: false,
        });
    }

    let (target_width, target_height) = fit_within(width, height, options.max_dimension);
    let palette = has_palette(&image);
    let filter = if palette {
        FilterType::Nearest
    } else {
        FilterType::Triangle
    };
    let resized = image.resize_exact(target_width, target_height, filter);
    let (output_format, encoded) =
        match encode_smaller(&resized, format, palette, options.quality, encoded_image) {
            // Report the source dimensions, not the downscaled ones.
            Err(MediaError::NotReduced {
                input_bytes,
                output_bytes,
                ..
            }) => {
                return Err(MediaError::NotReduced {
                    width,
                    height,
                    input_bytes,
                    output_bytes,
                });
            }
            other => other?,
        };

    tracing::debug!(
        "Compressed {}x{} {} to {}x{} {} ({} → {} bytes)",
        width,
        height,
        mime_type,
        target_width,
        target_height,
        output_format.mime_type(),
        raw.len(),
        estimate_bytes(&encoded)
    );

    Ok(CompressedImage {
        encoded_image: encoded,
        mime_type: output_format.mime_type().to_string(),
        width: target_width,
        height: target_height,
        resized: true,
    })
}

/// Run [`compress`] on the blocking pool. Dropping the future discards the result.
pub async fn compress_async(
    encoded_image: String,
    mime_type: String,
    options: CompressOptions,
) -> Result<CompressedImage, MediaError> {
    tokio::task::spawn_blocking(move || compress(&encoded_image, &mime_type, &options))
        .await
        .map_err(|e| MediaError::Task(e.to_string()))?
}

fn source_format(mime_type: &str) -> Option<ImageFormat> {
    let mime_type = mime_type.trim().to_ascii_lowercase();
    match mime_type.as_str() {
        "image/jpg" | "image/pjpeg" => Some(ImageFormat::Jpeg),
        other => ImageFormat::from_mime_type(other),
    }
}

/// Target size with the largest side equal to `max_dimension`, aspect ratio kept.
fn fit_within(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let scale = |side: u32, longest: u32| -> u32 {
        let scaled = (u64::from(side) * u64::from(max_dimension) + u64::from(longest) / 2)
            / u64::from(longest);
        (scaled as u32).clamp(1, max_dimension)
    };
    if width >= height {
        (max_dimension, scale(height, width))
    } else {
        (scale(width, height), max_dimension)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transparency {
    Opaque,
    /// Every pixel is fully opaque or fully transparent.
    Binary,
    Partial,
}

fn transparency(image: &DynamicImage) -> Transparency {
    if !image.color().has_alpha() {
        return Transparency::Opaque;
    }
    let mut seen = Transparency::Opaque;
    for (_, _, pixel) in image.pixels() {
        match pixel[3] {
            255 => {}
            0 => seen = Transparency::Binary,
            _ => return Transparency::Partial,
        }
    }
    seen
}

/// Whether `image` uses at most [`PALETTE_COLORS`] distinct colours.
fn has_palette(image: &DynamicImage) -> bool {
    let mut colors = HashSet::new();
    for (_, _, pixel) in image.pixels() {
        colors.insert(pixel.0);
        if colors.len() > PALETTE_COLORS {
            return false;
        }
    }
    true
}

/// Encodings to try, in order of preference.
fn candidates(
    source: ImageFormat,
    palette: bool,
    transparency: Transparency,
    quality: f32,
) -> Vec<(OutputFormat, f32)> {
    // GIF keeps only binary alpha.
    let gif = palette && transparency != Transparency::Partial;
    let mut candidates = Vec::new();

    if gif && source == ImageFormat::Gif {
        candidates.push((OutputFormat::Gif, quality));
    }
    if source == ImageFormat::Png || palette || transparency != Transparency::Opaque {
        candidates.push((OutputFormat::Png, quality));
    }
    if gif && source != ImageFormat::Gif {
        candidates.push((OutputFormat::Gif, quality));
    }
    if transparency == Transparency::Opaque {
        let lossy_first = candidates.is_empty();
        if lossy_first {
            candidates.push((OutputFormat::Jpeg, quality));
        }
        candidates.extend(
            FALLBACK_QUALITIES
                .iter()
                .filter(|&&q| !lossy_first || q < quality)
                .map(|&q| (OutputFormat::Jpeg, q)),
        );
    }
    candidates
}

/// Encode `image`, returning the first candidate whose base64 form is
/// strictly shorter than `input`.
fn encode_smaller(
    image: &DynamicImage,
    source: ImageFormat,
    palette: bool,
    quality: f32,
    input: &str,
) -> Result<(OutputFormat, String), MediaError> {
    let mut smallest = u64::MAX;
    for (format, quality) in candidates(source, palette, transparency(image), quality) {
        let bytes = match format {
            OutputFormat::Png => encode_png(image)?,
            OutputFormat::Jpeg => encode_jpeg(image, quality)?,
            OutputFormat::Gif => encode_gif(image)?,
        };
        let encoded = STANDARD.encode(&bytes);
        if encoded.len() < input.len() {
            return Ok((format, encoded));
        }
        smallest = smallest.min(bytes.len() as u64);
    }

    Err(MediaError::NotReduced {
        width: image.width(),
        height: image.height(),
        input_bytes: estimate_bytes(input),
        output_bytes: smallest,
    })
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, MediaError> {
    let mut buf = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut buf, CompressionType::Best, PngFilter::Adaptive);
    image
        .write_with_encoder(encoder)
        .map_err(|e| MediaError::Encode(e.to_string()))?;
    Ok(buf)
}

fn encode_gif(image: &DynamicImage) -> Result<Vec<u8>, MediaError> {
    let mut buf = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut buf);
        encoder
            .encode_frame(Frame::new(image.to_rgba8()))
            .map_err(|e| MediaError::Encode(e.to_string()))?;
    }
    Ok(buf)
}

fn encode_jpeg(image: &DynamicImage, quality: f32) -> Result<Vec<u8>, MediaError> {
    let quality = ((quality * 100.0).round() as u8).clamp(1, 100);
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| MediaError::Encode(e.to_string()))?;
    Ok(buf)
}
