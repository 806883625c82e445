//! Decoding and encoding between image files and [`ImageBuffer`].
//!
//! Every source color model (palette, grayscale, 16-bit, ...) is converted to
//! straight-alpha RGBA8 here, so the comparison engine never looks at format
//! metadata.

use std::io::{BufRead, Cursor, Seek};
use std::path::Path;

use anyhow::Context;
use image::{ExtendedColorType, ImageError, ImageFormat, ImageReader, Limits};

use crate::compare::{DiffResult, compare};
use crate::config::CompareConfig;
use crate::error::{CompareResult, DiffError};
use crate::image_buffer::ImageBuffer;

/// Default ceiling on decoder allocations.
pub const DEFAULT_MAX_ALLOC_BYTES: u64 = 512 * 1024 * 1024;

/// Resource limits applied while decoding untrusted input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeLimits {
    pub max_alloc_bytes: u64,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_alloc_bytes: DEFAULT_MAX_ALLOC_BYTES,
            max_width: None,
            max_height: None,
        }
    }
}

impl DecodeLimits {
    fn to_image_limits(self) -> Limits {
        let mut limits = Limits::default();
        limits.max_alloc = Some(self.max_alloc_bytes);
        limits.max_image_width = self.max_width;
        limits.max_image_height = self.max_height;
        limits
    }
}

pub fn decode(path: impl AsRef<Path>) -> CompareResult<ImageBuffer> {
    decode_with_limits(path, DecodeLimits::default())
}

pub fn decode_with_limits(path: impl AsRef<Path>, limits: DecodeLimits) -> CompareResult<ImageBuffer> {
    let path = path.as_ref();
    let source = path.display().to_string();
    log::trace!("decoding {source}");
    let reader = ImageReader::open(path)
        .and_then(ImageReader::with_guessed_format)
        .with_context(|| format!("could not load image {source}"))
        .map_err(DiffError::Decode)?;
    decode_reader(reader, limits, &source)
}

/// Decode an in-memory encoded image; the format is sniffed from its bytes.
pub fn decode_bytes(bytes: &[u8]) -> CompareResult<ImageBuffer> {
    decode_bytes_with_limits(bytes, DecodeLimits::default())
}

pub fn decode_bytes_with_limits(bytes: &[u8], limits: DecodeLimits) -> CompareResult<ImageBuffer> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("could not sniff in-memory image")
        .map_err(DiffError::Decode)?;
    decode_reader(reader, limits, "<memory>")
}

fn decode_reader<R: BufRead + Seek>(
    mut reader: ImageReader<R>,
    limits: DecodeLimits,
    source: &str,
) -> CompareResult<ImageBuffer> {
    let Some(format) = reader.format() else {
        return Err(DiffError::UnsupportedFormat(format!(
            "{source}: unrecognized image format"
        )));
    };
    reader.limits(limits.to_image_limits());

    let decoded = reader
        .decode()
        .map_err(|err| image_error(err, source, Some(limits.max_alloc_bytes), DiffError::Decode))?;
    let rgba = decoded.into_rgba8();
    let (width, height) = rgba.dimensions();
    log::debug!("decoded {source} as {format:?} {width}x{height}");
    ImageBuffer::from_rgba8(width, height, rgba.as_raw())
}

/// Write `image` to `path`. The format follows the file extension; JPEG
/// output drops the alpha channel.
pub fn encode(path: impl AsRef<Path>, image: &ImageBuffer) -> CompareResult<()> {
    let path = path.as_ref();
    let target = path.display().to_string();
    let format = ImageFormat::from_path(path).map_err(|_| {
        DiffError::UnsupportedFormat(format!("cannot infer an output format from {target}"))
    })?;

    let (width, height) = image.dimensions();
    let rgba = image.as_rgba_bytes();
    let result = match format {
        ImageFormat::Jpeg => {
            let rgb: Vec<u8> = rgba
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect();
            image::save_buffer_with_format(
                path,
                &rgb,
                width,
                height,
                ExtendedColorType::Rgb8,
                format,
            )
        }
        _ => image::save_buffer_with_format(
            path,
            &rgba,
            width,
            height,
            ExtendedColorType::Rgba8,
            format,
        ),
    };
    result.map_err(|err| image_error(err, &target, None, DiffError::Encode))?;
    log::debug!("wrote {width}x{height} {format:?} to {target}");
    Ok(())
}

/// Decode both files, compare them, and write the overlay to `overlay_path`
/// when the images differ. Passing an overlay path turns overlay emission on.
pub fn compare_files(
    base: impl AsRef<Path>,
    candidate: impl AsRef<Path>,
    overlay_path: Option<&Path>,
    config: &CompareConfig,
) -> CompareResult<DiffResult> {
    let base = decode(base)?;
    let candidate = decode(candidate)?;

    let result = if overlay_path.is_some() && !config.emit_overlay {
        let config = config.clone().with_overlay(config.overlay_style);
        compare(&base, &candidate, &config)?
    } else {
        compare(&base, &candidate, config)?
    };

    if let Some(path) = overlay_path
        && let Some(overlay) = result.overlay.as_ref()
        && !result.is_match()
    {
        encode(path, overlay)?;
    }
    Ok(result)
}

/// Map an `image` failure onto [`DiffError`]. `alloc_cap` is the decoder
/// allocation ceiling; without one, limit errors are ordinary codec errors.
fn image_error(
    err: ImageError,
    source: &str,
    alloc_cap: Option<u64>,
    wrap: fn(anyhow::Error) -> DiffError,
) -> DiffError {
    match (err, alloc_cap) {
        (ImageError::Unsupported(inner), _) => {
            DiffError::UnsupportedFormat(format!("{source}: {inner}"))
        }
        (ImageError::Limits(inner), Some(cap)) => {
            log::warn!("{source}: decoder limit hit: {inner}");
            DiffError::AllocationFailure(usize::try_from(cap).unwrap_or(usize::MAX))
        }
        (other, _) => wrap(anyhow::Error::new(other).context(source.to_owned())),
    }
}
