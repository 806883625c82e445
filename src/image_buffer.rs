use std::borrow::Cow;

use crate::error::{CompareResult, DiffError};
use crate::pixel::Pixel;

/// An immutable, row-major RGBA8 image whose stride equals its width.
///
/// Construction validates that both dimensions are non-zero and that the
/// pixel count equals `width * height`; the buffer is never resized after.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    pixels: Vec<Pixel>,
}

impl ImageBuffer {
    pub fn new(width: u32, height: u32, pixels: Vec<Pixel>) -> CompareResult<Self> {
        let expected = pixel_len(width, height)?;
        if pixels.len() != expected {
            return Err(DiffError::InvalidBuffer(format!(
                "pixel count mismatch: got {}, expected {} for {}x{}",
                pixels.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn from_words(width: u32, height: u32, words: Vec<u32>) -> CompareResult<Self> {
        Self::new(width, height, words.into_iter().map(Pixel::from_word).collect())
    }

    pub fn from_rgba8(width: u32, height: u32, data: &[u8]) -> CompareResult<Self> {
        let expected = pixel_len(width, height)?
            .checked_mul(4)
            .ok_or(DiffError::BufferOverflow)?;
        if data.len() != expected {
            return Err(DiffError::InvalidBuffer(format!(
                "RGBA data length mismatch: got {}, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }

        let mut pixels = try_alloc_pixels(expected / 4)?;
        pixels.extend(
            data.chunks_exact(4)
                .map(|px| Pixel::from_rgba(px[0], px[1], px[2], px[3])),
        );
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// An image with every pixel set to `fill`.
    pub fn filled(width: u32, height: u32, fill: Pixel) -> CompareResult<Self> {
        let len = pixel_len(width, height)?;
        let mut pixels = try_alloc_pixels(len)?;
        pixels.resize(len, fill);
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }

    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    /// The raw packed words, as consumed by the comparison kernels.
    pub fn as_words(&self) -> &[u32] {
        bytemuck::cast_slice(&self.pixels)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Pixel> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    pub fn row(&self, y: u32) -> Option<&[Pixel]> {
        if y >= self.height {
            return None;
        }
        let width = self.width as usize;
        let start = y as usize * width;
        Some(&self.pixels[start..start + width])
    }

    /// The pixels as interleaved `R, G, B, A` bytes. Borrowed on
    /// little-endian targets, where the word layout already matches.
    pub fn as_rgba_bytes(&self) -> Cow<'_, [u8]> {
        if cfg!(target_endian = "little") {
            Cow::Borrowed(bytemuck::cast_slice(&self.pixels))
        } else {
            Cow::Owned(self.pixels.iter().flat_map(|px| px.channels()).collect())
        }
    }

    pub fn into_pixels(self) -> Vec<Pixel> {
        self.pixels
    }

    /// Mutable access is reserved for the comparison engine while it
    /// assembles a freshly allocated overlay.
    pub(crate) fn as_mut_words(&mut self) -> &mut [u32] {
        bytemuck::cast_slice_mut(&mut self.pixels)
    }
}

impl std::fmt::Debug for ImageBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixel_count", &self.pixels.len())
            .finish()
    }
}

pub(crate) fn pixel_len(width: u32, height: u32) -> CompareResult<usize> {
    if width == 0 || height == 0 {
        return Err(DiffError::InvalidBuffer(format!(
            "image dimensions must be > 0, got {width}x{height}"
        )));
    }
    let w = usize::try_from(width).map_err(|_| DiffError::BufferOverflow)?;
    let h = usize::try_from(height).map_err(|_| DiffError::BufferOverflow)?;
    w.checked_mul(h).ok_or(DiffError::BufferOverflow)
}

pub(crate) fn try_alloc_pixels(len: usize) -> CompareResult<Vec<Pixel>> {
    let bytes = len
        .checked_mul(size_of::<Pixel>())
        .ok_or(DiffError::BufferOverflow)?;
    let mut pixels = Vec::new();
    pixels
        .try_reserve_exact(len)
        .map_err(|_| DiffError::AllocationFailure(bytes))?;
    Ok(pixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_dimensions_and_length_mismatch() {
        assert!(matches!(
            ImageBuffer::new(0, 4, Vec::new()),
            Err(DiffError::InvalidBuffer(_))
        ));
        assert!(matches!(
            ImageBuffer::new(2, 2, vec![Pixel::RED; 3]),
            Err(DiffError::InvalidBuffer(_))
        ));
        assert!(matches!(
            ImageBuffer::from_rgba8(2, 1, &[0u8; 7]),
            Err(DiffError::InvalidBuffer(_))
        ));
    }

    #[test]
    fn rgba_bytes_round_trip_through_words() {
        let bytes = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let image = ImageBuffer::from_rgba8(2, 1, &bytes).unwrap();
        assert_eq!(image.pixel(1, 0), Some(Pixel::from_rgba(5, 6, 7, 8)));
        assert_eq!(image.as_words()[0], 0x0403_0201);
        assert_eq!(&*image.as_rgba_bytes(), &bytes);
    }

    #[test]
    fn rows_and_pixels_are_bounds_checked() {
        let image = ImageBuffer::filled(3, 2, Pixel::RED).unwrap();
        assert_eq!(image.row(1).map(<[Pixel]>::len), Some(3));
        assert!(image.row(2).is_none());
        assert!(image.pixel(3, 0).is_none());
        assert_eq!(image.pixel(2, 1), Some(Pixel::RED));
    }
}
