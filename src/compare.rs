use rayon::prelude::*;

use crate::config::{CompareConfig, IgnoreRegion, OverlayStyle};
use crate::error::{CompareResult, DiffError};
use crate::image_buffer::{ImageBuffer, try_alloc_pixels};
use crate::kernel::{self, KernelBackend, ScanParams};
use crate::pixel::Pixel;

/// Outcome of one comparison.
#[derive(Clone, Debug, PartialEq)]
pub struct DiffResult {
    pub differing_pixels: u64,
    pub total_pixels: u64,
    /// Present only when the config asked for an overlay.
    pub overlay: Option<ImageBuffer>,
    /// Ascending, distinct rows containing at least one differing pixel.
    /// Present only when the config asked for diff lines.
    pub diff_lines: Option<Vec<u32>>,
    /// Kernel family that classified the pixels.
    pub backend: KernelBackend,
}

impl DiffResult {
    pub fn is_match(&self) -> bool {
        self.differing_pixels == 0
    }

    /// Share of differing pixels over the whole image, in percent.
    pub fn diff_percentage(&self) -> f64 {
        if self.total_pixels == 0 {
            return 0.0;
        }
        self.differing_pixels as f64 * 100.0 / self.total_pixels as f64
    }
}

/// Compare `candidate` against `base` pixel by pixel.
///
/// Both images must have identical dimensions; there is no resampling. The
/// result is identical whichever backend or band layout ends up running.
pub fn compare(
    base: &ImageBuffer,
    candidate: &ImageBuffer,
    config: &CompareConfig,
) -> CompareResult<DiffResult> {
    config.validate()?;
    if base.dimensions() != candidate.dimensions() {
        return Err(DiffError::DimensionMismatch {
            base: base.dimensions(),
            candidate: candidate.dimensions(),
        });
    }

    let (width, height) = base.dimensions();
    let backend = kernel::resolve_backend(config.backend);
    let mut overlay = if config.emit_overlay {
        Some(overlay_background(base, config.overlay_style)?)
    } else {
        None
    };

    let ctx = BandContext {
        base: base.as_words(),
        candidate: candidate.as_words(),
        width: width as usize,
        backend,
        params: ScanParams::from_config(config),
        ignore: IgnoreMask::new(width, &config.ignore_regions),
        capture_lines: config.capture_diff_lines,
    };
    let plan = kernel::plan_bands(width as usize, height as usize, config.parallel);

    let bands = if plan.band_count <= 1 {
        vec![ctx.scan_band(
            0,
            height as usize,
            overlay.as_mut().map(ImageBuffer::as_mut_words),
        )]
    } else {
        let band_rows = plan.band_rows;
        let band_pixels = band_rows * ctx.width;
        let ctx = &ctx;
        kernel::with_scan_pool(|| match overlay.as_mut() {
            Some(image) => image
                .as_mut_words()
                .par_chunks_mut(band_pixels)
                .enumerate()
                .map(|(band, words)| {
                    ctx.scan_band(band * band_rows, words.len() / ctx.width, Some(words))
                })
                .collect::<Vec<_>>(),
            None => (0..plan.band_count)
                .into_par_iter()
                .map(|band| {
                    let first_row = band * band_rows;
                    let rows = band_rows.min(height as usize - first_row);
                    ctx.scan_band(first_row, rows, None)
                })
                .collect::<Vec<_>>(),
        })
    };

    let mut differing_pixels = 0u64;
    let mut diff_lines = config.capture_diff_lines.then(Vec::new);
    for band in bands {
        differing_pixels += band.differing;
        if let Some(lines) = diff_lines.as_mut() {
            lines.extend(band.lines);
        }
    }

    log::debug!(
        "compared {width}x{height} on {backend} in {} band(s): {differing_pixels} differing",
        plan.band_count
    );

    Ok(DiffResult {
        differing_pixels,
        total_pixels: u64::from(width) * u64::from(height),
        overlay,
        diff_lines,
        backend,
    })
}

fn overlay_background(base: &ImageBuffer, style: OverlayStyle) -> CompareResult<ImageBuffer> {
    let mut pixels = try_alloc_pixels(base.pixel_count())?;
    match style {
        OverlayStyle::Base => pixels.extend_from_slice(base.pixels()),
        OverlayStyle::Mask => pixels.resize(base.pixel_count(), Pixel::TRANSPARENT),
        OverlayStyle::Shaded(factor) => pixels.extend(
            base.pixels()
                .iter()
                .map(|&pixel| shade_toward_white(pixel, factor)),
        ),
    }
    ImageBuffer::new(base.width(), base.height(), pixels)
}

fn shade_toward_white(pixel: Pixel, factor: f32) -> Pixel {
    let lift = |channel: u8| {
        let channel = f32::from(channel);
        (channel + (255.0 - channel) * factor).round().clamp(0.0, 255.0) as u8
    };
    Pixel::from_rgba(lift(pixel.r()), lift(pixel.g()), lift(pixel.b()), pixel.a())
}

#[derive(Default)]
struct BandScan {
    differing: u64,
    lines: Vec<u32>,
}

struct BandContext<'a> {
    base: &'a [u32],
    candidate: &'a [u32],
    width: usize,
    backend: KernelBackend,
    params: ScanParams,
    ignore: IgnoreMask,
    capture_lines: bool,
}

impl BandContext<'_> {
    /// Scan rows `first_row..first_row + rows`. `overlay`, when present,
    /// covers exactly those rows.
    fn scan_band(&self, first_row: usize, rows: usize, mut overlay: Option<&mut [u32]>) -> BandScan {
        let start = first_row * self.width;
        let end = start + rows * self.width;
        let base = &self.base[start..end];
        let candidate = &self.candidate[start..end];
        let mut band = BandScan::default();

        if self.ignore.is_empty() && !self.capture_lines {
            let scan = kernel::scan_and_classify(
                self.backend,
                base,
                candidate,
                0..base.len(),
                self.params,
                overlay,
            );
            band.differing = scan.differing;
            return band;
        }

        let mut spans = Vec::new();
        let mut row = 0usize;
        while row < rows {
            let row_start = row * self.width;

            // Rows without any raw difference need no span bookkeeping.
            let Some(divergence) =
                kernel::find_first_difference_with(self.backend, base, candidate, row_start)
            else {
                break;
            };
            row = divergence / self.width;
            let row_start = row * self.width;

            let y = (first_row + row) as u32;
            self.ignore.compared_spans(y, self.width, &mut spans);
            let mut row_differing = 0u64;
            for &(from, to) in &spans {
                let scan = kernel::scan_and_classify(
                    self.backend,
                    base,
                    candidate,
                    row_start + from..row_start + to,
                    self.params,
                    overlay.as_deref_mut(),
                );
                row_differing += scan.differing;
            }

            band.differing += row_differing;
            if self.capture_lines && row_differing > 0 {
                band.lines.push(y);
            }
            row += 1;
        }
        band
    }
}

/// Ignore regions reduced to the column spans they cover per row.
struct IgnoreMask {
    regions: Vec<(IgnoreRegion, (usize, usize))>,
}

impl IgnoreMask {
    fn new(width: u32, regions: &[IgnoreRegion]) -> Self {
        Self {
            regions: regions
                .iter()
                .filter_map(|region| {
                    region
                        .clipped_columns(width)
                        .map(|columns| (*region, columns))
                })
                .collect(),
        }
    }

    fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Half-open column spans of row `y` that are not ignored.
    fn compared_spans(&self, y: u32, width: usize, spans: &mut Vec<(usize, usize)>) {
        spans.clear();
        let mut excluded: Vec<(usize, usize)> = self
            .regions
            .iter()
            .filter(|(region, _)| region.contains_row(y))
            .map(|&(_, columns)| columns)
            .collect();
        if excluded.is_empty() {
            spans.push((0, width));
            return;
        }
        excluded.sort_unstable();

        let mut cursor = 0usize;
        for (from, to) in excluded {
            if from > cursor {
                spans.push((cursor, from));
            }
            cursor = cursor.max(to);
        }
        if cursor < width {
            spans.push((cursor, width));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, pixel: Pixel) -> ImageBuffer {
        ImageBuffer::filled(width, height, pixel).unwrap()
    }

    fn with_pixels(mut image: ImageBuffer, changes: &[(u32, u32, Pixel)]) -> ImageBuffer {
        let width = image.width();
        let words = image.as_mut_words();
        for &(x, y, pixel) in changes {
            words[(y * width + x) as usize] = pixel.word();
        }
        image
    }

    const WHITE: Pixel = Pixel::from_rgba(255, 255, 255, 255);
    const BLACK: Pixel = Pixel::from_rgba(0, 0, 0, 255);

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let err = compare(
            &solid(10, 10, WHITE),
            &solid(10, 11, WHITE),
            &CompareConfig::default(),
        )
        .unwrap_err();
        assert!(err.is_layout_mismatch());
    }

    #[test]
    fn overlay_paints_only_differing_pixels() {
        let base = solid(5, 3, WHITE);
        let candidate = with_pixels(base.clone(), &[(1, 0, BLACK), (4, 2, BLACK)]);
        let config = CompareConfig::default().with_overlay(OverlayStyle::Base);
        let result = compare(&base, &candidate, &config).unwrap();

        assert_eq!(result.differing_pixels, 2);
        let overlay = result.overlay.unwrap();
        assert_eq!(overlay.pixel(1, 0), Some(Pixel::RED));
        assert_eq!(overlay.pixel(4, 2), Some(Pixel::RED));
        assert_eq!(overlay.pixel(0, 0), Some(WHITE));
        assert_eq!(
            overlay.pixels().iter().filter(|&&px| px == Pixel::RED).count(),
            2
        );
    }

    #[test]
    fn mask_and_shaded_backgrounds() {
        let base = solid(2, 1, Pixel::from_rgba(100, 0, 200, 255));
        let candidate = with_pixels(base.clone(), &[(0, 0, BLACK)]);

        let mask = compare(
            &base,
            &candidate,
            &CompareConfig::default().with_overlay(OverlayStyle::Mask),
        )
        .unwrap()
        .overlay
        .unwrap();
        assert_eq!(mask.pixels(), &[Pixel::RED, Pixel::TRANSPARENT]);

        let shaded = compare(
            &base,
            &candidate,
            &CompareConfig::default().with_overlay(OverlayStyle::Shaded(0.5)),
        )
        .unwrap()
        .overlay
        .unwrap();
        assert_eq!(shaded.pixel(1, 0), Some(Pixel::from_rgba(178, 128, 228, 255)));
    }

    #[test]
    fn ignored_regions_are_neither_counted_nor_painted() {
        let base = solid(10, 4, WHITE);
        let candidate = with_pixels(
            base.clone(),
            &[(2, 1, BLACK), (3, 1, BLACK), (8, 1, BLACK), (2, 3, BLACK)],
        );
        let config = CompareConfig::default()
            .with_overlay(OverlayStyle::Mask)
            .with_ignore_regions([IgnoreRegion::new(1, 0, 4, 2).unwrap()]);
        let result = compare(&base, &candidate, &config).unwrap();

        assert_eq!(result.differing_pixels, 2);
        let overlay = result.overlay.unwrap();
        assert_eq!(overlay.pixel(2, 1), Some(Pixel::TRANSPARENT));
        assert_eq!(overlay.pixel(8, 1), Some(Pixel::RED));
        assert_eq!(overlay.pixel(2, 3), Some(Pixel::RED));
    }

    #[test]
    fn regions_outside_the_image_are_clipped() {
        let base = solid(4, 4, WHITE);
        let candidate = with_pixels(base.clone(), &[(3, 3, BLACK)]);
        let config = CompareConfig::default()
            .with_ignore_regions([IgnoreRegion::new(2, 2, 400, 400).unwrap()]);
        assert_eq!(compare(&base, &candidate, &config).unwrap().differing_pixels, 0);

        let config = CompareConfig::default()
            .with_ignore_regions([IgnoreRegion::new(50, 0, 60, 10).unwrap()]);
        assert_eq!(compare(&base, &candidate, &config).unwrap().differing_pixels, 1);
    }

    #[test]
    fn diff_lines_are_sorted_and_distinct() {
        let base = solid(6, 6, WHITE);
        let candidate = with_pixels(
            base.clone(),
            &[(0, 4, BLACK), (5, 4, BLACK), (3, 1, BLACK)],
        );
        let result = compare(
            &base,
            &candidate,
            &CompareConfig::default().with_diff_lines(true),
        )
        .unwrap();
        assert_eq!(result.diff_lines, Some(vec![1, 4]));
        assert_eq!(result.differing_pixels, 3);

        let without = compare(&base, &candidate, &CompareConfig::default()).unwrap();
        assert_eq!(without.diff_lines, None);
    }

    #[test]
    fn rows_with_only_sub_threshold_noise_are_not_lines() {
        let base = solid(4, 3, WHITE);
        let candidate = with_pixels(base.clone(), &[(1, 0, Pixel::from_rgba(254, 255, 255, 255))]);
        let result = compare(
            &base,
            &candidate,
            &CompareConfig::default().with_diff_lines(true),
        )
        .unwrap();
        assert_eq!(result.differing_pixels, 0);
        assert_eq!(result.diff_lines, Some(Vec::new()));
    }

    #[test]
    fn banded_and_single_band_results_agree() {
        let (width, height) = (1_024u32, 1_024u32);
        let base = solid(width, height, WHITE);
        let changes: Vec<_> = (0..height)
            .step_by(37)
            .map(|y| ((y * 13) % width, y, BLACK))
            .collect();
        let candidate = with_pixels(base.clone(), &changes);

        let config = CompareConfig::default()
            .with_overlay(OverlayStyle::Mask)
            .with_diff_lines(true);
        let banded = compare(&base, &candidate, &config).unwrap();
        let single = compare(&base, &candidate, &config.clone().with_parallel(false)).unwrap();

        assert_eq!(banded.differing_pixels, changes.len() as u64);
        assert_eq!(banded, single);
    }

    #[test]
    fn percentage_uses_the_whole_image() {
        let base = solid(10, 10, WHITE);
        let candidate = with_pixels(base.clone(), &[(0, 0, BLACK)]);
        let result = compare(&base, &candidate, &CompareConfig::default()).unwrap();
        assert!(!result.is_match());
        assert!((result.diff_percentage() - 1.0).abs() < 1e-12);
    }
}
