use std::str::FromStr;

use crate::error::{CompareResult, DiffError};
use crate::kernel::yiq;
use crate::pixel::Pixel;

pub const DEFAULT_THRESHOLD: f64 = 0.1;
pub const DEFAULT_SHADE_FACTOR: f32 = 0.5;

/// Which kernel family a comparison may use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendPreference {
    /// Widest vector backend the CPU supports.
    #[default]
    Auto,
    /// Always use the scalar reference kernel.
    Scalar,
}

/// Background of the overlay image for pixels that are not painted with the
/// diff color.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum OverlayStyle {
    /// A copy of the base image.
    #[default]
    Base,
    /// Fully transparent; only differing pixels are visible.
    Mask,
    /// The base image blended toward white by the given factor in `0..=1`,
    /// which keeps the context readable while making the diff color stand out.
    Shaded(f32),
}

/// An inclusive pixel rectangle excluded from comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IgnoreRegion {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl IgnoreRegion {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> CompareResult<Self> {
        if x1 > x2 || y1 > y2 {
            return Err(DiffError::InvalidConfig(format!(
                "ignore region {x1}:{y1}-{x2}:{y2} has its corners swapped"
            )));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    #[inline]
    pub fn contains_row(&self, y: u32) -> bool {
        (self.y1..=self.y2).contains(&y)
    }

    /// Half-open column range covered on any row, clipped to `width`.
    /// `None` when the region lies entirely to the right of the image.
    #[inline]
    pub(crate) fn clipped_columns(&self, width: u32) -> Option<(usize, usize)> {
        if self.x1 >= width {
            return None;
        }
        let end = self.x2.min(width - 1) as usize + 1;
        Some((self.x1 as usize, end))
    }
}

impl FromStr for IgnoreRegion {
    type Err = DiffError;

    /// Parses `x1:y1-x2:y2`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            DiffError::InvalidConfig(format!(
                "ignore region `{raw}` must look like x1:y1-x2:y2"
            ))
        };
        let point = |text: &str| -> CompareResult<(u32, u32)> {
            let (x, y) = text.split_once(':').ok_or_else(invalid)?;
            let x = x.trim().parse::<u32>().map_err(|_| invalid())?;
            let y = y.trim().parse::<u32>().map_err(|_| invalid())?;
            Ok((x, y))
        };

        let (start, end) = raw.trim().split_once('-').ok_or_else(invalid)?;
        let (x1, y1) = point(start)?;
        let (x2, y2) = point(end)?;
        Self::new(x1, y1, x2, y2)
    }
}

/// Parse a comma-separated list of `x1:y1-x2:y2` regions. Empty entries are
/// skipped.
pub fn parse_ignore_regions(csv: &str) -> CompareResult<Vec<IgnoreRegion>> {
    csv.split(',')
        .filter(|token| !token.trim().is_empty())
        .map(|token| token.parse::<IgnoreRegion>())
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompareConfig {
    /// Color difference threshold in `0..=1` (values above 1 tolerate
    /// everything). Squared and scaled to the YIQ delta range internally.
    pub threshold: f64,
    /// Color written into the overlay for every differing pixel.
    pub diff_color: Pixel,
    /// Whether to materialize an overlay image.
    pub emit_overlay: bool,
    pub overlay_style: OverlayStyle,
    pub ignore_regions: Vec<IgnoreRegion>,
    /// Collect the ordered, distinct row indices containing differences.
    pub capture_diff_lines: bool,
    pub backend: BackendPreference,
    /// Allow splitting large images into row bands processed in parallel.
    pub parallel: bool,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            diff_color: Pixel::RED,
            emit_overlay: false,
            overlay_style: OverlayStyle::default(),
            ignore_regions: Vec::new(),
            capture_diff_lines: false,
            backend: BackendPreference::default(),
            parallel: true,
        }
    }
}

impl CompareConfig {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_diff_color(mut self, color: Pixel) -> Self {
        self.diff_color = color;
        self
    }

    /// Request an overlay with the given background style.
    pub fn with_overlay(mut self, style: OverlayStyle) -> Self {
        self.emit_overlay = true;
        self.overlay_style = style;
        self
    }

    pub fn with_ignore_regions(mut self, regions: impl IntoIterator<Item = IgnoreRegion>) -> Self {
        self.ignore_regions.extend(regions);
        self
    }

    pub fn with_diff_lines(mut self, capture: bool) -> Self {
        self.capture_diff_lines = capture;
        self
    }

    pub fn with_backend(mut self, backend: BackendPreference) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn validate(&self) -> CompareResult<()> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(DiffError::InvalidConfig(format!(
                "threshold must be a finite value >= 0, got {}",
                self.threshold
            )));
        }
        if let OverlayStyle::Shaded(factor) = self.overlay_style
            && !(0.0..=1.0).contains(&factor)
        {
            return Err(DiffError::InvalidConfig(format!(
                "overlay shade factor must be within 0..=1, got {factor}"
            )));
        }
        for region in &self.ignore_regions {
            if region.x1 > region.x2 || region.y1 > region.y2 {
                return Err(DiffError::InvalidConfig(format!(
                    "ignore region {}:{}-{}:{} has its corners swapped",
                    region.x1, region.y1, region.x2, region.y2
                )));
            }
        }
        Ok(())
    }

    /// Squared perceptual distance above which a pixel counts as different.
    pub fn max_delta(&self) -> f32 {
        yiq::max_delta_for_threshold(self.threshold)
    }
}
