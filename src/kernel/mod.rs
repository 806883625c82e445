mod parallel;
mod scalar;
#[cfg(target_arch = "aarch64")]
mod simd_neon;
#[cfg(target_arch = "x86_64")]
mod simd_x86;
pub mod yiq;

use std::fmt;
use std::ops::Range;
use std::sync::OnceLock;

use crate::config::{BackendPreference, CompareConfig};
use crate::env_config::{DISABLE_PARALLEL_VAR, FORCE_SCALAR_VAR, define_env_flag};

define_env_flag!(enabled_when(force_scalar, FORCE_SCALAR_VAR));
define_env_flag!(enabled_unless(parallel_allowed, DISABLE_PARALLEL_VAR));

/// Pre-initialize the band thread pool and the kernel selection so the first
/// comparison doesn't pay for them. Safe to call repeatedly.
pub fn warmup() {
    parallel::warmup_pool(BAND_PARALLEL_MAX_WORKERS);
    let _ = active_backend();
}

const BAND_PARALLEL_MIN_PIXELS: usize = 262_144;
const BAND_PARALLEL_MIN_CHUNK_PIXELS: usize = 65_536;
const BAND_PARALLEL_MAX_WORKERS: usize = 16;

type ScanKernel = unsafe fn(*const u32, *const u32, usize, ScanParams, *mut u32) -> SpanScan;
type FindKernel = unsafe fn(*const u32, *const u32, usize) -> Option<usize>;

/// A kernel family. Every backend produces bit-identical classifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KernelBackend {
    Scalar,
    Sse2,
    Avx2,
    Neon,
}

impl KernelBackend {
    /// Pixels classified per vector step.
    pub const fn lane_width(self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Sse2 | Self::Neon => 4,
            Self::Avx2 => 8,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Sse2 => "sse2",
            Self::Avx2 => "avx2",
            Self::Neon => "neon",
        }
    }

    /// Whether the running CPU can execute this backend.
    pub fn is_supported(self) -> bool {
        match self {
            Self::Scalar => true,
            #[cfg(target_arch = "x86_64")]
            Self::Sse2 => std::arch::is_x86_feature_detected!("sse2"),
            #[cfg(target_arch = "x86_64")]
            Self::Avx2 => std::arch::is_x86_feature_detected!("avx2"),
            #[cfg(target_arch = "aarch64")]
            Self::Neon => std::arch::is_aarch64_feature_detected!("neon"),
            #[allow(unreachable_patterns)]
            _ => false,
        }
    }

    /// Every backend the running CPU supports, narrowest first.
    pub fn available() -> Vec<Self> {
        [Self::Scalar, Self::Sse2, Self::Avx2, Self::Neon]
            .into_iter()
            .filter(|backend| backend.is_supported())
            .collect()
    }

    /// The widest supported backend, ignoring environment overrides.
    pub fn detected() -> Self {
        static DETECTED: OnceLock<KernelBackend> = OnceLock::new();
        *DETECTED.get_or_init(|| {
            Self::available()
                .into_iter()
                .max_by_key(|backend| backend.lane_width())
                .unwrap_or(Self::Scalar)
        })
    }

    /// Kernel pair for this backend. Unsupported backends resolve to the
    /// scalar kernels, so the returned pointers are always safe to execute.
    fn kernels(self) -> (ScanKernel, FindKernel) {
        if !self.is_supported() {
            return (
                scalar::scan_scalar_unchecked,
                scalar::find_first_difference_scalar_unchecked,
            );
        }
        match self {
            #[cfg(target_arch = "x86_64")]
            Self::Avx2 => (
                simd_x86::scan_avx2_unchecked,
                simd_x86::find_first_difference_avx2_unchecked,
            ),
            #[cfg(target_arch = "x86_64")]
            Self::Sse2 => (
                simd_x86::scan_sse2_unchecked,
                simd_x86::find_first_difference_sse2_unchecked,
            ),
            #[cfg(target_arch = "aarch64")]
            Self::Neon => (
                simd_neon::scan_neon_unchecked,
                simd_neon::find_first_difference_neon_unchecked,
            ),
            _ => (
                scalar::scan_scalar_unchecked,
                scalar::find_first_difference_scalar_unchecked,
            ),
        }
    }
}

impl fmt::Display for KernelBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-comparison constants handed to every kernel invocation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScanParams {
    /// Squared distance above which a pixel differs.
    pub max_delta: f32,
    /// Packed word written to the overlay for each differing pixel.
    pub diff_color: u32,
}

impl ScanParams {
    pub fn from_config(config: &CompareConfig) -> Self {
        Self {
            max_delta: config.max_delta(),
            diff_color: config.diff_color.word(),
        }
    }
}

/// Outcome of scanning one contiguous span.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SpanScan {
    /// Pixels whose distance exceeded the cutoff.
    pub differing: u64,
    /// Index of the first pixel whose words differ at all, even if it did
    /// not cross the cutoff.
    pub first_divergence: Option<usize>,
}

impl SpanScan {
    /// Fold in the result of a later span that starts `offset` pixels in.
    #[inline]
    pub(crate) fn absorb(&mut self, later: SpanScan, offset: usize) {
        self.differing += later.differing;
        if self.first_divergence.is_none() {
            self.first_divergence = later.first_divergence.map(|index| index + offset);
        }
    }
}

/// Offset a nullable overlay pointer; null stays null.
#[inline(always)]
pub(crate) fn overlay_at(overlay: *mut u32, offset: usize) -> *mut u32 {
    if overlay.is_null() {
        overlay
    } else {
        overlay.wrapping_add(offset)
    }
}

/// The process-wide backend: the widest detected one, unless
/// `YIQDIFF_FORCE_SCALAR` pins the scalar kernel.
pub fn active_backend() -> KernelBackend {
    static ACTIVE: OnceLock<KernelBackend> = OnceLock::new();
    *ACTIVE.get_or_init(|| {
        let backend = if force_scalar() {
            KernelBackend::Scalar
        } else {
            KernelBackend::detected()
        };
        log::debug!(
            "comparison kernel: {} ({} lanes)",
            backend,
            backend.lane_width()
        );
        backend
    })
}

pub fn resolve_backend(preference: BackendPreference) -> KernelBackend {
    match preference {
        BackendPreference::Auto => active_backend(),
        BackendPreference::Scalar => KernelBackend::Scalar,
    }
}

/// Classify `a[range]` against `b[range]`, painting differing pixels into
/// `overlay[range]` when an overlay is given. The returned divergence index
/// is absolute, not relative to `range.start`.
///
/// Panics when the slices disagree in length or `range` is out of bounds.
pub fn scan_and_classify(
    backend: KernelBackend,
    a: &[u32],
    b: &[u32],
    range: Range<usize>,
    params: ScanParams,
    overlay: Option<&mut [u32]>,
) -> SpanScan {
    assert_eq!(a.len(), b.len(), "compared spans differ in length");
    let span_a = &a[range.clone()];
    let span_b = &b[range.clone()];
    let overlay_ptr = match overlay {
        Some(words) => {
            assert_eq!(words.len(), a.len(), "overlay length mismatch");
            words[range.clone()].as_mut_ptr()
        }
        None => std::ptr::null_mut(),
    };

    let (scan, _) = backend.kernels();
    let mut span = unsafe {
        scan(
            span_a.as_ptr(),
            span_b.as_ptr(),
            span_a.len(),
            params,
            overlay_ptr,
        )
    };
    span.first_divergence = span.first_divergence.map(|index| index + range.start);
    span
}

/// Index of the first word at or after `start` where `a` and `b` differ.
pub fn find_first_difference(a: &[u32], b: &[u32], start: usize) -> Option<usize> {
    find_first_difference_with(active_backend(), a, b, start)
}

pub fn find_first_difference_with(
    backend: KernelBackend,
    a: &[u32],
    b: &[u32],
    start: usize,
) -> Option<usize> {
    let len = a.len().min(b.len());
    if start >= len {
        return None;
    }
    let (_, find) = backend.kernels();
    let found = unsafe { find(a[start..].as_ptr(), b[start..].as_ptr(), len - start) };
    found.map(|offset| start + offset)
}

/// How an image of `width * height` pixels is split into row bands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BandPlan {
    pub(crate) band_rows: usize,
    pub(crate) band_count: usize,
}

impl BandPlan {
    fn single(height: usize) -> Self {
        Self {
            band_rows: height.max(1),
            band_count: 1,
        }
    }
}

pub(crate) fn plan_bands(width: usize, height: usize, allow_parallel: bool) -> BandPlan {
    if !allow_parallel || !parallel_allowed() {
        return BandPlan::single(height);
    }
    let pixel_count = width.saturating_mul(height);
    if !parallel::should_parallelize(
        pixel_count,
        BAND_PARALLEL_MIN_PIXELS,
        BAND_PARALLEL_MIN_CHUNK_PIXELS,
        BAND_PARALLEL_MAX_WORKERS,
    ) {
        return BandPlan::single(height);
    }
    match parallel::band_rows(
        width,
        height,
        BAND_PARALLEL_MIN_CHUNK_PIXELS,
        BAND_PARALLEL_MAX_WORKERS,
    ) {
        Some(band_rows) => BandPlan {
            band_rows,
            band_count: height.div_ceil(band_rows),
        },
        None => BandPlan::single(height),
    }
}

#[inline]
pub(crate) fn with_scan_pool<F, R>(job: F) -> R
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    parallel::install_scan_pool(BAND_PARALLEL_MAX_WORKERS, job)
}
