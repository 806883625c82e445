use std::arch::aarch64::{
    float32x4_t, uint32x4_t, vaddq_f32, vaddvq_u32, vandq_u32, vceqq_u32, vcgtq_f32,
    vcvtq_f32_u32, vdupq_n_f32, vdupq_n_u32, vld1q_u32, vminvq_u32, vmulq_f32, vshrq_n_u32,
    vst1q_u32, vsubq_f32,
};

use super::scalar::{find_first_difference_scalar_unchecked, scan_scalar_tail};
use super::yiq::{INV_255, Y1, Y2, Y3, Y4, Y5, Y6};
use super::{ScanParams, SpanScan};

#[inline]
#[target_feature(enable = "neon")]
fn low_byte_neon(words: uint32x4_t) -> float32x4_t {
    vcvtq_f32_u32(vandq_u32(words, vdupq_n_u32(0xFF)))
}

#[inline]
#[target_feature(enable = "neon")]
fn red_neon(words: uint32x4_t) -> float32x4_t {
    low_byte_neon(words)
}

#[inline]
#[target_feature(enable = "neon")]
fn green_neon(words: uint32x4_t) -> float32x4_t {
    low_byte_neon(vshrq_n_u32::<8>(words))
}

#[inline]
#[target_feature(enable = "neon")]
fn blue_neon(words: uint32x4_t) -> float32x4_t {
    low_byte_neon(vshrq_n_u32::<16>(words))
}

#[inline]
#[target_feature(enable = "neon")]
fn alpha_neon(words: uint32x4_t) -> float32x4_t {
    vcvtq_f32_u32(vshrq_n_u32::<24>(words))
}

#[inline]
#[target_feature(enable = "neon")]
fn yiq_delta_neon(a: uint32x4_t, b: uint32x4_t) -> float32x4_t {
    let inv255 = vdupq_n_f32(INV_255);
    let aa = alpha_neon(a);
    let ba = alpha_neon(b);
    let a_scale = vmulq_f32(aa, inv255);
    let b_scale = vmulq_f32(ba, inv255);

    macro_rules! blended_delta {
        ($channel:ident) => {
            vsubq_f32(
                vsubq_f32(vmulq_f32($channel(a), a_scale), aa),
                vsubq_f32(vmulq_f32($channel(b), b_scale), ba),
            )
        };
    }
    let dr = blended_delta!(red_neon);
    let dg = blended_delta!(green_neon);
    let db = blended_delta!(blue_neon);

    // vmulq/vaddq only; vfmaq would round differently from the scalar path.
    let yb = vmulq_f32(vmulq_f32(db, vdupq_n_f32(Y6)), db);
    let yg = vmulq_f32(
        dg,
        vaddq_f32(vmulq_f32(dg, vdupq_n_f32(Y4)), vmulq_f32(db, vdupq_n_f32(Y5))),
    );
    let yr = vmulq_f32(
        dr,
        vaddq_f32(
            vaddq_f32(vmulq_f32(dr, vdupq_n_f32(Y1)), vmulq_f32(dg, vdupq_n_f32(Y2))),
            vmulq_f32(db, vdupq_n_f32(Y3)),
        ),
    );
    vaddq_f32(vaddq_f32(yb, yg), yr)
}

/// Index of the first lane whose comparison mask is zero.
#[inline(always)]
unsafe fn first_clear_lane(mask: uint32x4_t) -> Option<usize> {
    let mut lanes = [0u32; 4];
    unsafe { vst1q_u32(lanes.as_mut_ptr(), mask) };
    lanes.iter().position(|&lane| lane == 0)
}

/// # Safety
///
/// * `a` and `b` must be valid for `len` reads.
/// * `overlay` is either null or valid for `len` writes.
#[target_feature(enable = "neon")]
pub(crate) unsafe fn scan_neon_unchecked(
    a: *const u32,
    b: *const u32,
    len: usize,
    params: ScanParams,
    overlay: *mut u32,
) -> SpanScan {
    let max_delta = vdupq_n_f32(params.max_delta);
    let mut scan = SpanScan::default();
    let mut i = 0usize;

    while i + 4 <= len {
        let va = unsafe { vld1q_u32(a.add(i)) };
        let vb = unsafe { vld1q_u32(b.add(i)) };
        let equal = vceqq_u32(va, vb);
        if vminvq_u32(equal) == u32::MAX {
            i += 4;
            continue;
        }

        let first = unsafe { first_clear_lane(equal) }.unwrap_or(0);
        scan.first_divergence.get_or_insert(i + first);
        let (va, vb) = if first == 0 {
            (va, vb)
        } else {
            i += first;
            if i + 4 > len {
                break;
            }
            unsafe { (vld1q_u32(a.add(i)), vld1q_u32(b.add(i))) }
        };

        let hit = vcgtq_f32(yiq_delta_neon(va, vb), max_delta);
        let count = vaddvq_u32(vshrq_n_u32::<31>(hit));
        if count != 0 {
            scan.differing += u64::from(count);
            if !overlay.is_null() {
                let mut lanes = [0u32; 4];
                unsafe { vst1q_u32(lanes.as_mut_ptr(), hit) };
                for (lane, mask) in lanes.into_iter().enumerate() {
                    if mask != 0 {
                        unsafe { std::ptr::write(overlay.add(i + lane), params.diff_color) };
                    }
                }
            }
        }
        i += 4;
    }

    unsafe { scan_scalar_tail(a, b, i, len, params, overlay, &mut scan) };
    scan
}

/// # Safety
///
/// `a` and `b` must be valid for `len` reads.
#[target_feature(enable = "neon")]
pub(crate) unsafe fn find_first_difference_neon_unchecked(
    a: *const u32,
    b: *const u32,
    len: usize,
) -> Option<usize> {
    let mut i = 0usize;
    while i + 4 <= len {
        let equal = unsafe { vceqq_u32(vld1q_u32(a.add(i)), vld1q_u32(b.add(i))) };
        if vminvq_u32(equal) != u32::MAX {
            return unsafe { first_clear_lane(equal) }.map(|lane| i + lane);
        }
        i += 4;
    }
    let tail = unsafe { find_first_difference_scalar_unchecked(a.add(i), b.add(i), len - i) };
    tail.map(|offset| i + offset)
}
