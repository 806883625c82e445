use std::arch::x86_64::{
    __m128, __m128i, __m256, __m256i, _CMP_GT_OQ, _mm_add_ps, _mm_and_si128, _mm_castsi128_ps,
    _mm_cmpeq_epi32, _mm_cmpgt_ps, _mm_cvtepi32_ps, _mm_loadu_si128, _mm_movemask_ps, _mm_mul_ps,
    _mm_set1_epi32, _mm_set1_ps, _mm_srli_epi32, _mm_sub_ps, _mm256_add_ps, _mm256_and_si256,
    _mm256_castps_si256, _mm256_castsi256_ps, _mm256_cmp_ps, _mm256_cmpeq_epi32,
    _mm256_cvtepi32_ps, _mm256_loadu_si256, _mm256_maskstore_epi32, _mm256_movemask_ps,
    _mm256_mul_ps, _mm256_or_si256, _mm256_set1_epi32, _mm256_set1_ps, _mm256_srli_epi32,
    _mm256_sub_ps, _mm256_testz_si256, _mm256_xor_si256,
};

use super::scalar::{find_first_difference_scalar_unchecked, scan_scalar_tail};
use super::yiq::{INV_255, Y1, Y2, Y3, Y4, Y5, Y6};
use super::{ScanParams, SpanScan, overlay_at};

// Channel extraction mirrors the scalar `to_le_bytes` unpack: R in the low
// byte, A in the high byte. Every conversion is exact (0..=255), and the
// arithmetic below follows `yiq::pixel_delta` operation for operation.

// ---------------------------------------------------------------------------
// SSE2
// ---------------------------------------------------------------------------

#[inline]
#[target_feature(enable = "sse2")]
fn channel_sse2<const SHIFT: i32>(words: __m128i) -> __m128 {
    _mm_cvtepi32_ps(_mm_and_si128(
        _mm_srli_epi32::<SHIFT>(words),
        _mm_set1_epi32(0xFF),
    ))
}

#[inline]
#[target_feature(enable = "sse2")]
fn yiq_delta_sse2(a: __m128i, b: __m128i) -> __m128 {
    let inv255 = _mm_set1_ps(INV_255);
    let aa = channel_sse2::<24>(a);
    let ba = channel_sse2::<24>(b);
    let a_scale = _mm_mul_ps(aa, inv255);
    let b_scale = _mm_mul_ps(ba, inv255);

    macro_rules! blended_delta {
        ($shift:literal) => {
            _mm_sub_ps(
                _mm_sub_ps(_mm_mul_ps(channel_sse2::<$shift>(a), a_scale), aa),
                _mm_sub_ps(_mm_mul_ps(channel_sse2::<$shift>(b), b_scale), ba),
            )
        };
    }
    let dr = blended_delta!(0);
    let dg = blended_delta!(8);
    let db = blended_delta!(16);

    let yb = _mm_mul_ps(_mm_mul_ps(db, _mm_set1_ps(Y6)), db);
    let yg = _mm_mul_ps(
        dg,
        _mm_add_ps(
            _mm_mul_ps(dg, _mm_set1_ps(Y4)),
            _mm_mul_ps(db, _mm_set1_ps(Y5)),
        ),
    );
    let yr = _mm_mul_ps(
        dr,
        _mm_add_ps(
            _mm_add_ps(
                _mm_mul_ps(dr, _mm_set1_ps(Y1)),
                _mm_mul_ps(dg, _mm_set1_ps(Y2)),
            ),
            _mm_mul_ps(db, _mm_set1_ps(Y3)),
        ),
    );
    _mm_add_ps(_mm_add_ps(yb, yg), yr)
}

/// Bitmask of lanes whose words are equal, one bit per pixel.
#[inline]
#[target_feature(enable = "sse2")]
fn equal_lanes_sse2(a: __m128i, b: __m128i) -> u32 {
    _mm_movemask_ps(_mm_castsi128_ps(_mm_cmpeq_epi32(a, b))) as u32
}

/// # Safety
///
/// * `a` and `b` must be valid for `len` reads.
/// * `overlay` is either null or valid for `len` writes.
#[target_feature(enable = "sse2")]
pub(crate) unsafe fn scan_sse2_unchecked(
    a: *const u32,
    b: *const u32,
    len: usize,
    params: ScanParams,
    overlay: *mut u32,
) -> SpanScan {
    const ALL_EQUAL: u32 = 0b1111;

    let max_delta = _mm_set1_ps(params.max_delta);
    let mut scan = SpanScan::default();
    let mut i = 0usize;

    while i + 4 <= len {
        let va = unsafe { _mm_loadu_si128(a.add(i) as *const __m128i) };
        let vb = unsafe { _mm_loadu_si128(b.add(i) as *const __m128i) };
        let equal = equal_lanes_sse2(va, vb);
        if equal == ALL_EQUAL {
            i += 4;
            continue;
        }

        // Skip ahead to the first unequal lane so long equal prefixes do
        // not pay for the float math.
        let first = (!equal & ALL_EQUAL).trailing_zeros() as usize;
        scan.first_divergence.get_or_insert(i + first);
        let (va, vb) = if first == 0 {
            (va, vb)
        } else {
            i += first;
            if i + 4 > len {
                break;
            }
            unsafe {
                (
                    _mm_loadu_si128(a.add(i) as *const __m128i),
                    _mm_loadu_si128(b.add(i) as *const __m128i),
                )
            }
        };

        let hits = _mm_movemask_ps(_mm_cmpgt_ps(yiq_delta_sse2(va, vb), max_delta)) as u32;
        if hits != 0 {
            scan.differing += u64::from(hits.count_ones());
            if !overlay.is_null() {
                unsafe { paint_lanes(overlay.add(i), hits, params.diff_color) };
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
#[target_feature(enable = "sse2")]
pub(crate) unsafe fn find_first_difference_sse2_unchecked(
    a: *const u32,
    b: *const u32,
    len: usize,
) -> Option<usize> {
    const ALL_EQUAL: u32 = 0b1111;

    let mut i = 0usize;
    while i + 4 <= len {
        let va = unsafe { _mm_loadu_si128(a.add(i) as *const __m128i) };
        let vb = unsafe { _mm_loadu_si128(b.add(i) as *const __m128i) };
        let equal = equal_lanes_sse2(va, vb);
        if equal != ALL_EQUAL {
            return Some(i + (!equal & ALL_EQUAL).trailing_zeros() as usize);
        }
        i += 4;
    }
    let tail = unsafe { find_first_difference_scalar_unchecked(a.add(i), b.add(i), len - i) };
    tail.map(|offset| i + offset)
}

#[inline(always)]
unsafe fn paint_lanes(dst: *mut u32, mut hits: u32, color: u32) {
    while hits != 0 {
        let lane = hits.trailing_zeros() as usize;
        unsafe { std::ptr::write_unaligned(dst.add(lane), color) };
        hits &= hits - 1;
    }
}

// ---------------------------------------------------------------------------
// AVX2
// ---------------------------------------------------------------------------

#[inline]
#[target_feature(enable = "avx2")]
fn channel_avx2<const SHIFT: i32>(words: __m256i) -> __m256 {
    _mm256_cvtepi32_ps(_mm256_and_si256(
        _mm256_srli_epi32::<SHIFT>(words),
        _mm256_set1_epi32(0xFF),
    ))
}

#[inline]
#[target_feature(enable = "avx2")]
fn yiq_delta_avx2(a: __m256i, b: __m256i) -> __m256 {
    let inv255 = _mm256_set1_ps(INV_255);
    let aa = channel_avx2::<24>(a);
    let ba = channel_avx2::<24>(b);
    let a_scale = _mm256_mul_ps(aa, inv255);
    let b_scale = _mm256_mul_ps(ba, inv255);

    macro_rules! blended_delta {
        ($shift:literal) => {
            _mm256_sub_ps(
                _mm256_sub_ps(_mm256_mul_ps(channel_avx2::<$shift>(a), a_scale), aa),
                _mm256_sub_ps(_mm256_mul_ps(channel_avx2::<$shift>(b), b_scale), ba),
            )
        };
    }
    let dr = blended_delta!(0);
    let dg = blended_delta!(8);
    let db = blended_delta!(16);

    let yb = _mm256_mul_ps(_mm256_mul_ps(db, _mm256_set1_ps(Y6)), db);
    let yg = _mm256_mul_ps(
        dg,
        _mm256_add_ps(
            _mm256_mul_ps(dg, _mm256_set1_ps(Y4)),
            _mm256_mul_ps(db, _mm256_set1_ps(Y5)),
        ),
    );
    let yr = _mm256_mul_ps(
        dr,
        _mm256_add_ps(
            _mm256_add_ps(
                _mm256_mul_ps(dr, _mm256_set1_ps(Y1)),
                _mm256_mul_ps(dg, _mm256_set1_ps(Y2)),
            ),
            _mm256_mul_ps(db, _mm256_set1_ps(Y3)),
        ),
    );
    _mm256_add_ps(_mm256_add_ps(yb, yg), yr)
}

#[inline]
#[target_feature(enable = "avx2")]
fn equal_lanes_avx2(a: __m256i, b: __m256i) -> u32 {
    _mm256_movemask_ps(_mm256_castsi256_ps(_mm256_cmpeq_epi32(a, b))) as u32
}

/// `true` when the 32 words at `a` and `b` are identical. One test per
/// 128 bytes keeps identical regions close to memory bandwidth.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn block32_equal_avx2(a: *const u32, b: *const u32) -> bool {
    let (x0, x1, x2, x3) = unsafe {
        (
            _mm256_xor_si256(
                _mm256_loadu_si256(a as *const __m256i),
                _mm256_loadu_si256(b as *const __m256i),
            ),
            _mm256_xor_si256(
                _mm256_loadu_si256(a.add(8) as *const __m256i),
                _mm256_loadu_si256(b.add(8) as *const __m256i),
            ),
            _mm256_xor_si256(
                _mm256_loadu_si256(a.add(16) as *const __m256i),
                _mm256_loadu_si256(b.add(16) as *const __m256i),
            ),
            _mm256_xor_si256(
                _mm256_loadu_si256(a.add(24) as *const __m256i),
                _mm256_loadu_si256(b.add(24) as *const __m256i),
            ),
        )
    };
    let any = _mm256_or_si256(_mm256_or_si256(x0, x1), _mm256_or_si256(x2, x3));
    _mm256_testz_si256(any, any) != 0
}

/// # Safety
///
/// * `a` and `b` must be valid for `len` reads.
/// * `overlay` is either null or valid for `len` writes.
/// * The CPU must support AVX2.
#[target_feature(enable = "avx2")]
pub(crate) unsafe fn scan_avx2_unchecked(
    a: *const u32,
    b: *const u32,
    len: usize,
    params: ScanParams,
    overlay: *mut u32,
) -> SpanScan {
    const ALL_EQUAL: u32 = 0xFF;

    let max_delta = _mm256_set1_ps(params.max_delta);
    let color = _mm256_set1_epi32(params.diff_color as i32);
    let mut scan = SpanScan::default();
    let mut i = 0usize;

    while i + 8 <= len {
        if i + 32 <= len && unsafe { block32_equal_avx2(a.add(i), b.add(i)) } {
            i += 32;
            continue;
        }

        let va = unsafe { _mm256_loadu_si256(a.add(i) as *const __m256i) };
        let vb = unsafe { _mm256_loadu_si256(b.add(i) as *const __m256i) };
        let equal = equal_lanes_avx2(va, vb);
        if equal == ALL_EQUAL {
            i += 8;
            continue;
        }

        let first = (!equal & ALL_EQUAL).trailing_zeros() as usize;
        scan.first_divergence.get_or_insert(i + first);
        let (va, vb) = if first == 0 {
            (va, vb)
        } else {
            i += first;
            if i + 8 > len {
                break;
            }
            unsafe {
                (
                    _mm256_loadu_si256(a.add(i) as *const __m256i),
                    _mm256_loadu_si256(b.add(i) as *const __m256i),
                )
            }
        };

        let hit = _mm256_cmp_ps::<_CMP_GT_OQ>(yiq_delta_avx2(va, vb), max_delta);
        let hits = _mm256_movemask_ps(hit) as u32;
        if hits != 0 {
            scan.differing += u64::from(hits.count_ones());
            if !overlay.is_null() {
                unsafe {
                    _mm256_maskstore_epi32(
                        overlay.add(i) as *mut i32,
                        _mm256_castps_si256(hit),
                        color,
                    );
                }
            }
        }
        i += 8;
    }

    // Remaining 0..=7 pixels: one SSE2 step, then scalar.
    if i < len {
        let tail = unsafe {
            scan_sse2_unchecked(
                a.add(i),
                b.add(i),
                len - i,
                params,
                overlay_at(overlay, i),
            )
        };
        scan.absorb(tail, i);
    }
    scan
}

/// # Safety
///
/// * `a` and `b` must be valid for `len` reads.
/// * The CPU must support AVX2.
#[target_feature(enable = "avx2")]
pub(crate) unsafe fn find_first_difference_avx2_unchecked(
    a: *const u32,
    b: *const u32,
    len: usize,
) -> Option<usize> {
    const ALL_EQUAL: u32 = 0xFF;

    let mut i = 0usize;
    while i + 32 <= len && unsafe { block32_equal_avx2(a.add(i), b.add(i)) } {
        i += 32;
    }
    while i + 8 <= len {
        let va = unsafe { _mm256_loadu_si256(a.add(i) as *const __m256i) };
        let vb = unsafe { _mm256_loadu_si256(b.add(i) as *const __m256i) };
        let equal = equal_lanes_avx2(va, vb);
        if equal != ALL_EQUAL {
            return Some(i + (!equal & ALL_EQUAL).trailing_zeros() as usize);
        }
        i += 8;
    }
    let tail = unsafe { find_first_difference_sse2_unchecked(a.add(i), b.add(i), len - i) };
    tail.map(|offset| i + offset)
}
