use super::yiq::pixel_delta;
use super::{ScanParams, SpanScan, overlay_at};

#[inline(always)]
unsafe fn classify_one(
    a: *const u32,
    b: *const u32,
    index: usize,
    params: ScanParams,
    overlay: *mut u32,
    scan: &mut SpanScan,
) {
    let (pa, pb) = unsafe { (std::ptr::read(a.add(index)), std::ptr::read(b.add(index))) };
    if pa == pb {
        return;
    }
    scan.first_divergence.get_or_insert(index);
    if pixel_delta(pa, pb) > params.max_delta {
        scan.differing += 1;
        if !overlay.is_null() {
            unsafe { std::ptr::write(overlay.add(index), params.diff_color) };
        }
    }
}

/// Reference scan: one pixel at a time, with an eight-pixel equality skip.
///
/// # Safety
///
/// * `a` and `b` must be valid for `len` reads.
/// * `overlay` is either null or valid for `len` writes.
pub(crate) unsafe fn scan_scalar_unchecked(
    a: *const u32,
    b: *const u32,
    len: usize,
    params: ScanParams,
    overlay: *mut u32,
) -> SpanScan {
    let mut scan = SpanScan::default();
    let mut i = 0usize;

    while i + 8 <= len {
        let unequal = unsafe { block_differs(a.add(i), b.add(i)) };
        if unequal {
            for lane in i..i + 8 {
                unsafe { classify_one(a, b, lane, params, overlay, &mut scan) };
            }
        }
        i += 8;
    }
    while i < len {
        unsafe { classify_one(a, b, i, params, overlay, &mut scan) };
        i += 1;
    }
    scan
}

/// # Safety
///
/// `a` and `b` must be valid for `len` reads.
pub(crate) unsafe fn find_first_difference_scalar_unchecked(
    a: *const u32,
    b: *const u32,
    len: usize,
) -> Option<usize> {
    let mut i = 0usize;
    while i + 8 <= len {
        if unsafe { block_differs(a.add(i), b.add(i)) } {
            break;
        }
        i += 8;
    }
    (i..len).find(|&index| unsafe { std::ptr::read(a.add(index)) != std::ptr::read(b.add(index)) })
}

#[inline(always)]
unsafe fn block_differs(a: *const u32, b: *const u32) -> bool {
    unsafe {
        let x0 = std::ptr::read(a) ^ std::ptr::read(b);
        let x1 = std::ptr::read(a.add(1)) ^ std::ptr::read(b.add(1));
        let x2 = std::ptr::read(a.add(2)) ^ std::ptr::read(b.add(2));
        let x3 = std::ptr::read(a.add(3)) ^ std::ptr::read(b.add(3));
        let x4 = std::ptr::read(a.add(4)) ^ std::ptr::read(b.add(4));
        let x5 = std::ptr::read(a.add(5)) ^ std::ptr::read(b.add(5));
        let x6 = std::ptr::read(a.add(6)) ^ std::ptr::read(b.add(6));
        let x7 = std::ptr::read(a.add(7)) ^ std::ptr::read(b.add(7));
        (x0 | x1 | x2 | x3 | x4 | x5 | x6 | x7) != 0
    }
}

/// Scalar tail shared by the vector kernels. Offsets the tail's divergence
/// index and overlay pointer by `start`.
///
/// # Safety
///
/// Same contract as [`scan_scalar_unchecked`] for the full `len`.
#[inline(always)]
pub(crate) unsafe fn scan_scalar_tail(
    a: *const u32,
    b: *const u32,
    start: usize,
    len: usize,
    params: ScanParams,
    overlay: *mut u32,
    scan: &mut SpanScan,
) {
    if start >= len {
        return;
    }
    let tail = unsafe {
        scan_scalar_unchecked(
            a.add(start),
            b.add(start),
            len - start,
            params,
            overlay_at(overlay, start),
        )
    };
    scan.absorb(tail, start);
}
