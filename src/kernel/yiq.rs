//! Perceptual color distance in YIQ space.
//!
//! See "Measuring perceived color difference using YIQ NTSC transmission
//! color space in mobile applications" (Kotsarenko & Ramos) for the axis
//! coefficients and weights.
//!
//! Both pixels are alpha-composited against white before the RGB deltas are
//! projected onto the Y, I and Q axes. Compositing never materializes: per
//! pixel, `(c - 255) * (alpha / 255) + 255` differs from the other side only
//! by `c * v - alpha` with `v = alpha / 255`, so the blended channel delta is
//! `(c_a * va - alpha_a) - (c_b * vb - alpha_b)`.
//!
//! The weighted sum `wY*y² + wI*i² + wQ*q²` is a quadratic form in the
//! channel deltas. Folding each axis weight into its coefficients (C1..C9)
//! and expanding the squares leaves six coefficients (Y1..Y6):
//!
//! ```text
//! r*(r*Y1 + g*Y2 + b*Y3) + g*(g*Y4 + b*Y5) + b*b*Y6
//! ```
//!
//! Every backend evaluates this expression in single precision with the same
//! operation order and without fused multiply-add, which keeps the scalar and
//! vector classifications bit-identical.

use crate::pixel::Pixel;

const YIQ_Y_R: f64 = 0.298_895_31;
const YIQ_Y_G: f64 = 0.586_622_47;
const YIQ_Y_B: f64 = 0.114_482_23;

const YIQ_I_R: f64 = 0.595_977_99;
const YIQ_I_G: f64 = -0.274_176_10;
const YIQ_I_B: f64 = -0.321_801_89;

const YIQ_Q_R: f64 = 0.211_470_17;
const YIQ_Q_G: f64 = -0.522_617_11;
const YIQ_Q_B: f64 = 0.311_146_94;

pub const YIQ_Y_WEIGHT: f64 = 0.5053;
pub const YIQ_I_WEIGHT: f64 = 0.299;
pub const YIQ_Q_WEIGHT: f64 = 0.1957;

const YIQ_Y_WEIGHT_SQRT: f64 = 0.710_844_568_101_916_3;
const YIQ_I_WEIGHT_SQRT: f64 = 0.546_808_924_579_692_7;
const YIQ_Q_WEIGHT_SQRT: f64 = 0.442_379_927_211_893_3;

const C1: f64 = YIQ_Y_R * YIQ_Y_WEIGHT_SQRT;
const C2: f64 = YIQ_Y_G * YIQ_Y_WEIGHT_SQRT;
const C3: f64 = YIQ_Y_B * YIQ_Y_WEIGHT_SQRT;
const C4: f64 = YIQ_I_R * YIQ_I_WEIGHT_SQRT;
const C5: f64 = YIQ_I_G * YIQ_I_WEIGHT_SQRT;
const C6: f64 = YIQ_I_B * YIQ_I_WEIGHT_SQRT;
const C7: f64 = YIQ_Q_R * YIQ_Q_WEIGHT_SQRT;
const C8: f64 = YIQ_Q_G * YIQ_Q_WEIGHT_SQRT;
const C9: f64 = YIQ_Q_B * YIQ_Q_WEIGHT_SQRT;

pub(crate) const Y1: f32 = (C1 * C1 + C4 * C4 + C7 * C7) as f32;
pub(crate) const Y2: f32 = (2.0 * (C2 * C1 + C5 * C4 + C8 * C7)) as f32;
pub(crate) const Y3: f32 = (2.0 * (C3 * C1 + C6 * C4 + C9 * C7)) as f32;
pub(crate) const Y4: f32 = (C2 * C2 + C5 * C5 + C8 * C8) as f32;
pub(crate) const Y5: f32 = (2.0 * (C2 * C3 + C5 * C6 + C8 * C9)) as f32;
pub(crate) const Y6: f32 = (C3 * C3 + C6 * C6 + C9 * C9) as f32;

pub(crate) const INV_255: f32 = 1.0 / 255.0;

/// Delta that a threshold of `1.0` maps to.
pub const MAX_YIQ_DELTA: f64 = 35_215.0;

/// Convert a `0..=1` color threshold into the squared-distance cutoff used
/// by the kernels. A pixel differs when its distance is strictly greater.
pub fn max_delta_for_threshold(threshold: f64) -> f32 {
    (MAX_YIQ_DELTA * threshold * threshold) as f32
}

/// Squared perceptual distance between two pixels. Symmetric, zero for equal
/// pixels and for any two fully transparent pixels.
pub fn distance(a: Pixel, b: Pixel) -> f64 {
    f64::from(pixel_delta(a.word(), b.word()))
}

pub fn is_different(a: Pixel, b: Pixel, max_delta: f32) -> bool {
    pixel_delta(a.word(), b.word()) > max_delta
}

#[inline(always)]
pub(crate) fn pixel_delta(a: u32, b: u32) -> f32 {
    let [ar, ag, ab, aa] = unpack(a);
    let [br, bg, bb, ba] = unpack(b);
    let a_scale = aa * INV_255;
    let b_scale = ba * INV_255;

    let dr = (ar * a_scale - aa) - (br * b_scale - ba);
    let dg = (ag * a_scale - aa) - (bg * b_scale - ba);
    let db = (ab * a_scale - aa) - (bb * b_scale - ba);
    quadratic_form(dr, dg, db)
}

#[inline(always)]
pub(crate) fn quadratic_form(dr: f32, dg: f32, db: f32) -> f32 {
    let yb = (db * Y6) * db;
    let yg = dg * ((dg * Y4) + (db * Y5));
    let yr = dr * (((dr * Y1) + (dg * Y2)) + (db * Y3));
    (yb + yg) + yr
}

#[inline(always)]
fn unpack(word: u32) -> [f32; 4] {
    word.to_le_bytes().map(f32::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unfolded_distance(a: Pixel, b: Pixel) -> f64 {
        let blend = |c: u8, alpha: u8| {
            let alpha = f64::from(alpha) / 255.0;
            255.0 + (f64::from(c) - 255.0) * alpha
        };
        let dr = blend(a.r(), a.a()) - blend(b.r(), b.a());
        let dg = blend(a.g(), a.a()) - blend(b.g(), b.a());
        let db = blend(a.b(), a.a()) - blend(b.b(), b.a());
        let y = dr * YIQ_Y_R + dg * YIQ_Y_G + db * YIQ_Y_B;
        let i = dr * YIQ_I_R + dg * YIQ_I_G + db * YIQ_I_B;
        let q = dr * YIQ_Q_R + dg * YIQ_Q_G + db * YIQ_Q_B;
        YIQ_Y_WEIGHT * y * y + YIQ_I_WEIGHT * i * i + YIQ_Q_WEIGHT * q * q
    }

    #[test]
    fn folded_coefficients_match_published_values() {
        let expected = [0.160096, 0.036226, -0.054354, 0.249815, 0.056986, 0.056532];
        for (actual, expected) in [Y1, Y2, Y3, Y4, Y5, Y6].into_iter().zip(expected) {
            assert!(
                (f64::from(actual) - expected).abs() < 1e-5,
                "{actual} != {expected}"
            );
        }
        assert!((YIQ_Y_WEIGHT_SQRT * YIQ_Y_WEIGHT_SQRT - YIQ_Y_WEIGHT).abs() < 1e-12);
        assert!((YIQ_I_WEIGHT_SQRT * YIQ_I_WEIGHT_SQRT - YIQ_I_WEIGHT).abs() < 1e-12);
        assert!((YIQ_Q_WEIGHT_SQRT * YIQ_Q_WEIGHT_SQRT - YIQ_Q_WEIGHT).abs() < 1e-12);
    }

    #[test]
    fn folded_form_agrees_with_per_axis_evaluation() {
        let samples = [
            (Pixel::from_rgba(255, 0, 0, 255), Pixel::from_rgba(0, 0, 255, 255)),
            (Pixel::from_rgba(0, 0, 0, 255), Pixel::from_rgba(255, 255, 255, 255)),
            (Pixel::from_rgba(12, 200, 37, 128), Pixel::from_rgba(90, 14, 250, 30)),
            (Pixel::from_rgba(1, 2, 3, 4), Pixel::from_rgba(4, 3, 2, 1)),
        ];
        for (a, b) in samples {
            let folded = distance(a, b);
            let reference = unfolded_distance(a, b);
            assert!(
                (folded - reference).abs() <= reference.abs() * 1e-4 + 1e-2,
                "{a:?} vs {b:?}: folded {folded}, reference {reference}"
            );
        }
    }

    #[test]
    fn equal_and_fully_transparent_pixels_have_zero_distance() {
        let px = Pixel::from_rgba(17, 99, 201, 77);
        assert_eq!(distance(px, px), 0.0);
        assert_eq!(
            distance(Pixel::from_rgba(0, 0, 0, 0), Pixel::from_rgba(123, 45, 67, 0)),
            0.0
        );
    }

    #[test]
    fn partially_transparent_mismatches_still_count() {
        let a = Pixel::from_rgba(0, 0, 0, 128);
        let b = Pixel::from_rgba(0, 0, 0, 0);
        assert!(distance(a, b) > 0.0);
    }

    #[test]
    fn distance_is_exactly_symmetric() {
        let a = Pixel::from_rgba(250, 3, 77, 201);
        let b = Pixel::from_rgba(9, 180, 66, 54);
        assert_eq!(distance(a, b).to_bits(), distance(b, a).to_bits());
    }

    #[test]
    fn threshold_maps_to_squared_cutoff() {
        assert_eq!(max_delta_for_threshold(0.0), 0.0);
        assert_eq!(max_delta_for_threshold(1.0), 35_215.0);
        assert!((f64::from(max_delta_for_threshold(0.1)) - 352.15).abs() < 1e-3);

        let red = Pixel::from_rgba(255, 0, 0, 255);
        let blue = Pixel::from_rgba(0, 0, 255, 255);
        assert!(is_different(red, blue, max_delta_for_threshold(0.0)));
        assert!(!is_different(red, blue, max_delta_for_threshold(1.0)));
    }
}
