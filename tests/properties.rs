use proptest::prelude::*;
use yiqdiff::kernel::yiq;
use yiqdiff::{
    BackendPreference, CompareConfig, IgnoreRegion, ImageBuffer, KernelBackend, OverlayStyle,
    Pixel, compare,
};

fn pixel() -> impl Strategy<Value = Pixel> {
    prop_oneof![
        any::<u32>().prop_map(Pixel::from_word),
        any::<[u8; 3]>().prop_map(|[r, g, b]| Pixel::from_rgba(r, g, b, 255)),
        any::<[u8; 3]>().prop_map(|[r, g, b]| Pixel::from_rgba(r, g, b, 0)),
    ]
}

/// Two same-sized images where the candidate is a noisy copy of the base, so
/// both equal and unequal runs show up.
fn image_pair() -> impl Strategy<Value = (ImageBuffer, ImageBuffer)> {
    (1u32..48, 1u32..24).prop_flat_map(|(width, height)| {
        let len = (width * height) as usize;
        (
            prop::collection::vec(pixel(), len),
            prop::collection::vec((any::<bool>(), pixel()), len),
        )
            .prop_map(move |(base, edits)| {
                let candidate = base
                    .iter()
                    .zip(edits)
                    .map(|(&original, (keep, replacement))| {
                        if keep { original } else { replacement }
                    })
                    .collect();
                (
                    ImageBuffer::new(width, height, base).unwrap(),
                    ImageBuffer::new(width, height, candidate).unwrap(),
                )
            })
    })
}

fn scalar_count(base: &ImageBuffer, candidate: &ImageBuffer, threshold: f64) -> u64 {
    let config = CompareConfig::default()
        .with_threshold(threshold)
        .with_backend(BackendPreference::Scalar);
    compare(base, candidate, &config).unwrap().differing_pixels
}

proptest! {
    #[test]
    fn image_never_differs_from_itself(
        (base, _) in image_pair(),
        threshold in 0.0f64..=1.0,
    ) {
        let config = CompareConfig::default().with_threshold(threshold);
        prop_assert_eq!(compare(&base, &base, &config).unwrap().differing_pixels, 0);
    }

    #[test]
    fn distance_is_symmetric(a in pixel(), b in pixel()) {
        prop_assert_eq!(yiq::distance(a, b), yiq::distance(b, a));
    }

    #[test]
    fn swapping_inputs_keeps_the_count(
        (base, candidate) in image_pair(),
        threshold in 0.0f64..=1.0,
    ) {
        prop_assert_eq!(
            scalar_count(&base, &candidate, threshold),
            scalar_count(&candidate, &base, threshold)
        );
    }

    #[test]
    fn raising_the_threshold_never_adds_differences(
        (base, candidate) in image_pair(),
        low in 0.0f64..=1.0,
        step in 0.0f64..=0.5,
    ) {
        let high = low + step;
        prop_assert!(scalar_count(&base, &candidate, high) <= scalar_count(&base, &candidate, low));
    }

    #[test]
    fn every_backend_agrees_with_scalar(
        (base, candidate) in image_pair(),
        threshold in 0.0f64..=1.0,
    ) {
        let expected = scalar_count(&base, &candidate, threshold);
        let scalar = CompareConfig::default()
            .with_threshold(threshold)
            .with_backend(BackendPreference::Scalar)
            .with_overlay(OverlayStyle::Mask);
        let reference = compare(&base, &candidate, &scalar).unwrap();

        let auto = scalar.clone().with_backend(BackendPreference::Auto);
        let result = compare(&base, &candidate, &auto).unwrap();
        prop_assert_eq!(result.differing_pixels, expected);
        prop_assert_eq!(result.overlay, reference.overlay);

        for backend in KernelBackend::available() {
            let span = yiqdiff::kernel::scan_and_classify(
                backend,
                base.as_words(),
                candidate.as_words(),
                0..base.pixel_count(),
                yiqdiff::kernel::ScanParams::from_config(&scalar),
                None,
            );
            prop_assert_eq!(span.differing, expected, "backend {}", backend);
        }
    }

    #[test]
    fn ignored_pixels_never_count(
        (base, candidate) in image_pair(),
        corner in (0u32..48, 0u32..24),
        size in (0u32..16, 0u32..16),
    ) {
        let region = IgnoreRegion::new(
            corner.0,
            corner.1,
            corner.0 + size.0,
            corner.1 + size.1,
        )
        .unwrap();
        let config = CompareConfig::default()
            .with_backend(BackendPreference::Scalar)
            .with_ignore_regions([region])
            .with_overlay(OverlayStyle::Mask);
        let result = compare(&base, &candidate, &config).unwrap();

        let max_delta = config.max_delta();
        let mut expected = 0u64;
        for y in 0..base.height() {
            for x in 0..base.width() {
                let inside = (region.x1..=region.x2).contains(&x) && region.contains_row(y);
                let a = base.pixel(x, y).unwrap();
                let b = candidate.pixel(x, y).unwrap();
                if !inside && yiq::is_different(a, b, max_delta) {
                    expected += 1;
                }
                if inside {
                    let overlay = result.overlay.as_ref().unwrap();
                    prop_assert_eq!(overlay.pixel(x, y), Some(Pixel::TRANSPARENT));
                }
            }
        }
        prop_assert_eq!(result.differing_pixels, expected);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn banded_and_single_pass_results_are_identical(
        seed in any::<u64>(),
        stride in 1usize..5000,
    ) {
        let (width, height) = (1024u32, 640u32);
        let mut state = seed;
        let base: Vec<Pixel> = (0..width * height)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                Pixel::from_word((state >> 32) as u32)
            })
            .collect();
        let mut candidate = base.clone();
        for pixel in candidate.iter_mut().step_by(stride) {
            *pixel = Pixel::from_word(!pixel.word());
        }
        let base = ImageBuffer::new(width, height, base).unwrap();
        let candidate = ImageBuffer::new(width, height, candidate).unwrap();

        let config = CompareConfig::default()
            .with_overlay(OverlayStyle::Base)
            .with_diff_lines(true);
        let banded = compare(&base, &candidate, &config).unwrap();
        let single = compare(&base, &candidate, &config.clone().with_parallel(false)).unwrap();
        prop_assert_eq!(banded, single);
    }
}
