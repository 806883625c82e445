use yiqdiff::codec::compare_files;
use yiqdiff::{
    CompareConfig, DiffError, ImageBuffer, OverlayStyle, Pixel, compare_paths, decode, encode,
};

fn gradient(width: u32, height: u32) -> ImageBuffer {
    let pixels = (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .map(|(x, y)| Pixel::from_rgba((x * 7) as u8, (y * 11) as u8, 90, 200))
        .collect();
    ImageBuffer::new(width, height, pixels).unwrap()
}

#[test]
fn png_round_trip_is_lossless() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gradient.png");
    let image = gradient(13, 9);

    encode(&path, &image).unwrap();
    let decoded = decode(&path).unwrap();
    assert_eq!(decoded, image);
    assert!(compare_paths(&path, &path).unwrap().is_match());
}

#[test]
fn jpeg_output_drops_alpha() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gradient.jpg");

    encode(&path, &gradient(16, 16)).unwrap();
    let decoded = decode(&path).unwrap();
    assert_eq!(decoded.dimensions(), (16, 16));
    assert!(decoded.pixels().iter().all(|pixel| pixel.a() == 255));
}

#[test]
fn overlay_is_written_only_when_images_differ() {
    let dir = tempfile::tempdir().unwrap();
    let base_path = dir.path().join("base.png");
    let same_path = dir.path().join("same.png");
    let changed_path = dir.path().join("changed.png");
    let overlay_path = dir.path().join("diff.png");

    let base = gradient(8, 8);
    let mut pixels = base.pixels().to_vec();
    pixels[8 * 3 + 5] = Pixel::from_rgba(255, 255, 255, 255);
    let changed = ImageBuffer::new(8, 8, pixels).unwrap();
    encode(&base_path, &base).unwrap();
    encode(&same_path, &base).unwrap();
    encode(&changed_path, &changed).unwrap();

    let config = CompareConfig::default().with_diff_lines(true);
    let result = compare_files(&base_path, &same_path, Some(overlay_path.as_path()), &config).unwrap();
    assert!(result.is_match());
    assert!(!overlay_path.exists());

    let config = config.with_overlay(OverlayStyle::Mask);
    let result = compare_files(&base_path, &changed_path, Some(overlay_path.as_path()), &config).unwrap();
    assert_eq!(result.differing_pixels, 1);
    assert_eq!(result.diff_lines, Some(vec![3]));

    let overlay = decode(&overlay_path).unwrap();
    assert_eq!(overlay.pixel(5, 3), Some(Pixel::RED));
    assert_eq!(overlay.pixel(0, 0), Some(Pixel::TRANSPARENT));
}

#[test]
fn differently_sized_files_report_a_layout_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let base_path = dir.path().join("base.png");
    let tall_path = dir.path().join("tall.png");
    encode(&base_path, &gradient(10, 10)).unwrap();
    encode(&tall_path, &gradient(10, 11)).unwrap();

    let err = compare_paths(&base_path, &tall_path).unwrap_err();
    assert!(err.is_layout_mismatch(), "{err}");
}

#[test]
fn non_image_files_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.png");
    std::fs::write(&path, b"plain text, not a png").unwrap();

    let err = decode(&path).unwrap_err();
    assert!(
        matches!(err, DiffError::UnsupportedFormat(_) | DiffError::Decode(_)),
        "{err}"
    );
}
