//! Geometric Transform Engine.
//!
//! Normalizes pixel layout according to the EXIF orientation, resizes per
//! the Fill or Fit policy, and encodes the result.

use crate::{
    models::{format::OutputFormat, spec::OutputSpec},
    services::orientation::Orientation,
};
use image::{
    DynamicImage, ImageFormat, ImageReader, codecs::jpeg::JpegEncoder, imageops::FilterType,
};
use std::io::{BufRead, Cursor, Seek};
use thiserror::Error;

/// JPEG quality used for every encoded derivative.
pub const JPEG_QUALITY: u8 = 95;

const RESAMPLE_FILTER: FilterType = FilterType::Lanczos3;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("could not decode source image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("target dimensions {width}x{height} must both be positive")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("{format:?} encode failed: {source}")]
    Encode {
        format: OutputFormat,
        #[source]
        source: image::ImageError,
    },
    #[error("image worker stopped: {0}")]
    Aborted(String),
}

/// Decode the image the reader is positioned at.
pub fn decode<R: BufRead + Seek>(reader: R) -> Result<DynamicImage, TransformError> {
    ImageReader::new(reader)
        .with_guessed_format()
        .map_err(|err| TransformError::Decode(image::ImageError::IoError(err)))?
        .decode()
        .map_err(TransformError::Decode)
}

/// Rotate and mirror `img` so it displays upright.
pub fn apply_orientation(img: DynamicImage, orientation: Orientation) -> DynamicImage {
    // `image` rotates clockwise; EXIF codes are counter-clockwise.
    match orientation {
        Orientation::Normal => img,
        Orientation::MirrorHorizontal => img.fliph(),
        Orientation::Rotate180 => img.rotate180(),
        Orientation::MirrorHorizontalRotate180 => img.flipv(),
        Orientation::MirrorVerticalRotate270 => img.flipv().rotate90(),
        Orientation::Rotate270 => img.rotate90(),
        Orientation::MirrorVerticalRotate90 => img.flipv().rotate270(),
        Orientation::Rotate90 => img.rotate270(),
    }
}

/// Orient, then resize according to `spec`.
pub fn transform(
    img: DynamicImage,
    orientation: Orientation,
    spec: &OutputSpec,
) -> Result<DynamicImage, TransformError> {
    if spec.width == 0 || spec.height == 0 {
        return Err(TransformError::InvalidDimensions {
            width: spec.width,
            height: spec.height,
        });
    }

    let oriented = apply_orientation(img, orientation);
    let resized = if spec.fill_mode {
        fill(&oriented, spec.width, spec.height)
    } else {
        fit(&oriented, spec.width, spec.height)
    };
    Ok(resized)
}

/// Center-crop to the target aspect ratio, then resample to exactly
/// `width × height`.
pub fn fill(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    let (src_w, src_h) = (img.width(), img.height());
    if (src_w, src_h) == (width, height) {
        return img.clone();
    }

    let (crop_w, crop_h) = fill_crop_dimensions(src_w, src_h, width, height);
    let x = (src_w - crop_w) / 2;
    let y = (src_h - crop_h) / 2;

    img.crop_imm(x, y, crop_w, crop_h)
        .resize_exact(width, height, RESAMPLE_FILTER)
}

/// Scale uniformly to fit inside `width × height`. Never enlarges.
pub fn fit(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    let (src_w, src_h) = (img.width(), img.height());
    let (dst_w, dst_h) = fit_dimensions(src_w, src_h, width, height);
    if (dst_w, dst_h) == (src_w, src_h) {
        return img.clone();
    }
    img.resize_exact(dst_w, dst_h, RESAMPLE_FILTER)
}

/// Largest centered region of the source with the target aspect ratio.
fn fill_crop_dimensions(src_w: u32, src_h: u32, width: u32, height: u32) -> (u32, u32) {
    let (src_w64, src_h64) = (u64::from(src_w), u64::from(src_h));
    let (w64, h64) = (u64::from(width), u64::from(height));

    if src_w64 * h64 > src_h64 * w64 {
        // Source is wider than the target: trim the sides.
        let crop_w = div_round(src_h64 * w64, h64).clamp(1, src_w64);
        (crop_w as u32, src_h)
    } else {
        let crop_h = div_round(src_w64 * h64, w64).clamp(1, src_h64);
        (src_w, crop_h as u32)
    }
}

/// Output size for Fit mode.
pub fn fit_dimensions(src_w: u32, src_h: u32, width: u32, height: u32) -> (u32, u32) {
    if src_w <= width && src_h <= height {
        return (src_w, src_h);
    }

    let (src_w64, src_h64) = (u64::from(src_w), u64::from(src_h));
    let (w64, h64) = (u64::from(width), u64::from(height));

    if src_w64 * h64 > src_h64 * w64 {
        let dst_h = div_round(src_h64 * w64, src_w64).max(1);
        (width, dst_h as u32)
    } else {
        let dst_w = div_round(src_w64 * h64, src_h64).max(1);
        (dst_w as u32, height)
    }
}

fn div_round(numerator: u64, denominator: u64) -> u64 {
    (numerator + denominator / 2) / denominator
}

/// Encode into `format`. JPEG drops alpha; GIF is written from RGBA.
pub fn encode(img: &DynamicImage, format: OutputFormat) -> Result<Vec<u8>, TransformError> {
    let mut buf = Cursor::new(Vec::new());
    let encode_err = |source: image::ImageError| TransformError::Encode { format, source };

    match format {
        OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
            img.to_rgb8()
                .write_with_encoder(encoder)
                .map_err(encode_err)?;
        }
        OutputFormat::Png => {
            img.write_to(&mut buf, ImageFormat::Png)
                .map_err(encode_err)?;
        }
        OutputFormat::Gif => {
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_to(&mut buf, ImageFormat::Gif)
                .map_err(encode_err)?;
        }
    }

    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// 3x2 pattern where every pixel encodes its own coordinates.
    fn pattern() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(3, 2, |x, y| {
            Rgb([x as u8 * 10, y as u8 * 10, 0])
        }))
    }

    /// Source coordinate found at each output pixel, row-major.
    fn layout(img: &DynamicImage) -> Vec<Vec<(u8, u8)>> {
        let rgb = img.to_rgb8();
        (0..rgb.height())
            .map(|y| {
                (0..rgb.width())
                    .map(|x| {
                        let p = rgb.get_pixel(x, y);
                        (p[0] / 10, p[1] / 10)
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn normal_is_a_no_op() {
        let out = apply_orientation(pattern(), Orientation::Normal);
        assert_eq!(
            layout(&out),
            vec![vec![(0, 0), (1, 0), (2, 0)], vec![(0, 1), (1, 1), (2, 1)]]
        );
    }

    #[test]
    fn mirror_and_half_turns() {
        assert_eq!(
            layout(&apply_orientation(pattern(), Orientation::MirrorHorizontal)),
            vec![vec![(2, 0), (1, 0), (0, 0)], vec![(2, 1), (1, 1), (0, 1)]]
        );
        assert_eq!(
            layout(&apply_orientation(pattern(), Orientation::Rotate180)),
            vec![vec![(2, 1), (1, 1), (0, 1)], vec![(2, 0), (1, 0), (0, 0)]]
        );
        assert_eq!(
            layout(&apply_orientation(
                pattern(),
                Orientation::MirrorHorizontalRotate180
            )),
            vec![vec![(0, 1), (1, 1), (2, 1)], vec![(0, 0), (1, 0), (2, 0)]]
        );
    }

    #[test]
    fn quarter_turns_swap_axes() {
        // Code 6: the stored top row ends up on the right-hand column.
        assert_eq!(
            layout(&apply_orientation(pattern(), Orientation::Rotate270)),
            vec![
                vec![(0, 1), (0, 0)],
                vec![(1, 1), (1, 0)],
                vec![(2, 1), (2, 0)],
            ]
        );
        // Code 8: the stored top row ends up on the left-hand column.
        assert_eq!(
            layout(&apply_orientation(pattern(), Orientation::Rotate90)),
            vec![
                vec![(2, 0), (2, 1)],
                vec![(1, 0), (1, 1)],
                vec![(0, 0), (0, 1)],
            ]
        );
    }

    #[test]
    fn transpose_and_transverse() {
        // Code 5 mirrors across the main diagonal.
        assert_eq!(
            layout(&apply_orientation(
                pattern(),
                Orientation::MirrorVerticalRotate270
            )),
            vec![
                vec![(0, 0), (0, 1)],
                vec![(1, 0), (1, 1)],
                vec![(2, 0), (2, 1)],
            ]
        );
        // Code 7 mirrors across the anti-diagonal.
        assert_eq!(
            layout(&apply_orientation(
                pattern(),
                Orientation::MirrorVerticalRotate90
            )),
            vec![
                vec![(2, 1), (2, 0)],
                vec![(1, 1), (1, 0)],
                vec![(0, 1), (0, 0)],
            ]
        );
    }

    #[test]
    fn fill_matches_requested_dimensions_exactly() {
        let cases = [
            ((640, 480), (100, 100)),
            ((480, 640), (100, 100)),
            ((640, 480), (300, 50)),
            ((97, 13), (40, 60)),
            ((50, 50), (200, 120)),
            ((1, 1), (3, 7)),
        ];
        for ((src_w, src_h), (w, h)) in cases {
            let img = DynamicImage::new_rgb8(src_w, src_h);
            let out = fill(&img, w, h);
            assert_eq!((out.width(), out.height()), (w, h), "{src_w}x{src_h} -> {w}x{h}");
        }
    }

    #[test]
    fn fill_crop_is_centered() {
        assert_eq!(fill_crop_dimensions(400, 200, 100, 100), (200, 200));
        assert_eq!(fill_crop_dimensions(200, 400, 100, 50), (200, 100));
        assert_eq!(fill_crop_dimensions(300, 300, 30, 30), (300, 300));
    }

    #[test]
    fn fit_stays_within_bounds_and_keeps_aspect() {
        let cases = [
            ((4032, 3024), (800, 800)),
            ((3024, 4032), (800, 800)),
            ((1920, 1080), (800, 600)),
            ((1000, 10), (100, 100)),
            ((333, 777), (120, 500)),
        ];
        for ((src_w, src_h), (w, h)) in cases {
            let (dst_w, dst_h) = fit_dimensions(src_w, src_h, w, h);
            assert!(dst_w <= w && dst_h <= h, "{dst_w}x{dst_h} exceeds {w}x{h}");
            assert!(dst_w == w || dst_h == h, "one axis should touch the bound");

            let expected_h = f64::from(src_h) * f64::from(dst_w) / f64::from(src_w);
            assert!(
                (f64::from(dst_h) - expected_h).abs() <= 1.0,
                "{src_w}x{src_h} -> {dst_w}x{dst_h} distorts aspect"
            );
        }
    }

    #[test]
    fn fit_never_enlarges() {
        assert_eq!(fit_dimensions(50, 40, 100, 100), (50, 40));
        let img = DynamicImage::new_rgb8(50, 40);
        let out = fit(&img, 100, 100);
        assert_eq!((out.width(), out.height()), (50, 40));
    }

    #[test]
    fn fit_resizes_pixels() {
        let img = DynamicImage::new_rgb8(1920, 1080);
        let out = fit(&img, 800, 600);
        assert_eq!((out.width(), out.height()), (800, 450));
    }

    #[test]
    fn transform_orients_before_resizing() {
        let img = DynamicImage::new_rgb8(400, 100);
        let spec = OutputSpec::new("tall", 50, 1000, false);
        let out = transform(img, Orientation::Rotate270, &spec).unwrap();
        // After the quarter turn the source is 100x400, so width binds first.
        assert_eq!((out.width(), out.height()), (50, 200));
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let img = DynamicImage::new_rgb8(10, 10);
        let err = transform(img, Orientation::Normal, &OutputSpec::new("bad", 0, 10, true))
            .unwrap_err();
        assert!(matches!(
            err,
            TransformError::InvalidDimensions {
                width: 0,
                height: 10
            }
        ));
    }

    #[test]
    fn encodes_each_output_format() {
        let img = DynamicImage::new_rgba8(6, 4);

        let jpeg = encode(&img, OutputFormat::Jpeg).unwrap();
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);

        let png = encode(&img, OutputFormat::Png).unwrap();
        assert_eq!(&png[0..8], &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);

        let gif = encode(&img, OutputFormat::Gif).unwrap();
        assert_eq!(&gif[0..3], b"GIF");
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode(Cursor::new(b"nope".to_vec())).unwrap_err();
        assert!(matches!(err, TransformError::Decode(_)));
    }
}
