//! Image operations
//!
//! Every operation takes the decoded source by reference and returns a new
//! image. Parameter checks run before any pixel work starts.
//!
//! Rotation angles are counter-clockwise. Filter intensities map to a signed
//! adjustment of `intensity * 200 - 100` percent, clamped to `[-100, 100]`,
//! so 0.5 leaves the image unchanged for brightness, contrast and saturation.

use super::geometry::{fit_within, normalize_degrees, rotated_bounds, scale_to_height, scale_to_width};
use crate::models::{
    CommandType, CropParams, FilterParams, Operation, RemoveBackgroundParams, ResizeParams,
    TransformParams,
};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use thiserror::Error;
use tracing::{debug, warn};

const SIGMA_PER_INTENSITY: f64 = 3.0;
const DEFAULT_INTENSITY: f64 = 1.0;
const MAX_ADJUSTMENT: f64 = 100.0;
/// Blur kernels grow with sigma; beyond this the output is flat anyway
const MAX_SIGMA: f64 = 100.0;

/// Largest output a resize may produce (64 megapixels, 256 MiB as RGBA8)
pub const MAX_OUTPUT_PIXELS: u64 = 64 * 1024 * 1024;

#[derive(Debug, Error, PartialEq)]
pub enum OperationError {
    #[error("{0} parameters required")]
    MissingParameters(&'static str),

    #[error("at least one dimension must be positive")]
    NoPositiveDimension,

    #[error("resize dimensions must not be negative: {width}x{height}")]
    NegativeDimension { width: i32, height: i32 },

    #[error("unknown filter type: {0}")]
    UnknownFilter(String),

    #[error("target size {width}x{height} exceeds the {limit} pixel limit")]
    TargetTooLarge { width: u32, height: u32, limit: u64 },

    #[error("crop width and height must be positive")]
    InvalidCropSize,

    #[error("crop region out of bounds")]
    CropOutOfBounds,

    #[error("unknown command type: {0}")]
    UnknownCommand(CommandType),
}

/// What an operation produced
#[derive(Debug)]
pub enum OperationOutput {
    /// A new image to encode and store
    Image(DynamicImage),
    /// Informational run; nothing to store
    Analysis { width: u32, height: u32 },
}

/// Route an operation to its implementation
pub fn apply(image: &DynamicImage, operation: &Operation) -> Result<OperationOutput, OperationError> {
    let output = match operation {
        Operation::Resize(params) => resize(image, params.as_ref())?,
        Operation::Filter(params) => filter(image, params.as_ref())?,
        Operation::Transform(params) => transform(image, params.as_ref()),
        Operation::Crop(params) => crop(image, params.as_ref())?,
        Operation::RemoveBackground(params) => remove_background(image, params.as_ref()),
        Operation::Analyze(_) => {
            let (width, height) = image.dimensions();
            return Ok(OperationOutput::Analysis { width, height });
        }
        Operation::Unspecified => {
            return Err(OperationError::UnknownCommand(CommandType::Unspecified))
        }
    };

    Ok(OperationOutput::Image(output))
}

pub fn resize(
    image: &DynamicImage,
    params: Option<&ResizeParams>,
) -> Result<DynamicImage, OperationError> {
    let params = params.ok_or(OperationError::MissingParameters("resize"))?;

    if params.width < 0 || params.height < 0 {
        return Err(OperationError::NegativeDimension {
            width: params.width,
            height: params.height,
        });
    }
    if params.width == 0 && params.height == 0 {
        return Err(OperationError::NoPositiveDimension);
    }

    let (src_width, src_height) = image.dimensions();
    let (width, height) = (params.width as u32, params.height as u32);

    let target = if height == 0 {
        scale_to_width(src_width, src_height, width)
    } else if width == 0 {
        scale_to_height(src_width, src_height, height)
    } else if params.maintain_aspect_ratio {
        fit_within(src_width, src_height, width, height)
    } else {
        (width, height)
    };

    if u64::from(target.0) * u64::from(target.1) > MAX_OUTPUT_PIXELS {
        return Err(OperationError::TargetTooLarge {
            width: target.0,
            height: target.1,
            limit: MAX_OUTPUT_PIXELS,
        });
    }

    debug!(
        src_width,
        src_height,
        width = target.0,
        height = target.1,
        "Resizing image"
    );

    if target == (src_width, src_height) {
        return Ok(image.clone());
    }
    Ok(image.resize_exact(target.0, target.1, FilterType::Lanczos3))
}

pub fn filter(
    image: &DynamicImage,
    params: Option<&FilterParams>,
) -> Result<DynamicImage, OperationError> {
    let params = params.ok_or(OperationError::MissingParameters("filter"))?;

    // Non-positive (and NaN) intensities fall back to the default
    let intensity = if params.intensity > 0.0 {
        params.intensity
    } else {
        DEFAULT_INTENSITY
    };
    let adjustment = (intensity * 200.0 - 100.0).clamp(-MAX_ADJUSTMENT, MAX_ADJUSTMENT);
    let sigma = (SIGMA_PER_INTENSITY * intensity).min(MAX_SIGMA) as f32;

    let output = match params.filter_type.as_str() {
        "blur" => image.blur(sigma),
        "sharpen" => image.unsharpen(sigma, 0),
        "grayscale" => grayscale(image),
        "invert" => {
            let mut inverted = image.clone();
            inverted.invert();
            inverted
        }
        "brightness" => image.brighten((adjustment * 255.0 / 100.0).round() as i32),
        "contrast" => image.adjust_contrast(adjustment as f32),
        "saturation" => saturate(image, 1.0 + adjustment / 100.0),
        other => return Err(OperationError::UnknownFilter(other.to_string())),
    };

    Ok(output)
}

/// Rotate, then flip horizontally, then flip vertically.
///
/// Missing parameters leave the image as it is.
pub fn transform(image: &DynamicImage, params: Option<&TransformParams>) -> DynamicImage {
    let Some(params) = params else {
        return image.clone();
    };

    let mut output = rotate(image, params.rotation_degrees);
    if params.flip_horizontal {
        output = output.fliph();
    }
    if params.flip_vertical {
        output = output.flipv();
    }
    output
}

pub fn crop(image: &DynamicImage, params: Option<&CropParams>) -> Result<DynamicImage, OperationError> {
    let params = params.ok_or(OperationError::MissingParameters("crop"))?;

    if params.width <= 0 || params.height <= 0 {
        return Err(OperationError::InvalidCropSize);
    }

    let (src_width, src_height) = image.dimensions();
    let (x, y) = (i64::from(params.x), i64::from(params.y));
    if x < 0
        || y < 0
        || x + i64::from(params.width) > i64::from(src_width)
        || y + i64::from(params.height) > i64::from(src_height)
    {
        return Err(OperationError::CropOutOfBounds);
    }

    Ok(image.crop_imm(
        params.x as u32,
        params.y as u32,
        params.width as u32,
        params.height as u32,
    ))
}

/// Background removal has no segmentation backend; the image is converted to
/// grayscale instead.
pub fn remove_background(
    image: &DynamicImage,
    params: Option<&RemoveBackgroundParams>,
) -> DynamicImage {
    warn!(
        output_format = params.map(|p| p.output_format.as_str()).unwrap_or_default(),
        "Background removal not available, applying grayscale instead"
    );
    grayscale(image)
}

/// RGBA output with equal color channels
pub fn grayscale(image: &DynamicImage) -> DynamicImage {
    DynamicImage::ImageRgba8(image.grayscale().to_rgba8())
}

fn rotate(image: &DynamicImage, degrees: f64) -> DynamicImage {
    let degrees = normalize_degrees(degrees);

    // Quarter turns are exact; positive angles turn counter-clockwise
    if degrees == 0.0 {
        return image.clone();
    } else if degrees == 90.0 {
        return image.rotate270();
    } else if degrees == 180.0 {
        return image.rotate180();
    } else if degrees == 270.0 {
        return image.rotate90();
    }

    let source = image.to_rgba8();
    let (width, height) = rotated_bounds(source.width(), source.height(), degrees);

    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
    let offset_x = (i64::from(width) - i64::from(source.width())) / 2;
    let offset_y = (i64::from(height) - i64::from(source.height())) / 2;
    image::imageops::overlay(&mut canvas, &source, offset_x, offset_y);

    // imageproc turns clockwise for positive theta
    let rotated = rotate_about_center(
        &canvas,
        -(degrees.to_radians() as f32),
        Interpolation::Bilinear,
        Rgba([0, 0, 0, 0]),
    );
    DynamicImage::ImageRgba8(rotated)
}

fn saturate(image: &DynamicImage, factor: f64) -> DynamicImage {
    let mut pixels = image.to_rgba8();

    for pixel in pixels.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let luma = 0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b);
        let mix = |c: u8| (luma + (f64::from(c) - luma) * factor).round().clamp(0.0, 255.0) as u8;
        *pixel = Rgba([mix(r), mix(g), mix(b), a]);
    }

    DynamicImage::ImageRgba8(pixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    fn solid(width: u32, height: u32, color: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)))
    }

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8, 255])
        }))
    }

    fn resize_params(width: i32, height: i32, maintain_aspect_ratio: bool) -> ResizeParams {
        ResizeParams {
            width,
            height,
            maintain_aspect_ratio,
        }
    }

    fn filter_params(filter_type: &str, intensity: f64) -> FilterParams {
        FilterParams {
            filter_type: filter_type.to_string(),
            intensity,
        }
    }

    #[test]
    fn test_exact_resize_ignores_aspect_ratio() {
        let image = gradient(200, 100);
        let output = resize(&image, Some(&resize_params(30, 70, false))).unwrap();
        assert_eq!(output.dimensions(), (30, 70));
    }

    #[test]
    fn test_width_only_resize_is_proportional() {
        let image = gradient(200, 100);
        let output = resize(&image, Some(&resize_params(100, 0, false))).unwrap();
        assert_eq!(output.dimensions(), (100, 50));
    }

    #[test]
    fn test_height_only_resize_is_proportional() {
        let image = gradient(200, 100);
        let output = resize(&image, Some(&resize_params(0, 20, false))).unwrap();
        assert_eq!(output.dimensions(), (40, 20));
    }

    #[test]
    fn test_aspect_resize_fits_within_bounds() {
        let image = gradient(200, 100);
        let output = resize(&image, Some(&resize_params(50, 50, true))).unwrap();
        assert_eq!(output.dimensions(), (50, 25));
    }

    #[test]
    fn test_resize_rejects_bad_dimensions() {
        let image = gradient(10, 10);
        assert_eq!(
            resize(&image, Some(&resize_params(0, 0, false))).unwrap_err(),
            OperationError::NoPositiveDimension
        );
        assert!(matches!(
            resize(&image, Some(&resize_params(-5, 10, false))),
            Err(OperationError::NegativeDimension { .. })
        ));
        assert_eq!(
            resize(&image, None).unwrap_err(),
            OperationError::MissingParameters("resize")
        );
    }

    #[test]
    fn test_crop_inside_bounds() {
        let image = gradient(100, 80);
        let params = CropParams {
            x: 10,
            y: 20,
            width: 90,
            height: 60,
        };
        let output = crop(&image, Some(&params)).unwrap();

        assert_eq!(output.dimensions(), (90, 60));
        assert_eq!(output.get_pixel(0, 0), image.get_pixel(10, 20));
    }

    #[test]
    fn test_crop_out_of_bounds() {
        let image = gradient(100, 80);
        let params = CropParams {
            x: 11,
            y: 0,
            width: 90,
            height: 10,
        };
        assert_eq!(
            crop(&image, Some(&params)).unwrap_err(),
            OperationError::CropOutOfBounds
        );

        let negative = CropParams {
            x: -1,
            ..params.clone()
        };
        assert_eq!(
            crop(&image, Some(&negative)).unwrap_err(),
            OperationError::CropOutOfBounds
        );

        let empty = CropParams {
            width: 0,
            ..params
        };
        assert_eq!(
            crop(&image, Some(&empty)).unwrap_err(),
            OperationError::InvalidCropSize
        );
    }

    #[test]
    fn test_grayscale_has_equal_channels() {
        let output = filter(&gradient(16, 16), Some(&filter_params("grayscale", 0.0))).unwrap();
        for (_, _, Rgba([r, g, b, _])) in output.pixels() {
            assert_eq!(r, g);
            assert_eq!(g, b);
        }
    }

    #[test]
    fn test_neutral_intensity_keeps_pixels() {
        let image = solid(4, 4, [120, 60, 30, 255]);
        for filter_type in ["brightness", "saturation"] {
            let output = filter(&image, Some(&filter_params(filter_type, 0.5))).unwrap();
            assert_eq!(output.get_pixel(1, 1), Rgba([120, 60, 30, 255]), "{filter_type}");
        }
    }

    #[test]
    fn test_brightness_is_monotonic() {
        let image = solid(2, 2, [100, 100, 100, 255]);
        let darker = filter(&image, Some(&filter_params("brightness", 0.25))).unwrap();
        let brighter = filter(&image, Some(&filter_params("brightness", 0.75))).unwrap();

        assert!(darker.get_pixel(0, 0)[0] < 100);
        assert!(brighter.get_pixel(0, 0)[0] > 100);
    }

    #[test]
    fn test_zero_saturation_is_gray() {
        let image = solid(2, 2, [200, 40, 10, 255]);
        let output = filter(&image, Some(&filter_params("saturation", 0.000_001))).unwrap();
        let Rgba([r, g, b, _]) = output.get_pixel(0, 0);
        assert!(r.abs_diff(g) <= 1 && g.abs_diff(b) <= 1);
    }

    #[test]
    fn test_invert() {
        let output = filter(&solid(1, 1, [10, 20, 30, 255]), Some(&filter_params("invert", 1.0))).unwrap();
        assert_eq!(output.get_pixel(0, 0), Rgba([245, 235, 225, 255]));
    }

    #[test]
    fn test_unknown_filter_is_rejected() {
        let err = filter(&gradient(2, 2), Some(&filter_params("sepia", 1.0))).unwrap_err();
        assert_eq!(err.to_string(), "unknown filter type: sepia");
        assert_eq!(
            filter(&gradient(2, 2), None).unwrap_err(),
            OperationError::MissingParameters("filter")
        );
    }

    #[test]
    fn test_blur_and_sharpen_keep_size() {
        let image = gradient(20, 10);
        for filter_type in ["blur", "sharpen"] {
            let output = filter(&image, Some(&filter_params(filter_type, 0.5))).unwrap();
            assert_eq!(output.dimensions(), (20, 10));
        }
    }

    #[test]
    fn test_transform_rotates_before_flipping() {
        let mut pixels = RgbaImage::new(2, 1);
        pixels.put_pixel(0, 0, RED);
        pixels.put_pixel(1, 0, BLUE);
        let image = DynamicImage::ImageRgba8(pixels);

        let rotated = transform(
            &image,
            Some(&TransformParams {
                rotation_degrees: 90.0,
                ..Default::default()
            }),
        );
        assert_eq!(rotated.dimensions(), (1, 2));
        assert_eq!(rotated.get_pixel(0, 0), BLUE);

        let rotated_then_flipped = transform(
            &image,
            Some(&TransformParams {
                rotation_degrees: 90.0,
                flip_horizontal: false,
                flip_vertical: true,
            }),
        );
        assert_eq!(rotated_then_flipped.get_pixel(0, 0), RED);
    }

    #[test]
    fn test_arbitrary_rotation_expands_canvas_with_transparency() {
        let image = solid(100, 100, [255, 255, 255, 255]);
        let output = transform(
            &image,
            Some(&TransformParams {
                rotation_degrees: 45.0,
                ..Default::default()
            }),
        );

        assert_eq!(output.dimensions(), (142, 142));
        assert_eq!(output.get_pixel(0, 0)[3], 0);
        assert_eq!(output.get_pixel(71, 71), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_transform_without_parameters_is_identity() {
        let image = gradient(5, 3);
        let output = transform(&image, None);
        assert_eq!(output.to_rgba8(), image.to_rgba8());
    }

    #[test]
    fn test_apply_analyze_and_unknown() {
        let image = gradient(12, 8);
        assert!(matches!(
            apply(&image, &Operation::Analyze(None)).unwrap(),
            OperationOutput::Analysis { width: 12, height: 8 }
        ));

        let err = apply(&image, &Operation::Unspecified).unwrap_err();
        assert!(err.to_string().contains("unknown command type"));
    }

    #[test]
    fn test_remove_background_falls_back_to_grayscale() {
        let output = remove_background(&gradient(4, 4), None);
        for (_, _, Rgba([r, g, b, _])) in output.pixels() {
            assert_eq!(r, g);
            assert_eq!(g, b);
        }
    }

    #[test]
    fn test_oversized_resize_rejected_before_allocating() {
        let image = solid(2, 2, [1, 2, 3, 255]);

        let err = resize(&image, Some(&resize_params(30_000, 30_000, false))).unwrap_err();
        assert_eq!(
            err,
            OperationError::TargetTooLarge {
                width: 30_000,
                height: 30_000,
                limit: MAX_OUTPUT_PIXELS,
            }
        );

        // Width-only upscale of a tall source
        let tall = solid(1, 4, [1, 2, 3, 255]);
        assert!(matches!(
            resize(&tall, Some(&resize_params(i32::MAX, 0, true))),
            Err(OperationError::TargetTooLarge { .. })
        ));

        assert!(resize(&image, Some(&resize_params(512, 512, false))).is_ok());
    }

    #[test]
    fn test_extreme_intensities_stay_monotonic() {
        let image = solid(1, 1, [100, 100, 100, 255]);

        let bright = filter(&image, Some(&filter_params("brightness", 1e8))).unwrap();
        assert_eq!(bright.to_rgba8().get_pixel(0, 0).0, [255, 255, 255, 255]);

        let moderate = filter(&image, Some(&filter_params("brightness", 10.0))).unwrap();
        assert_eq!(moderate.to_rgba8().get_pixel(0, 0).0, [255, 255, 255, 255]);

        // Contrast and saturation saturate rather than wrap
        filter(&image, Some(&filter_params("contrast", 1e8))).unwrap();
        let saturated = filter(&image, Some(&filter_params("saturation", f64::MAX))).unwrap();
        assert_eq!(saturated.to_rgba8().get_pixel(0, 0).0, [100, 100, 100, 255]);
    }

    #[test]
    fn test_huge_blur_intensity_is_capped() {
        let image = gradient(8, 8);
        let output = filter(&image, Some(&filter_params("blur", 1e12))).unwrap();
        assert_eq!(output.dimensions(), (8, 8));
    }
}
