//! Dimension math for resize and rotation
//!
//! All helpers clamp their outputs to at least one pixel.

/// Height matching `width` while keeping the source aspect ratio
pub fn scale_to_width(src_width: u32, src_height: u32, width: u32) -> (u32, u32) {
    let height = (width as f64 * src_height as f64 / src_width.max(1) as f64).round();
    (width.max(1), (height as u32).max(1))
}

/// Width matching `height` while keeping the source aspect ratio
pub fn scale_to_height(src_width: u32, src_height: u32, height: u32) -> (u32, u32) {
    let width = (height as f64 * src_width as f64 / src_height.max(1) as f64).round();
    ((width as u32).max(1), height.max(1))
}

/// Largest size with the source aspect ratio that fits inside the bounds.
///
/// Images that already fit are returned at their own size; this never upscales.
pub fn fit_within(src_width: u32, src_height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if src_width <= max_width && src_height <= max_height {
        return (src_width, src_height);
    }

    let src_aspect = src_width as f64 / src_height.max(1) as f64;
    let max_aspect = max_width as f64 / max_height.max(1) as f64;

    if src_aspect > max_aspect {
        scale_to_width(src_width, src_height, max_width)
    } else {
        scale_to_height(src_width, src_height, max_height)
    }
}

/// Bounding box of a `width` x `height` rectangle rotated by `degrees`
pub fn rotated_bounds(width: u32, height: u32, degrees: f64) -> (u32, u32) {
    let radians = degrees.to_radians();
    let (sin, cos) = (radians.sin().abs(), radians.cos().abs());
    let (w, h) = (width as f64, height as f64);

    // Trim float noise so exact multiples of 90 degrees do not grow by a pixel
    let round_up = |v: f64| ((v - 1e-6).ceil().max(1.0)) as u32;
    (round_up(w * cos + h * sin), round_up(w * sin + h * cos))
}

/// Normalize an angle into `[0, 360)`
pub fn normalize_degrees(degrees: f64) -> f64 {
    let normalized = degrees.rem_euclid(360.0);
    if (360.0 - normalized).abs() < 1e-9 {
        0.0
    } else {
        normalized
    }
}
