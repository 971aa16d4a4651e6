//! Minimal software rasterisation on top of [`image::RgbaImage`].
//!
//! Only what a frame needs: source-over blending, thick polylines and filled
//! polygons. Everything is integer-addressed and order-dependent only on its
//! inputs so identical calls produce identical pixels.

use image::{Rgba, RgbaImage};

/// Source-over blend of `color` onto the pixel at `(x, y)`. Out-of-bounds
/// coordinates are ignored.
pub fn blend_pixel(img: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x < 0 || y < 0 || x >= img.width() as i64 || y >= img.height() as i64 {
        return;
    }
    let dst = img.get_pixel_mut(x as u32, y as u32);
    let alpha = color[3] as u32;
    if alpha == 255 {
        *dst = color;
        return;
    }
    let inv = 255 - alpha;
    for channel in 0..3 {
        let blended = (color[channel] as u32 * alpha + dst[channel] as u32 * inv + 127) / 255;
        dst[channel] = blended as u8;
    }
    dst[3] = (alpha + (dst[3] as u32 * inv + 127) / 255).min(255) as u8;
}

/// Draws a line of roughly `width` pixels by stamping squares along a DDA walk.
///
/// The segment is clipped to the image (plus the stroke margin) first, so
/// only the visible part is walked however far the endpoints lie outside.
/// Each pixel is blended at most once per segment so translucent strokes do
/// not darken where stamps overlap.
pub fn draw_line(
    img: &mut RgbaImage,
    from: (f64, f64),
    to: (f64, f64),
    width: u32,
    color: Rgba<u8>,
) {
    if !(from.0.is_finite() && from.1.is_finite() && to.0.is_finite() && to.1.is_finite()) {
        return;
    }
    let extent = width.max(1) as i64;
    let half = extent / 2;
    let margin = extent as f64;
    let Some((from, to)) = clip_segment(
        from,
        to,
        (-margin, -margin),
        (img.width() as f64 + margin, img.height() as f64 + margin),
    ) else {
        return;
    };

    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as i64;

    let mut touched = std::collections::BTreeSet::new();
    for step in 0..=steps {
        let f = step as f64 / steps as f64;
        let cx = (from.0 + dx * f).floor() as i64;
        let cy = (from.1 + dy * f).floor() as i64;
        for oy in 0..extent {
            for ox in 0..extent {
                touched.insert((cy + oy - half, cx + ox - half));
            }
        }
    }
    for (y, x) in touched {
        blend_pixel(img, x, y, color);
    }
}

/// Liang-Barsky clip of a segment to the box `min..=max`. `None` when the
/// segment misses the box entirely.
fn clip_segment(
    from: (f64, f64),
    to: (f64, f64),
    min: (f64, f64),
    max: (f64, f64),
) -> Option<((f64, f64), (f64, f64))> {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;
    let edges = [
        (-dx, from.0 - min.0),
        (dx, max.0 - from.0),
        (-dy, from.1 - min.1),
        (dy, max.1 - from.1),
    ];
    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }
    Some((
        (from.0 + dx * t0, from.1 + dy * t0),
        (from.0 + dx * t1, from.1 + dy * t1),
    ))
}

/// Fills a polygon using the even-odd rule, sampling at pixel centres.
pub fn fill_polygon(img: &mut RgbaImage, vertices: &[(f64, f64)], color: Rgba<u8>) {
    if vertices.len() < 3 || vertices.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
        return;
    }
    let min_x = vertices.iter().map(|v| v.0).fold(f64::INFINITY, f64::min);
    let max_x = vertices.iter().map(|v| v.0).fold(f64::NEG_INFINITY, f64::max);
    let min_y = vertices.iter().map(|v| v.1).fold(f64::INFINITY, f64::min);
    let max_y = vertices.iter().map(|v| v.1).fold(f64::NEG_INFINITY, f64::max);

    let x0 = (min_x.floor() as i64).max(0);
    let y0 = (min_y.floor() as i64).max(0);
    let x1 = (max_x.ceil() as i64).min(img.width() as i64 - 1);
    let y1 = (max_y.ceil() as i64).min(img.height() as i64 - 1);

    for y in y0..=y1 {
        for x in x0..=x1 {
            if contains(vertices, x as f64 + 0.5, y as f64 + 0.5) {
                blend_pixel(img, x, y, color);
            }
        }
    }
}

fn contains(vertices: &[(f64, f64)], px: f64, py: f64) -> bool {
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (xi, yi) = vertices[i];
        let (xj, yj) = vertices[j];
        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    #[test]
    fn ignores_out_of_bounds_pixels() {
        let mut img = RgbaImage::new(4, 4);
        blend_pixel(&mut img, -1, 0, RED);
        blend_pixel(&mut img, 4, 4, RED);
        assert!(img.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn blends_translucent_colour() {
        let mut img = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255]));
        blend_pixel(&mut img, 0, 0, Rgba([255, 255, 255, 0x80]));
        let p = img.get_pixel(0, 0);
        assert_eq!(p[0], 128);
        assert_eq!(p[3], 255);
    }

    #[test]
    fn draws_horizontal_line() {
        let mut img = RgbaImage::new(10, 10);
        draw_line(&mut img, (1.0, 5.0), (8.0, 5.0), 1, RED);
        for x in 1..=8 {
            assert_eq!(*img.get_pixel(x, 5), RED);
        }
        assert_eq!(img.get_pixel(0, 5)[3], 0);
        assert_eq!(img.get_pixel(5, 4)[3], 0);
    }

    #[test]
    fn draws_visible_part_of_far_reaching_segment() {
        let mut img = RgbaImage::new(100, 56);
        draw_line(&mut img, (10.0, 10.0), (2_000_000.0, 10.0), 2, RED);
        for x in 10..100 {
            assert_eq!(*img.get_pixel(x, 10), RED, "x = {x}");
        }
        assert_eq!(img.get_pixel(5, 10)[3], 0);
    }

    #[test]
    fn crosses_frame_with_both_ends_outside() {
        let mut img = RgbaImage::new(20, 20);
        draw_line(&mut img, (-5e9, 10.0), (5e9, 10.0), 1, RED);
        assert!((0..20).all(|x| *img.get_pixel(x, 10) == RED));

        let mut img = RgbaImage::new(20, 20);
        draw_line(&mut img, (-1e7, -1e7), (-1e7, 1e7), 1, RED);
        assert!(img.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn clips_to_box() {
        let clipped = clip_segment((-10.0, 5.0), (30.0, 5.0), (0.0, 0.0), (20.0, 20.0));
        assert_eq!(clipped, Some(((0.0, 5.0), (20.0, 5.0))));
        assert_eq!(
            clip_segment((-10.0, -5.0), (30.0, -5.0), (0.0, 0.0), (20.0, 20.0)),
            None
        );
    }

    #[test]
    fn fills_concave_polygon() {
        let mut img = RgbaImage::new(20, 20);
        // Arrow head with a notch at the bottom.
        let kite = [(10.0, 2.0), (16.0, 18.0), (10.0, 12.0), (4.0, 18.0)];
        fill_polygon(&mut img, &kite, RED);
        assert_eq!(*img.get_pixel(10, 8), RED);
        // Inside the notch below the inner vertex.
        assert_eq!(img.get_pixel(10, 16)[3], 0);
        assert_eq!(img.get_pixel(1, 1)[3], 0);
    }
}
