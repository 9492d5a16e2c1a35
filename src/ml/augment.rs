//! Random training-time augmentation: horizontal flip, small rotation and
//! small zoom, resampled with nearest-neighbour and edge-clamped fill.

use image::{imageops, RgbImage};
use rand::Rng;

use crate::config::AugmentationConfig;

/// One draw of augmentation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugmentParams {
    pub flip: bool,
    pub rotation_degrees: f32,
    pub zoom_x: f32,
    pub zoom_y: f32,
}

impl AugmentParams {
    pub fn identity() -> Self {
        Self {
            flip: false,
            rotation_degrees: 0.0,
            zoom_x: 1.0,
            zoom_y: 1.0,
        }
    }

    pub fn sample<R: Rng + ?Sized>(config: &AugmentationConfig, rng: &mut R) -> Self {
        let flip = config.horizontal_flip && rng.gen_bool(0.5);
        let rotation_degrees = if config.rotation_degrees > 0.0 {
            rng.gen_range(-config.rotation_degrees..=config.rotation_degrees)
        } else {
            0.0
        };
        let (zoom_x, zoom_y) = if config.zoom_range > 0.0 {
            let lo = 1.0 - config.zoom_range;
            let hi = 1.0 + config.zoom_range;
            (rng.gen_range(lo..=hi), rng.gen_range(lo..=hi))
        } else {
            (1.0, 1.0)
        };
        Self {
            flip,
            rotation_degrees,
            zoom_x,
            zoom_y,
        }
    }

    fn is_affine_identity(&self) -> bool {
        self.rotation_degrees == 0.0 && self.zoom_x == 1.0 && self.zoom_y == 1.0
    }
}

pub fn apply(img: &RgbImage, params: &AugmentParams) -> RgbImage {
    let flipped;
    let img = if params.flip {
        flipped = imageops::flip_horizontal(img);
        &flipped
    } else {
        img
    };

    if params.is_affine_identity() {
        return img.clone();
    }
    rotate_zoom(img, params.rotation_degrees, params.zoom_x, params.zoom_y)
}

pub fn augment<R: Rng + ?Sized>(img: &RgbImage, config: &AugmentationConfig, rng: &mut R) -> RgbImage {
    apply(img, &AugmentParams::sample(config, rng))
}

/// Rotate about the centre and zoom, mapping each output pixel back to its
/// source. A zoom above 1 shows a larger area (objects shrink).
fn rotate_zoom(img: &RgbImage, degrees: f32, zoom_x: f32, zoom_y: f32) -> RgbImage {
    let (width, height) = img.dimensions();
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    let (sin, cos) = degrees.to_radians().sin_cos();
    let max_x = width as i64 - 1;
    let max_y = height as i64 - 1;

    RgbImage::from_fn(width, height, |x, y| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let sx = (cos * dx + sin * dy) * zoom_x + cx;
        let sy = (-sin * dx + cos * dy) * zoom_y + cy;
        let sx = (sx.round() as i64).clamp(0, max_x) as u32;
        let sy = (sy.round() as i64).clamp(0, max_y) as u32;
        *img.get_pixel(sx, sy)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn gradient(size: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| Rgb([(x * 7) as u8, (y * 5) as u8, 9]))
    }

    #[test]
    fn test_identity_keeps_image() {
        let img = gradient(16);
        assert_eq!(apply(&img, &AugmentParams::identity()), img);
    }

    #[test]
    fn test_flip_mirrors_columns() {
        let img = gradient(16);
        let params = AugmentParams {
            flip: true,
            ..AugmentParams::identity()
        };
        let out = apply(&img, &params);
        assert_eq!(out.get_pixel(0, 3), img.get_pixel(15, 3));
        assert_eq!(apply(&out, &params), img);
    }

    #[test]
    fn test_rotation_keeps_centre_and_dimensions() {
        let img = gradient(17);
        let params = AugmentParams {
            rotation_degrees: 10.0,
            ..AugmentParams::identity()
        };
        let out = apply(&img, &params);
        assert_eq!(out.dimensions(), img.dimensions());
        assert_eq!(out.get_pixel(8, 8), img.get_pixel(8, 8));
    }

    #[test]
    fn test_sampled_params_within_configured_ranges() {
        let config = AugmentationConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let p = AugmentParams::sample(&config, &mut rng);
            assert!(p.rotation_degrees.abs() <= 10.0);
            assert!((0.9..=1.1).contains(&p.zoom_x));
            assert!((0.9..=1.1).contains(&p.zoom_y));
        }
    }

    #[test]
    fn test_disabled_augmentation_is_identity() {
        let config = AugmentationConfig {
            horizontal_flip: false,
            rotation_degrees: 0.0,
            zoom_range: 0.0,
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(AugmentParams::sample(&config, &mut rng), AugmentParams::identity());
    }
}
