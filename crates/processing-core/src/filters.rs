//! Separable Gaussian filtering on single-channel fields.

use sal360_sphere_model::ImageBuffer;

/// Normalized 1-D Gaussian taps, radius `min(ceil(3σ), max_radius)`.
///
/// Returns `[1.0]` for a non-positive or non-finite sigma.
pub fn gaussian_kernel(sigma: f64, max_radius: usize) -> Vec<f32> {
    if !(sigma.is_finite() && sigma > 0.0) {
        return vec![1.0];
    }
    let radius = ((3.0 * sigma).ceil() as usize).min(max_radius);
    let denom = 2.0 * sigma * sigma;
    let raw: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let d = i as f64 - radius as f64;
            (-d * d / denom).exp()
        })
        .collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|w| (w / total) as f32).collect()
}

/// Blur channel 0 of `field` with `kernel` along both axes.
///
/// With `wrap_x` the horizontal pass wraps around the seam (equirectangular
/// maps); otherwise edges clamp. The vertical pass always clamps.
pub fn blur(field: &ImageBuffer, kernel: &[f32], wrap_x: bool) -> ImageBuffer {
    if kernel.len() <= 1 || field.is_empty() {
        return field.clone();
    }
    let (w, h) = (field.width() as i64, field.height() as i64);
    let radius = (kernel.len() / 2) as i64;

    let mut horizontal = field.clone();
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0_f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = x + k as i64 - radius;
                let sx = if wrap_x {
                    sx.rem_euclid(w)
                } else {
                    sx.clamp(0, w - 1)
                };
                acc += weight * field.get(sx as usize, y as usize, 0);
            }
            horizontal.set(x as usize, y as usize, 0, acc);
        }
    }

    let mut out = horizontal.clone();
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0_f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = (y + k as i64 - radius).clamp(0, h - 1);
                acc += weight * horizontal.get(x as usize, sy as usize, 0);
            }
            out.set(x as usize, y as usize, 0, acc);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_is_normalized_and_bounded() {
        let k = gaussian_kernel(4.0, 5);
        assert_eq!(k.len(), 11);
        let total: f32 = k.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(k[5] > k[0]);
    }

    #[test]
    fn test_zero_sigma_is_identity() {
        assert_eq!(gaussian_kernel(0.0, 10), vec![1.0]);
        let field = ImageBuffer::from_fn(4, 4, 1, |x, y, _| (x * y) as f32).unwrap();
        assert_eq!(blur(&field, &[1.0], true), field);
    }

    #[test]
    fn test_blur_preserves_constant_field() {
        let field = ImageBuffer::filled(9, 5, 1, 0.25).unwrap();
        let out = blur(&field, &gaussian_kernel(1.5, 10), true);
        assert!(out.data().iter().all(|v| (v - 0.25).abs() < 1e-5));
    }

    #[test]
    fn test_wrap_spreads_across_seam() {
        let mut field = ImageBuffer::new(8, 3, 1).unwrap();
        field.set(0, 1, 0, 1.0);
        let k = gaussian_kernel(1.0, 3);
        let wrapped = blur(&field, &k, true);
        let clamped = blur(&field, &k, false);
        assert!(wrapped.get(7, 1, 0) > 0.0);
        assert_eq!(clamped.get(7, 1, 0), 0.0);
    }
}
