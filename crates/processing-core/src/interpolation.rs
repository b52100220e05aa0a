//! Interpolation kernels.
//!
//! Coordinates are continuous pixel positions where integer values address
//! pixel centres. Each kernel is a separable filter evaluated over a small
//! tap window; the boundary mode decides what happens to taps that fall
//! outside the buffer.

use sal360_common::KernelKind;
use sal360_sphere_model::ImageBuffer;

/// What out-of-range taps read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Wrap columns, clamp rows. Used for equirectangular sources where the
    /// left and right edges meet.
    WrapX,
    /// Clamp both axes to the nearest valid sample.
    Clamp,
    /// Out-of-range taps contribute zero.
    Zero,
}

/// Catmull–Rom parameter.
const CUBIC_A: f64 = -0.5;

#[derive(Debug, Clone, Copy)]
enum AxisMode {
    Wrap,
    Clamp,
    Zero,
}

/// Up to four taps along one axis.
#[derive(Debug, Clone, Copy)]
struct Taps {
    index: [Option<usize>; 4],
    weight: [f32; 4],
    len: usize,
}

impl Taps {
    const EMPTY: Taps = Taps {
        index: [None; 4],
        weight: [0.0; 4],
        len: 0,
    };

    fn push(&mut self, index: Option<usize>, weight: f64) {
        self.index[self.len] = index;
        self.weight[self.len] = weight as f32;
        self.len += 1;
    }
}

fn resolve(i: i64, size: usize, mode: AxisMode) -> Option<usize> {
    let n = size as i64;
    match mode {
        AxisMode::Wrap => Some(i.rem_euclid(n) as usize),
        AxisMode::Clamp => Some(i.clamp(0, n - 1) as usize),
        AxisMode::Zero => (0..n).contains(&i).then_some(i as usize),
    }
}

fn cubic_weight(t: f64) -> f64 {
    let t = t.abs();
    if t <= 1.0 {
        (CUBIC_A + 2.0) * t.powi(3) - (CUBIC_A + 3.0) * t.powi(2) + 1.0
    } else if t < 2.0 {
        CUBIC_A * t.powi(3) - 5.0 * CUBIC_A * t.powi(2) + 8.0 * CUBIC_A * t - 4.0 * CUBIC_A
    } else {
        0.0
    }
}

fn axis_taps(kind: KernelKind, coord: f64, size: usize, mode: AxisMode) -> Taps {
    let mut taps = Taps::EMPTY;
    if !coord.is_finite() || size == 0 {
        return taps;
    }

    match kind {
        KernelKind::Nearest => {
            taps.push(resolve(coord.round() as i64, size, mode), 1.0);
        }
        KernelKind::Bilinear => {
            let base = coord.floor();
            let frac = coord - base;
            let i = base as i64;
            taps.push(resolve(i, size, mode), 1.0 - frac);
            taps.push(resolve(i + 1, size, mode), frac);
        }
        KernelKind::Bicubic => {
            let base = coord.floor();
            let frac = coord - base;
            let i = base as i64;
            for k in -1..=2_i64 {
                taps.push(resolve(i + k, size, mode), cubic_weight(frac - k as f64));
            }
        }
    }
    taps
}

/// A kernel paired with a boundary mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sampler {
    pub kind: KernelKind,
    pub boundary: Boundary,
}

impl Sampler {
    pub fn new(kind: KernelKind, boundary: Boundary) -> Self {
        Self { kind, boundary }
    }

    fn modes(&self) -> (AxisMode, AxisMode) {
        match self.boundary {
            Boundary::WrapX => (AxisMode::Wrap, AxisMode::Clamp),
            Boundary::Clamp => (AxisMode::Clamp, AxisMode::Clamp),
            Boundary::Zero => (AxisMode::Zero, AxisMode::Zero),
        }
    }

    /// Sample every channel at `(x, y)` into `out`, which must hold at least
    /// `image.channels()` values.
    pub fn sample_into(&self, image: &ImageBuffer, x: f64, y: f64, out: &mut [f32]) {
        let channels = image.channels();
        out[..channels].iter_mut().for_each(|v| *v = 0.0);

        let (x_mode, y_mode) = self.modes();
        let tx = axis_taps(self.kind, x, image.width(), x_mode);
        let ty = axis_taps(self.kind, y, image.height(), y_mode);

        for j in 0..ty.len {
            let Some(row) = ty.index[j] else { continue };
            for i in 0..tx.len {
                let Some(col) = tx.index[i] else { continue };
                let w = tx.weight[i] * ty.weight[j];
                if w == 0.0 {
                    continue;
                }
                for (acc, v) in out.iter_mut().zip(image.pixel(col, row)) {
                    *acc += w * v;
                }
            }
        }
    }

    /// Sample a single channel at `(x, y)`.
    pub fn sample(&self, image: &ImageBuffer, x: f64, y: f64, channel: usize) -> f32 {
        let (x_mode, y_mode) = self.modes();
        let tx = axis_taps(self.kind, x, image.width(), x_mode);
        let ty = axis_taps(self.kind, y, image.height(), y_mode);

        let mut acc = 0.0_f32;
        for j in 0..ty.len {
            let Some(row) = ty.index[j] else { continue };
            for i in 0..tx.len {
                let Some(col) = tx.index[i] else { continue };
                acc += tx.weight[i] * ty.weight[j] * image.get(col, row, channel);
            }
        }
        acc
    }
}

/// Sample one channel of `image` at continuous `(x, y)`.
pub fn sample(
    kind: KernelKind,
    image: &ImageBuffer,
    x: f64,
    y: f64,
    channel: usize,
    boundary: Boundary,
) -> f32 {
    Sampler::new(kind, boundary).sample(image, x, y, channel)
}
