//! Interleaved floating-point pixel buffers.
//!
//! Panoramas, rectilinear tiles and saliency fields all share this
//! container. Saliency fields are single-channel buffers.

use crate::error::ModelError;

/// Row-major interleaved `f32` image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBuffer {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<f32>,
}

/// Single-channel buffer holding per-pixel attention values.
pub type SaliencyField = ImageBuffer;

impl ImageBuffer {
    /// Allocate a zero-filled buffer. A zero dimension, or a size the
    /// allocator refuses, is an error.
    pub fn new(width: usize, height: usize, channels: usize) -> Result<Self, ModelError> {
        Self::filled(width, height, channels, 0.0)
    }

    /// Allocate a buffer with every sample set to `value`.
    pub fn filled(
        width: usize,
        height: usize,
        channels: usize,
        value: f32,
    ) -> Result<Self, ModelError> {
        let len = checked_len(width, height, channels)?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| ModelError::Allocation {
                width,
                height,
                channels,
            })?;
        data.resize(len, value);
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Wrap existing samples.
    pub fn from_raw(
        width: usize,
        height: usize,
        channels: usize,
        data: Vec<f32>,
    ) -> Result<Self, ModelError> {
        let len = checked_len(width, height, channels)?;
        if data.len() != len {
            return Err(ModelError::LengthMismatch {
                width,
                height,
                channels,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Build a buffer by evaluating `f(x, y, channel)` for every sample.
    pub fn from_fn(
        width: usize,
        height: usize,
        channels: usize,
        mut f: impl FnMut(usize, usize, usize) -> f32,
    ) -> Result<Self, ModelError> {
        let mut image = Self::new(width, height, channels)?;
        for y in 0..height {
            for x in 0..width {
                for c in 0..channels {
                    let idx = (y * width + x) * channels + c;
                    image.data[idx] = f(x, y, c);
                }
            }
        }
        Ok(image)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// The placeholder returned by failed runs. It holds no samples and is
    /// the only buffer allowed to have zero dimensions.
    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            channels: 1,
            data: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of pixels (not samples).
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_raw(self) -> Vec<f32> {
        self.data
    }

    pub fn same_shape(&self, other: &ImageBuffer) -> bool {
        self.width == other.width && self.height == other.height && self.channels == other.channels
    }

    /// Sample at integer coordinates. Panics when out of range.
    #[inline]
    pub fn get(&self, x: usize, y: usize, channel: usize) -> f32 {
        self.data[(y * self.width + x) * self.channels + channel]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, channel: usize, value: f32) {
        self.data[(y * self.width + x) * self.channels + channel] = value;
    }

    /// Sample at integer coordinates, `None` when out of range.
    pub fn try_get(&self, x: usize, y: usize, channel: usize) -> Option<f32> {
        if x >= self.width || y >= self.height || channel >= self.channels {
            return None;
        }
        Some(self.get(x, y, channel))
    }

    /// All channels of one pixel.
    pub fn pixel(&self, x: usize, y: usize) -> &[f32] {
        let start = (y * self.width + x) * self.channels;
        &self.data[start..start + self.channels]
    }

    /// Extract one channel as a single-channel buffer.
    pub fn channel(&self, channel: usize) -> Result<ImageBuffer, ModelError> {
        let data = self
            .data
            .chunks_exact(self.channels)
            .map(|px| px.get(channel).copied().unwrap_or(0.0))
            .collect();
        Self::from_raw(self.width, self.height, 1, data)
    }

    /// Mean over channels, as a single-channel buffer.
    pub fn luminance(&self) -> Result<ImageBuffer, ModelError> {
        let inv = 1.0 / self.channels as f32;
        let data = self
            .data
            .chunks_exact(self.channels)
            .map(|px| px.iter().sum::<f32>() * inv)
            .collect();
        Self::from_raw(self.width, self.height, 1, data)
    }

    /// Smallest and largest finite samples, `None` when every sample is non-finite.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().map(|v| *v as f64).sum()
    }

    /// Rescale samples into `[0, 1]`.
    ///
    /// A flat buffer (range below `f32::EPSILON`) has no contrast to stretch;
    /// its samples are clamped into `[0, 1]` instead.
    pub fn normalize_min_max(&mut self) {
        let Some((lo, hi)) = self.min_max() else {
            self.data.iter_mut().for_each(|v| *v = 0.0);
            return;
        };
        let range = hi - lo;
        if range < f32::EPSILON {
            for v in &mut self.data {
                *v = if v.is_finite() { (*v).clamp(0.0, 1.0) } else { 0.0 };
            }
            return;
        }
        let inv = 1.0 / range;
        for v in &mut self.data {
            *v = if v.is_finite() { (*v - lo) * inv } else { 0.0 };
        }
    }

    /// Apply `f` to every sample.
    pub fn map_in_place(&mut self, f: impl Fn(f32) -> f32) {
        self.data.iter_mut().for_each(|v| *v = f(*v));
    }
}

fn checked_len(width: usize, height: usize, channels: usize) -> Result<usize, ModelError> {
    let alloc_err = || ModelError::Allocation {
        width,
        height,
        channels,
    };
    if width == 0 || height == 0 || channels == 0 {
        return Err(alloc_err());
    }
    width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(channels))
        .ok_or_else(alloc_err)
}
