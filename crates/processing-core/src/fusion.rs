//! Back-projection fuser.
//!
//! # Algorithm
//!
//! 1. **Size** the accumulator: cap the larger side at `max_dimension`,
//!    keep the aspect ratio, round both sides down to a multiple of 4.
//! 2. **Back-project** each tile's field (in parallel, one private
//!    [`TileContribution`] per tile) as a (value, presence) payload.
//!    Presence is sampled with zero boundary taps; a destination pixel only
//!    counts when presence reaches [`PRESENCE_THRESHOLD`].
//! 3. **Accumulate** contributions serially into (sum, count) buffers.
//!    Overlapping tiles hit the same cells, so this step stays
//!    single-threaded.
//! 4. **Finalize**: `sum / count`; cells with no contribution keep their
//!    prior value.

use std::collections::BTreeMap;

use sal360_common::{KernelKind, Sal360Error, Sal360Result};
use sal360_sphere_model::{ImageBuffer, Orientation, SaliencyField};

use crate::filters;
use crate::interpolation::{Boundary, Sampler};
use crate::projector;
use crate::saliency::{FeatureKey, FeatureKind};

/// Minimum resampled presence for a destination pixel to count.
pub const PRESENCE_THRESHOLD: f32 = 0.999;

/// Accumulator dimensions are multiples of this.
pub const SIZE_ALIGNMENT: usize = 4;

/// Accumulator size for a `source_width × source_height` panorama.
pub fn accumulator_size(
    source_width: usize,
    source_height: usize,
    max_dimension: usize,
) -> (usize, usize) {
    let largest = source_width.max(source_height).max(1) as f64;
    let scale = (max_dimension as f64 / largest).min(1.0);
    let align = |v: usize| {
        let scaled = (v as f64 * scale).floor() as usize;
        (scaled / SIZE_ALIGNMENT * SIZE_ALIGNMENT).max(SIZE_ALIGNMENT)
    };
    (align(source_width), align(source_height))
}

/// One tile's private back-projection: `(flat destination index, value)`
/// for every destination pixel the tile covers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileContribution {
    pub hits: Vec<(usize, f32)>,
}

impl TileContribution {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Back-project channel 0 of `field` onto a `dest_width × dest_height` grid.
pub fn back_project(
    field: &SaliencyField,
    orientation: &Orientation,
    dest_width: usize,
    dest_height: usize,
    kernel: KernelKind,
) -> Sal360Result<TileContribution> {
    if field.is_empty() || dest_width == 0 || dest_height == 0 {
        return Err(Sal360Error::allocation("cannot back-project an empty field"));
    }

    let payload = ImageBuffer::from_fn(field.width(), field.height(), 2, |x, y, c| {
        if c == 0 {
            field.get(x, y, 0)
        } else {
            1.0
        }
    })?;
    let sampler = Sampler::new(kernel, Boundary::Zero);
    let mut px = [0.0_f32; 2];
    let mut hits = Vec::new();

    projector::for_each_covered_pixel(
        payload.width(),
        payload.height(),
        orientation,
        dest_width,
        dest_height,
        |dx, dy, tx, ty| {
            sampler.sample_into(&payload, tx, ty, &mut px);
            let [value, presence] = px;
            if presence >= PRESENCE_THRESHOLD {
                let v = value / presence;
                if v.is_finite() {
                    hits.push((dy * dest_width + dx, v));
                }
            }
        },
    );

    Ok(TileContribution { hits })
}

/// Running (sum, count) reduction over tile contributions.
#[derive(Debug, Clone)]
pub struct FusionAccumulator {
    width: usize,
    height: usize,
    prior: Vec<f32>,
    sum: Vec<f64>,
    count: Vec<u32>,
}

impl FusionAccumulator {
    /// Empty accumulator whose uncovered cells finalize to 0.
    pub fn new(width: usize, height: usize) -> Sal360Result<Self> {
        Self::with_prior(ImageBuffer::new(width, height, 1)?)
    }

    /// Empty accumulator whose uncovered cells keep `prior`'s channel 0.
    pub fn with_prior(prior: ImageBuffer) -> Sal360Result<Self> {
        let (width, height) = (prior.width(), prior.height());
        let prior = prior.channel(0)?.into_raw();
        let cells = width * height;
        Ok(Self {
            width,
            height,
            prior,
            sum: vec![0.0; cells],
            count: vec![0; cells],
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Add one tile. Indices outside the grid are ignored.
    pub fn add(&mut self, contribution: &TileContribution) {
        for &(index, value) in &contribution.hits {
            if let (Some(sum), Some(count)) = (self.sum.get_mut(index), self.count.get_mut(index))
            {
                *sum += f64::from(value);
                *count += 1;
            }
        }
    }

    pub fn counts(&self) -> &[u32] {
        &self.count
    }

    pub fn sums(&self) -> &[f64] {
        &self.sum
    }

    /// Cells no tile reached.
    pub fn uncovered(&self) -> usize {
        self.count.iter().filter(|c| **c == 0).count()
    }

    /// Average every covered cell; uncovered cells keep the prior.
    pub fn finalize(&self) -> Sal360Result<SaliencyField> {
        let data = self
            .sum
            .iter()
            .zip(&self.count)
            .zip(&self.prior)
            .map(|((sum, count), prior)| {
                if *count == 0 {
                    *prior
                } else {
                    (*sum / f64::from(*count)) as f32
                }
            })
            .collect();
        Ok(ImageBuffer::from_raw(self.width, self.height, 1, data)?)
    }
}

/// Accumulate `contributions` in order and finalize.
pub fn fuse(
    contributions: &[TileContribution],
    width: usize,
    height: usize,
) -> Sal360Result<SaliencyField> {
    let mut acc = FusionAccumulator::new(width, height)?;
    for c in contributions {
        acc.add(c);
    }
    acc.finalize()
}

/// Optional blur (wrapping horizontally) followed by optional min–max
/// rescale. A flat field is clamped into `[0, 1]` rather than divided by
/// a zero range.
pub fn post_process(
    field: &SaliencyField,
    blur_sigma: f64,
    blur_max_radius: usize,
    normalize: bool,
) -> SaliencyField {
    let kernel = filters::gaussian_kernel(blur_sigma, blur_max_radius);
    let mut out = filters::blur(field, &kernel, true);
    if normalize {
        out.normalize_min_max();
    }
    out
}

/// Which `[channel][level][kind]` feature maps were already fused.
#[derive(Debug, Clone)]
pub struct DoneTable {
    channels: usize,
    levels: usize,
    done: Vec<bool>,
}

impl DoneTable {
    pub fn new(channels: usize, levels: usize) -> Self {
        Self {
            channels,
            levels,
            done: vec![false; channels * levels * FeatureKind::COUNT],
        }
    }

    fn slot(&self, key: &FeatureKey) -> Option<usize> {
        (key.channel < self.channels && key.level < self.levels).then(|| {
            (key.channel * self.levels + key.level) * FeatureKind::COUNT + key.kind.index()
        })
    }

    pub fn is_done(&self, key: &FeatureKey) -> bool {
        self.slot(key).is_some_and(|i| self.done[i])
    }

    /// Mark `key` as fused. Returns `false` if it already was or if the key
    /// is outside the table.
    pub fn mark(&mut self, key: &FeatureKey) -> bool {
        match self.slot(key) {
            Some(i) if !self.done[i] => {
                self.done[i] = true;
                true
            }
            _ => false,
        }
    }
}

/// Per-tile feature maps paired with the tile's orientation.
pub type TileFeatures = (Orientation, Vec<(FeatureKey, SaliencyField)>);

/// Fuse every distinct feature key once across all tiles.
pub fn fuse_features(
    tiles: &[TileFeatures],
    dest_width: usize,
    dest_height: usize,
    kernel: KernelKind,
) -> Sal360Result<BTreeMap<FeatureKey, SaliencyField>> {
    let keys = tiles.iter().flat_map(|(_, features)| features.iter().map(|(k, _)| *k));
    let channels = keys.clone().map(|k| k.channel + 1).max().unwrap_or(0);
    let levels = keys.clone().map(|k| k.level + 1).max().unwrap_or(0);
    let mut done = DoneTable::new(channels, levels);
    let mut fused = BTreeMap::new();

    for key in keys {
        if !done.mark(&key) {
            continue;
        }
        let mut acc = FusionAccumulator::new(dest_width, dest_height)?;
        for (orientation, features) in tiles {
            for (_, map) in features.iter().filter(|(k, _)| *k == key) {
                acc.add(&back_project(map, orientation, dest_width, dest_height, kernel)?);
            }
        }
        tracing::debug!(feature = %key, uncovered = acc.uncovered(), "fused feature map");
        fused.insert(key, acc.finalize()?);
    }
    Ok(fused)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forward() -> Orientation {
        Orientation::forward(90.0).unwrap()
    }

    #[test]
    fn test_accumulator_size_caps_and_aligns() {
        assert_eq!(accumulator_size(4000, 2000, 2048), (2048, 1024));
        assert_eq!(accumulator_size(1002, 501, 2048), (1000, 500));
        assert_eq!(accumulator_size(64, 32, 2048), (64, 32));
        assert_eq!(accumulator_size(3, 2, 2048), (4, 4));
    }

    #[test]
    fn test_overlaps_average() {
        let mut acc = FusionAccumulator::new(4, 4).unwrap();
        acc.add(&TileContribution {
            hits: vec![(0, 1.0), (5, 2.0)],
        });
        acc.add(&TileContribution {
            hits: vec![(0, 3.0), (99, 7.0)],
        });
        let field = acc.finalize().unwrap();
        assert_eq!(field.get(0, 0, 0), 2.0);
        assert_eq!(field.get(1, 1, 0), 2.0);
        assert_eq!(acc.counts()[0], 2);
        assert_eq!(acc.uncovered(), 14);
    }

    #[test]
    fn test_uncovered_cells_keep_prior() {
        let prior = ImageBuffer::filled(4, 4, 1, 0.5).unwrap();
        let mut acc = FusionAccumulator::with_prior(prior).unwrap();
        acc.add(&TileContribution {
            hits: vec![(3, 0.0)],
        });
        let field = acc.finalize().unwrap();
        assert_eq!(field.get(3, 0, 0), 0.0);
        assert_eq!(field.get(2, 0, 0), 0.5);
    }

    #[test]
    fn test_back_projection_respects_presence_guard() {
        let field = ImageBuffer::filled(16, 16, 1, 0.75).unwrap();
        let c = back_project(&field, &forward(), 64, 32, KernelKind::Bilinear).unwrap();
        assert!(!c.is_empty());
        assert!(c.hits.iter().all(|(_, v)| (v - 0.75).abs() < 1e-5));
        // nothing lands behind the camera
        assert!(c.hits.iter().all(|(i, _)| {
            let x = i % 64;
            (8..56).contains(&x)
        }));
    }

    #[test]
    fn test_failed_tile_contributes_nothing() {
        let field = ImageBuffer::filled(8, 8, 1, 1.0).unwrap();
        let ok = back_project(&field, &forward(), 32, 16, KernelKind::Nearest).unwrap();
        let failed = TileContribution::default();
        let a = fuse(&[ok.clone()], 32, 16).unwrap();
        let b = fuse(&[ok, failed], 32, 16).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_post_process_handles_flat_field() {
        let field = ImageBuffer::filled(8, 4, 1, 1.0).unwrap();
        let out = post_process(&field, 1.0, 4, true);
        assert!(out.data().iter().all(|v| v.is_finite() && (*v - 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_done_table_marks_once() {
        let mut done = DoneTable::new(1, 2);
        let key = FeatureKey {
            channel: 0,
            level: 1,
            kind: FeatureKind::Conspicuity,
        };
        assert!(!done.is_done(&key));
        assert!(done.mark(&key));
        assert!(!done.mark(&key));
        assert!(done.is_done(&key));
        assert!(!done.is_done(&FeatureKey::SALIENCY));
    }

    #[test]
    fn test_fuse_features_deduplicates_keys() {
        let map = ImageBuffer::filled(8, 8, 1, 0.5).unwrap();
        let level0 = FeatureKey {
            channel: 0,
            level: 0,
            kind: FeatureKind::Conspicuity,
        };
        let tiles: Vec<TileFeatures> = vec![
            (forward(), vec![(level0, map.clone()), (FeatureKey::SALIENCY, map.clone())]),
            (
                Orientation::new(180.0, 0.0, 0.0, 90.0).unwrap(),
                vec![(level0, map.clone()), (FeatureKey::SALIENCY, map)],
            ),
        ];
        let fused = fuse_features(&tiles, 32, 16, KernelKind::Bilinear).unwrap();
        assert_eq!(fused.len(), 2);
        let sal = &fused[&FeatureKey::SALIENCY];
        assert!((sal.get(16, 8, 0) - 0.5).abs() < 1e-5);
        assert!((sal.get(0, 8, 0) - 0.5).abs() < 1e-5);
    }
}
