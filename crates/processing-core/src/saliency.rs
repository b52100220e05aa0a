//! Saliency models.
//!
//! A model turns one tile into a same-sized single-channel field. The
//! worker pool calls models from several threads at once, so `estimate`
//! takes `&self`; strategies that cache per-call data hand out private
//! copies through [`SaliencyModel::new_instance`].

use std::fmt;

use sal360_common::{ModelConfig, ModelKind, Sal360Error, Sal360Result};
use sal360_sphere_model::{ImageBuffer, SaliencyField};

use crate::filters;

/// Role of a feature map produced by a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureKind {
    /// The final combined saliency.
    Saliency,
    /// Per-scale centre–surround response.
    Conspicuity,
}

impl FeatureKind {
    pub const COUNT: usize = 2;

    pub fn index(self) -> usize {
        match self {
            Self::Saliency => 0,
            Self::Conspicuity => 1,
        }
    }
}

/// Identifies one feature map: perceptual channel, scale level and role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureKey {
    pub channel: usize,
    pub level: usize,
    pub kind: FeatureKind,
}

impl FeatureKey {
    pub const SALIENCY: FeatureKey = FeatureKey {
        channel: 0,
        level: 0,
        kind: FeatureKind::Saliency,
    };
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            FeatureKind::Saliency => "saliency",
            FeatureKind::Conspicuity => "conspicuity",
        };
        write!(f, "{kind}_c{}_l{}", self.channel, self.level)
    }
}

/// Contract every saliency strategy implements.
pub trait SaliencyModel: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Saliency of `tile`, same width and height, one channel. With
    /// `normalize` the values are rescaled into `[0, 1]`.
    fn estimate(&self, tile: &ImageBuffer, normalize: bool) -> Sal360Result<SaliencyField>;

    /// Independent copy safe to use from another thread.
    fn new_instance(&self) -> Box<dyn SaliencyModel>;

    /// Intermediate feature maps. Defaults to the saliency field alone.
    fn features(&self, tile: &ImageBuffer) -> Sal360Result<Vec<(FeatureKey, SaliencyField)>> {
        Ok(vec![(FeatureKey::SALIENCY, self.estimate(tile, true)?)])
    }
}

/// Choose a strategy from configuration.
pub fn build_model(config: &ModelConfig) -> Box<dyn SaliencyModel> {
    match config.kind {
        ModelKind::Contrast => Box::new(ContrastModel::new(
            config.contrast_levels(),
            config.contrast_center_sigma(),
            config.contrast_surround_ratio(),
        )),
        ModelKind::Constant => Box::new(ConstantModel::new(config.constant_value())),
        ModelKind::Passthrough => Box::new(PassthroughModel),
    }
}

/// Largest blur radius any contrast scale uses, in pixels.
const CONTRAST_MAX_RADIUS: usize = 64;

/// Multi-scale centre–surround luminance contrast.
///
/// Level `l` compares a Gaussian of sigma `σc · 2^l` with one of
/// `σc · 2^l · ratio`; the absolute difference at each level is rescaled
/// to `[0, 1]` and the levels are averaged.
#[derive(Debug, Clone)]
pub struct ContrastModel {
    levels: usize,
    center_sigma: f64,
    surround_ratio: f64,
    /// (centre, surround) kernels per level.
    kernels: Vec<(Vec<f32>, Vec<f32>)>,
}

impl ContrastModel {
    pub fn new(levels: usize, center_sigma: f64, surround_ratio: f64) -> Self {
        let levels = levels.max(1);
        let kernels = (0..levels)
            .map(|l| {
                let sc = center_sigma * f64::from(1_u32 << l.min(16));
                (
                    filters::gaussian_kernel(sc, CONTRAST_MAX_RADIUS),
                    filters::gaussian_kernel(sc * surround_ratio, CONTRAST_MAX_RADIUS),
                )
            })
            .collect();
        Self {
            levels,
            center_sigma,
            surround_ratio,
            kernels,
        }
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    fn conspicuity(&self, tile: &ImageBuffer) -> Sal360Result<Vec<SaliencyField>> {
        let lum = tile.luminance()?;
        let maps = self
            .kernels
            .iter()
            .map(|(center, surround)| {
                let c = filters::blur(&lum, center, false);
                let s = filters::blur(&lum, surround, false);
                let mut diff = c;
                for (d, s) in diff.data_mut().iter_mut().zip(s.data()) {
                    *d = (*d - s).abs();
                }
                diff.normalize_min_max();
                diff
            })
            .collect();
        Ok(maps)
    }
}

impl SaliencyModel for ContrastModel {
    fn name(&self) -> &'static str {
        "contrast"
    }

    fn estimate(&self, tile: &ImageBuffer, normalize: bool) -> Sal360Result<SaliencyField> {
        let maps = self.conspicuity(tile)?;
        let mut out = ImageBuffer::new(tile.width(), tile.height(), 1)?;
        let inv = 1.0 / maps.len() as f32;
        for map in &maps {
            for (o, v) in out.data_mut().iter_mut().zip(map.data()) {
                *o += v * inv;
            }
        }
        if normalize {
            out.normalize_min_max();
        }
        Ok(out)
    }

    fn new_instance(&self) -> Box<dyn SaliencyModel> {
        Box::new(self.clone())
    }

    fn features(&self, tile: &ImageBuffer) -> Sal360Result<Vec<(FeatureKey, SaliencyField)>> {
        let mut features: Vec<(FeatureKey, SaliencyField)> = self
            .conspicuity(tile)?
            .into_iter()
            .enumerate()
            .map(|(level, map)| {
                let key = FeatureKey {
                    channel: 0,
                    level,
                    kind: FeatureKind::Conspicuity,
                };
                (key, map)
            })
            .collect();
        features.push((FeatureKey::SALIENCY, self.estimate(tile, true)?));
        Ok(features)
    }
}

impl fmt::Display for ContrastModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "contrast(levels={}, sigma={}, ratio={})",
            self.levels, self.center_sigma, self.surround_ratio
        )
    }
}

/// Same value at every pixel. Useful as a stub in tests.
#[derive(Debug, Clone, Copy)]
pub struct ConstantModel {
    value: f32,
}

impl ConstantModel {
    pub fn new(value: f32) -> Self {
        Self { value }
    }
}

impl SaliencyModel for ConstantModel {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn estimate(&self, tile: &ImageBuffer, normalize: bool) -> Sal360Result<SaliencyField> {
        if !self.value.is_finite() {
            return Err(Sal360Error::saliency("constant value is not finite"));
        }
        let mut field = ImageBuffer::filled(tile.width(), tile.height(), 1, self.value)?;
        if normalize {
            field.normalize_min_max();
        }
        Ok(field)
    }

    fn new_instance(&self) -> Box<dyn SaliencyModel> {
        Box::new(*self)
    }
}

/// Tiles that already hold saliency in their first channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughModel;

impl SaliencyModel for PassthroughModel {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn estimate(&self, tile: &ImageBuffer, normalize: bool) -> Sal360Result<SaliencyField> {
        let mut field = tile.channel(0)?;
        if normalize {
            field.normalize_min_max();
        }
        Ok(field)
    }

    fn new_instance(&self) -> Box<dyn SaliencyModel> {
        Box::new(*self)
    }
}
