//! Equatorial prior.
//!
//! Viewers of 360° content look near the horizon far more often than
//! elsewhere. The prior multiplies each row of a fused map by a latitude
//! weight built from three Gaussians: one on the equator and two weak
//! symmetric peaks beyond the poles whose tails lift the polar rows.

use sal360_common::PriorMode;
use sal360_sphere_model::{row_latitude_deg, SaliencyField};

/// Latitude weighting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquatorialPrior {
    pub mode: PriorMode,
    /// Sigma of the central lobe (degrees).
    pub center_sigma_deg: f64,
    /// Distance of the secondary peaks from the centre (degrees).
    pub secondary_offset_deg: f64,
    /// Sigma of the secondary lobes (degrees).
    pub secondary_sigma_deg: f64,
    /// Height of the secondary lobes relative to the central one.
    pub secondary_weight: f64,
    /// Largest shift adaptive mode may apply (degrees).
    pub max_shift_deg: f64,
}

impl Default for EquatorialPrior {
    fn default() -> Self {
        Self {
            mode: PriorMode::Fixed,
            center_sigma_deg: 20.0,
            secondary_offset_deg: 95.0,
            secondary_sigma_deg: 15.0,
            secondary_weight: 0.1,
            max_shift_deg: 8.0,
        }
    }
}

fn gaussian(d: f64, sigma: f64) -> f64 {
    (-d * d / (2.0 * sigma * sigma)).exp()
}

impl EquatorialPrior {
    pub fn new(mode: PriorMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    fn mixture(&self, d: f64) -> f64 {
        gaussian(d, self.center_sigma_deg)
            + self.secondary_weight
                * (gaussian(d - self.secondary_offset_deg, self.secondary_sigma_deg)
                    + gaussian(d + self.secondary_offset_deg, self.secondary_sigma_deg))
    }

    /// Weight at `latitude_deg` for a mixture centred on `center_deg`,
    /// scaled so the centre weighs exactly 1.
    pub fn weight(&self, latitude_deg: f64, center_deg: f64) -> f64 {
        self.mixture(latitude_deg - center_deg) / self.mixture(0.0)
    }

    /// Weight of row `row` in a map `height` rows tall.
    pub fn weight_at_row(&self, row: usize, height: usize, center_deg: f64) -> f64 {
        self.weight(row_latitude_deg(row, height), center_deg)
    }

    /// Latitude of the row holding the most saliency mass, clamped to
    /// `±max_shift_deg`. Zero for an empty or all-zero map.
    pub fn adaptive_center(&self, field: &SaliencyField) -> f64 {
        let (w, h) = (field.width(), field.height());
        let best = (0..h)
            .map(|y| {
                let mass: f64 = (0..w).map(|x| f64::from(field.get(x, y, 0).max(0.0))).sum();
                (y, mass)
            })
            .filter(|(_, mass)| *mass > 0.0)
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((row, _)) => {
                row_latitude_deg(row, h).clamp(-self.max_shift_deg, self.max_shift_deg)
            }
            None => 0.0,
        }
    }

    /// Centre used for `field` under the current mode.
    pub fn center_for(&self, field: &SaliencyField) -> f64 {
        match self.mode {
            PriorMode::Adaptive => self.adaptive_center(field),
            PriorMode::Off | PriorMode::Fixed => 0.0,
        }
    }

    /// Weighted copy of `field`. `Off` returns it unchanged.
    pub fn apply(&self, field: &SaliencyField) -> SaliencyField {
        if self.mode == PriorMode::Off || field.is_empty() {
            return field.clone();
        }
        let center = self.center_for(field);
        let (w, h, channels) = (field.width(), field.height(), field.channels());
        let mut out = field.clone();
        for y in 0..h {
            let weight = self.weight_at_row(y, h, center) as f32;
            for x in 0..w {
                for c in 0..channels {
                    out.set(x, y, c, field.get(x, y, c) * weight);
                }
            }
        }
        tracing::debug!(mode = %self.mode, center_deg = center, "applied equatorial prior");
        out
    }
}
