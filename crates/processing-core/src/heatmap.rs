//! Ground-truth attention heatmaps from recorded head traces.
//!
//! Each head sample contributes its view centre (yaw → longitude,
//! pitch → latitude) to an equirectangular grid, optionally spread by a
//! Gaussian over great-circle distance.

use sal360_common::Sal360Result;
use sal360_sphere_model::{
    equirect_to_sphere, frame_orientations, HeadSample, HeadTrace, ImageBuffer, SaliencyField,
    SpherePoint,
};

/// Grid configuration for heatmap generation.
#[derive(Debug, Clone, Copy)]
pub struct HeatmapConfig {
    pub cols: usize,
    pub rows: usize,
    /// Gaussian spread around each view centre (degrees). 0 marks only the
    /// cell under the centre.
    pub spread_deg: f64,
    /// Resample traces at this rate with zero-order hold. `None` uses the
    /// recorded samples as they are.
    pub fps: Option<f64>,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            cols: 64,
            rows: 32,
            spread_deg: 0.0,
            fps: None,
        }
    }
}

/// An equirectangular density grid.
#[derive(Debug, Clone)]
pub struct FixationHeatmap {
    pub cols: usize,
    pub rows: usize,
    pub cells: Vec<f64>,
    pub max_density: f64,
    pub samples: usize,
}

impl FixationHeatmap {
    pub fn from_traces(traces: &[HeadTrace], config: HeatmapConfig) -> Self {
        let samples: Vec<HeadSample> = match config.fps {
            Some(fps) if fps > 0.0 => {
                let duration = traces
                    .iter()
                    .map(HeadTrace::duration_secs)
                    .fold(0.0_f64, f64::max);
                let frames = (duration * fps).floor() as usize + 1;
                frame_orientations(traces, fps, frames)
                    .into_iter()
                    .flatten()
                    .collect()
            }
            _ => traces.iter().flat_map(|t| t.samples.iter().copied()).collect(),
        };
        Self::from_samples(&samples, config)
    }

    pub fn from_samples(samples: &[HeadSample], config: HeatmapConfig) -> Self {
        let cols = config.cols.max(1);
        let rows = config.rows.max(1);
        let mut cells = vec![0.0; cols * rows];

        let centres: Vec<SpherePoint> = samples
            .iter()
            .filter(|s| s.yaw.is_finite() && s.pitch.is_finite())
            .map(|s| SpherePoint::new(s.yaw.to_radians(), s.pitch.to_radians()))
            .collect();

        if config.spread_deg <= 0.0 {
            for p in &centres {
                let cx = ((p.lon + std::f64::consts::PI) / std::f64::consts::TAU * cols as f64)
                    .floor() as usize;
                let cy = ((std::f64::consts::FRAC_PI_2 - p.lat) / std::f64::consts::PI
                    * rows as f64)
                    .floor() as usize;
                cells[cy.min(rows - 1) * cols + cx.min(cols - 1)] += 1.0;
            }
        } else {
            let sigma = config.spread_deg.to_radians();
            let denom = 2.0 * sigma * sigma;
            for (idx, cell) in cells.iter_mut().enumerate() {
                let (x, y) = ((idx % cols) as f64, (idx / cols) as f64);
                let centre = equirect_to_sphere(x, y, cols, rows);
                *cell = centres
                    .iter()
                    .map(|p| {
                        let d = centre.great_circle_distance(p);
                        (-d * d / denom).exp()
                    })
                    .sum();
            }
        }

        let max_density = cells.iter().copied().fold(0.0_f64, f64::max);
        Self {
            cols,
            rows,
            cells,
            max_density,
            samples: centres.len(),
        }
    }

    pub fn cell(&self, col: usize, row: usize) -> Option<f64> {
        if col >= self.cols || row >= self.rows {
            return None;
        }
        Some(self.cells[row * self.cols + col])
    }

    pub fn normalized_cell(&self, col: usize, row: usize) -> Option<f64> {
        let value = self.cell(col, row)?;
        if self.max_density <= 0.0 {
            return Some(0.0);
        }
        Some(value / self.max_density)
    }

    /// The grid as a single-channel field scaled into `[0, 1]`.
    pub fn to_field(&self) -> Sal360Result<SaliencyField> {
        let scale = if self.max_density > 0.0 {
            1.0 / self.max_density
        } else {
            0.0
        };
        let data = self.cells.iter().map(|v| (v * scale) as f32).collect();
        Ok(ImageBuffer::from_raw(self.cols, self.rows, 1, data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(yaw: f64, pitch: f64, second: f64) -> HeadSample {
        HeadSample {
            pitch,
            yaw,
            roll: 0.0,
            second,
        }
    }

    fn trace(samples: Vec<HeadSample>) -> HeadTrace {
        HeadTrace {
            content_id: "P1".to_string(),
            device_id: "hmd".to_string(),
            samples,
        }
    }

    #[test]
    fn test_heatmap_tracks_hotspot() {
        let traces = vec![trace(vec![
            sample(0.0, 0.0, 0.0),
            sample(1.0, 1.0, 0.1),
            sample(2.0, -1.0, 0.2),
            sample(-120.0, 60.0, 0.3),
        ])];
        let heatmap = FixationHeatmap::from_traces(
            &traces,
            HeatmapConfig {
                cols: 36,
                rows: 18,
                ..Default::default()
            },
        );

        // yaw 0 pitch 0 lands in column 18, row 9 (or just above it)
        let centre = heatmap.cell(18, 9).unwrap() + heatmap.cell(18, 8).unwrap();
        let elsewhere = heatmap.cell(6, 3).unwrap();
        assert!(centre >= 3.0);
        assert_eq!(elsewhere, 1.0);
        assert_eq!(heatmap.samples, 4);
    }

    #[test]
    fn test_heatmap_empty_traces_is_zeroed() {
        let heatmap = FixationHeatmap::from_traces(&[], HeatmapConfig::default());
        assert_eq!(heatmap.max_density, 0.0);
        assert!(heatmap.cells.iter().all(|v| *v == 0.0));
        assert_eq!(heatmap.normalized_cell(0, 0), Some(0.0));
    }

    #[test]
    fn test_heatmap_resampling_weights_by_dwell() {
        // looks at yaw 0 for 3 seconds, then yaw 180 for an instant
        let traces = vec![trace(vec![sample(0.0, 0.0, 0.0), sample(179.0, 0.0, 3.0)])];
        let config = HeatmapConfig {
            cols: 8,
            rows: 4,
            fps: Some(2.0),
            ..Default::default()
        };
        let heatmap = FixationHeatmap::from_traces(&traces, config);
        // frames at 0, 0.5, ..., 3.0 → six at yaw 0, one at yaw 179
        assert_eq!(heatmap.samples, 7);
        assert_eq!(heatmap.max_density, 6.0);
    }

    #[test]
    fn test_heatmap_spread_is_smooth_and_normalized() {
        let heatmap = FixationHeatmap::from_samples(
            &[sample(90.0, 0.0, 0.0)],
            HeatmapConfig {
                cols: 32,
                rows: 16,
                spread_deg: 20.0,
                fps: None,
            },
        );
        let field = heatmap.to_field().unwrap();
        let (lo, hi) = field.min_max().unwrap();
        assert!((hi - 1.0).abs() < 1e-6);
        assert!(lo >= 0.0);
        // column 24 is yaw ~95°, column 8 is yaw ~-85°
        assert!(field.get(24, 8, 0) > field.get(8, 8, 0));
    }
}
