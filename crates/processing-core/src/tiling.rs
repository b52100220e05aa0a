//! Deterministic tiling schedule.
//!
//! Tiles sit on a yaw × pitch grid. Both steps are half the aperture, so
//! neighbouring tiles overlap by about 50% in each direction and the
//! overlap survives the presence guard applied during fusion.
//!
//! Pitch deliberately does not use a full-aperture step. With a half yaw
//! step and a full pitch step, the corners of square tiles in adjacent
//! rows leave uncovered bands at mid latitudes; the half pitch step plus
//! the two pole rows covers every non-pole pixel at least once.

use sal360_common::{Sal360Error, Sal360Result};
use sal360_sphere_model::Orientation;

/// Smallest tile edge the schedule will produce.
pub const MIN_TILE_SIZE: usize = 8;

/// Tile orientations plus the pixel size shared by all tiles.
#[derive(Debug, Clone, PartialEq)]
pub struct TilingSchedule {
    pub tile_width: usize,
    pub tile_height: usize,
    pub orientations: Vec<Orientation>,
}

impl TilingSchedule {
    pub fn len(&self) -> usize {
        self.orientations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orientations.is_empty()
    }
}

/// Tile edge that keeps roughly the source's angular resolution.
pub fn tile_size_for(panorama_width: usize, field_of_view: f64) -> usize {
    ((panorama_width as f64 * field_of_view / 360.0).round() as usize).max(MIN_TILE_SIZE)
}

/// Yaw angles in `[0, 360)` spaced by half the aperture.
pub fn yaw_steps(field_of_view: f64) -> Vec<f64> {
    let step = field_of_view / 2.0;
    let count = (360.0 / step).ceil() as usize;
    (0..count).map(|k| k as f64 * step).collect()
}

/// Pitch rows: multiples of half the aperture strictly inside (−90, 90),
/// then both poles.
pub fn pitch_steps(field_of_view: f64, equatorial_only: bool) -> Vec<f64> {
    if equatorial_only {
        return vec![0.0];
    }
    let step = field_of_view / 2.0;
    let mut pitches = vec![0.0];
    let mut k = 1;
    while (k as f64) * step < 90.0 {
        let p = k as f64 * step;
        pitches.push(p);
        pitches.push(-p);
        k += 1;
    }
    pitches.push(90.0);
    pitches.push(-90.0);
    pitches.sort_by(|a, b| a.total_cmp(b));
    pitches
}

/// Build the schedule for a panorama `panorama_width` pixels wide.
pub fn schedule(
    panorama_width: usize,
    field_of_view: f64,
    tile_size: Option<usize>,
    equatorial_only: bool,
) -> Sal360Result<TilingSchedule> {
    if panorama_width == 0 {
        return Err(Sal360Error::allocation("panorama width is zero"));
    }
    if !(field_of_view > 0.0 && field_of_view < 180.0) {
        return Err(Sal360Error::config(format!(
            "field_of_view must be inside (0, 180), got {field_of_view}"
        )));
    }
    if tile_size == Some(0) {
        return Err(Sal360Error::config("tile_size must be non-zero"));
    }
    let edge = tile_size.unwrap_or_else(|| tile_size_for(panorama_width, field_of_view));

    let yaws = yaw_steps(field_of_view);
    let mut orientations = Vec::new();
    for pitch in pitch_steps(field_of_view, equatorial_only) {
        for yaw in &yaws {
            orientations.push(Orientation::new(*yaw, pitch, 0.0, field_of_view)?);
        }
    }

    tracing::debug!(
        tiles = orientations.len(),
        tile_size = edge,
        field_of_view,
        equatorial_only,
        "computed tiling schedule"
    );

    Ok(TilingSchedule {
        tile_width: edge,
        tile_height: edge,
        orientations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grid_for_ninety_degrees() {
        let s = schedule(2048, 90.0, None, false).unwrap();
        assert_eq!(s.tile_width, 512);
        // 8 yaws × pitches {-90, -45, 0, 45, 90}
        assert_eq!(s.len(), 40);
        assert!(s.orientations.iter().all(|o| o.field_of_view == 90.0));
    }

    #[test]
    fn test_equatorial_only_is_one_row() {
        let s = schedule(1024, 60.0, Some(128), true).unwrap();
        assert_eq!(s.tile_width, 128);
        assert_eq!(s.len(), 12);
        assert!(s.orientations.iter().all(|o| o.pitch == 0.0));
    }

    #[test]
    fn test_pitch_rows_are_symmetric() {
        let pitches = pitch_steps(70.0, false);
        assert_eq!(pitches, vec![-90.0, -70.0, -35.0, 0.0, 35.0, 70.0, 90.0]);
    }

    #[test]
    fn test_pitch_step_matches_yaw_step() {
        for fov in [60.0, 90.0, 120.0] {
            let yaw_step = yaw_steps(fov)[1] - yaw_steps(fov)[0];
            let pitches = pitch_steps(fov, false);
            let equator = pitches.iter().position(|&p| p == 0.0).unwrap();
            assert_eq!(pitches[equator + 1] - pitches[equator], yaw_step);
            assert_eq!(yaw_step, fov / 2.0);
        }
    }

    #[test]
    fn test_small_panorama_uses_minimum_tile() {
        assert_eq!(tile_size_for(16, 90.0), MIN_TILE_SIZE);
    }

    #[test]
    fn test_invalid_fov_is_rejected() {
        for fov in [0.0, 180.0, f64::NAN] {
            let err = schedule(512, fov, None, false).unwrap_err();
            assert!(err.is_fatal());
        }
    }

    #[test]
    fn test_schedule_is_deterministic() {
        assert_eq!(
            schedule(720, 75.0, None, false).unwrap(),
            schedule(720, 75.0, None, false).unwrap()
        );
    }
}
