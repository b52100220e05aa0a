//! Camera orientation and spherical coordinate types.
//!
//! Angles on [`Orientation`] are stored in degrees; [`SpherePoint`] uses
//! radians because it only feeds trigonometry.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Viewing pose of a rectilinear tile on the sphere.
///
/// `yaw` turns around the vertical axis (positive towards increasing
/// longitude), `pitch` tilts towards the north pole, `roll` spins around
/// the optical axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    /// Horizontal angle (degrees).
    pub yaw: f64,
    /// Vertical angle (degrees).
    pub pitch: f64,
    /// Tilt around the optical axis (degrees).
    pub roll: f64,
    /// Horizontal aperture (degrees), strictly inside (0, 180).
    pub field_of_view: f64,
}

impl Orientation {
    /// Create an orientation, rejecting apertures outside (0°, 180°).
    pub fn new(yaw: f64, pitch: f64, roll: f64, field_of_view: f64) -> Result<Self, ModelError> {
        if !(field_of_view > 0.0 && field_of_view < 180.0) {
            return Err(ModelError::InvalidFieldOfView { fov: field_of_view });
        }
        Ok(Self {
            yaw,
            pitch,
            roll,
            field_of_view,
        })
    }

    /// Looking at longitude 0 on the equator.
    pub fn forward(field_of_view: f64) -> Result<Self, ModelError> {
        Self::new(0.0, 0.0, 0.0, field_of_view)
    }

    /// Half the aperture in radians.
    pub fn half_fov_rad(&self) -> f64 {
        self.field_of_view.to_radians() / 2.0
    }

    /// Focal length in pixels for a tile `tile_width` pixels wide.
    pub fn focal_length(&self, tile_width: usize) -> f64 {
        (tile_width as f64 / 2.0) / self.half_fov_rad().tan()
    }

    /// Yaw wrapped into `[0, 360)`.
    pub fn normalized_yaw(&self) -> f64 {
        self.yaw.rem_euclid(360.0)
    }

    /// The point on the sphere the optical axis passes through.
    pub fn center(&self) -> SpherePoint {
        SpherePoint::new(self.yaw.to_radians(), self.pitch.to_radians())
    }
}

/// A direction on the unit sphere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpherePoint {
    /// Longitude in radians, wrapped into `[-π, π)`.
    pub lon: f64,
    /// Latitude in radians, clamped to `[-π/2, π/2]`.
    pub lat: f64,
}

impl SpherePoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self {
            lon: wrap_longitude(lon),
            lat: lat.clamp(-FRAC_PI_2, FRAC_PI_2),
        }
    }

    /// Point from a unit (or non-unit) direction vector with z up.
    pub fn from_vector(v: [f64; 3]) -> Self {
        let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt().max(f64::MIN_POSITIVE);
        Self::new(v[1].atan2(v[0]), (v[2] / norm).clamp(-1.0, 1.0).asin())
    }

    /// Unit direction vector with x towards (lon 0, lat 0) and z up.
    pub fn to_vector(&self) -> [f64; 3] {
        let (sin_lat, cos_lat) = self.lat.sin_cos();
        let (sin_lon, cos_lon) = self.lon.sin_cos();
        [cos_lat * cos_lon, cos_lat * sin_lon, sin_lat]
    }

    /// Great-circle distance in radians.
    pub fn great_circle_distance(&self, other: &SpherePoint) -> f64 {
        let d_lat = other.lat - self.lat;
        let d_lon = wrap_longitude(other.lon - self.lon);
        let h = (d_lat / 2.0).sin().powi(2)
            + self.lat.cos() * other.lat.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * h.sqrt().min(1.0).asin()
    }
}

/// Wrap a longitude into `[-π, π)`.
pub fn wrap_longitude(lon: f64) -> f64 {
    (lon + PI).rem_euclid(TAU) - PI
}

/// Longitude/latitude (radians) of the centre of equirectangular pixel `(x, y)`.
///
/// Fractional coordinates are accepted; integer values address pixel centres.
pub fn equirect_to_sphere(x: f64, y: f64, width: usize, height: usize) -> SpherePoint {
    let lon = (x + 0.5) / width as f64 * TAU - PI;
    let lat = FRAC_PI_2 - (y + 0.5) / height as f64 * PI;
    SpherePoint::new(lon, lat)
}

/// Continuous equirectangular pixel coordinates of a sphere point.
pub fn sphere_to_equirect(point: SpherePoint, width: usize, height: usize) -> (f64, f64) {
    let x = (point.lon + PI) / TAU * width as f64 - 0.5;
    let y = (FRAC_PI_2 - point.lat) / PI * height as f64 - 0.5;
    (x, y)
}

/// Latitude in degrees of the centre of row `row` in an image `height` rows tall.
pub fn row_latitude_deg(row: usize, height: usize) -> f64 {
    90.0 - (row as f64 + 0.5) / height as f64 * 180.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_rejects_bad_fov() {
        assert!(Orientation::new(0.0, 0.0, 0.0, 0.0).is_err());
        assert!(Orientation::new(0.0, 0.0, 0.0, 180.0).is_err());
        assert!(Orientation::new(0.0, 0.0, 0.0, -10.0).is_err());
        assert!(Orientation::new(0.0, 0.0, 0.0, f64::NAN).is_err());
        assert!(Orientation::new(10.0, 20.0, 0.0, 90.0).is_ok());
    }

    #[test]
    fn test_focal_length_at_ninety_degrees() {
        let o = Orientation::forward(90.0).unwrap();
        assert!((o.focal_length(200) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_equirect_round_trip() {
        let (w, h) = (360, 180);
        let p = equirect_to_sphere(10.0, 20.0, w, h);
        let (x, y) = sphere_to_equirect(p, w, h);
        assert!((x - 10.0).abs() < 1e-9);
        assert!((y - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_vector_round_trip() {
        let p = SpherePoint::new(1.2, -0.4);
        let q = SpherePoint::from_vector(p.to_vector());
        assert!((p.lon - q.lon).abs() < 1e-12);
        assert!((p.lat - q.lat).abs() < 1e-12);
    }

    #[test]
    fn test_great_circle_wraps_seam() {
        let a = SpherePoint::new(PI - 0.01, 0.0);
        let b = SpherePoint::new(-PI + 0.01, 0.0);
        assert!((a.great_circle_distance(&b) - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_row_latitude_is_symmetric() {
        assert!((row_latitude_deg(0, 4) + row_latitude_deg(3, 4)).abs() < 1e-12);
        assert!((row_latitude_deg(0, 2) - 45.0).abs() < 1e-12);
    }
}
