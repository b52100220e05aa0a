//! Spherical projector: equirectangular panorama ⇄ rectilinear tile.
//!
//! # Geometry
//!
//! The camera looks along +x with +y to the right and +z up. A tile pixel
//! `(col, row)` casts the ray `(f, col + 0.5 - W/2, -(row + 0.5 - H/2))`
//! where `f` is the focal length derived from the horizontal aperture. The
//! ray is rotated into world space by `R = Rz(yaw) · Ry(pitch) · Rx(roll)`
//! (roll about the optical axis first, then pitch, then yaw about the
//! vertical axis). The inverse mapping applies `Rᵀ`.

use sal360_common::{KernelKind, Sal360Error, Sal360Result};
use sal360_sphere_model::{
    equirect_to_sphere, sphere_to_equirect, ImageBuffer, Orientation, SpherePoint,
};

use crate::interpolation::{Boundary, Sampler};

/// Rays this close to the image plane are treated as behind the camera.
const MIN_FORWARD: f64 = 1e-9;

type Mat3 = [[f64; 3]; 3];

fn mat_mul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

/// Camera-to-world rotation for one orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    m: Mat3,
}

impl Rotation {
    pub fn from_orientation(orientation: &Orientation) -> Self {
        let (sy, cy) = orientation.yaw.to_radians().sin_cos();
        let (sp, cp) = orientation.pitch.to_radians().sin_cos();
        let (sr, cr) = orientation.roll.to_radians().sin_cos();

        let rz = [[cy, -sy, 0.0], [sy, cy, 0.0], [0.0, 0.0, 1.0]];
        let ry = [[cp, 0.0, -sp], [0.0, 1.0, 0.0], [sp, 0.0, cp]];
        let rx = [[1.0, 0.0, 0.0], [0.0, cr, -sr], [0.0, sr, cr]];

        Self {
            m: mat_mul(&rz, &mat_mul(&ry, &rx)),
        }
    }

    /// Camera → world.
    pub fn apply(&self, v: [f64; 3]) -> [f64; 3] {
        let m = &self.m;
        [
            m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
            m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
            m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
        ]
    }

    /// World → camera.
    pub fn apply_inverse(&self, v: [f64; 3]) -> [f64; 3] {
        let m = &self.m;
        [
            m[0][0] * v[0] + m[1][0] * v[1] + m[2][0] * v[2],
            m[0][1] * v[0] + m[1][1] * v[1] + m[2][1] * v[2],
            m[0][2] * v[0] + m[1][2] * v[1] + m[2][2] * v[2],
        ]
    }
}

/// Project a rectilinear view of `sphere` at `orientation`.
///
/// Columns wrap across the panorama seam; rows clamp at the poles.
pub fn to_rectilinear(
    sphere: &ImageBuffer,
    orientation: &Orientation,
    tile_width: usize,
    tile_height: usize,
    kernel: KernelKind,
) -> Sal360Result<ImageBuffer> {
    if sphere.is_empty() {
        return Err(Sal360Error::allocation("source panorama is empty"));
    }
    let mut tile = ImageBuffer::new(tile_width, tile_height, sphere.channels())?;

    let rotation = Rotation::from_orientation(orientation);
    let focal = orientation.focal_length(tile_width);
    let half_w = tile_width as f64 / 2.0;
    let half_h = tile_height as f64 / 2.0;
    let sampler = Sampler::new(kernel, Boundary::WrapX);
    let mut px = vec![0.0_f32; sphere.channels()];

    for row in 0..tile_height {
        let z = -(row as f64 + 0.5 - half_h);
        for col in 0..tile_width {
            let y = col as f64 + 0.5 - half_w;
            let world = rotation.apply([focal, y, z]);
            let point = SpherePoint::from_vector(world);
            let (sx, sy) = sphere_to_equirect(point, sphere.width(), sphere.height());

            sampler.sample_into(sphere, sx, sy, &mut px);
            for (c, v) in px.iter().enumerate() {
                tile.set(col, row, c, *v);
            }
        }
    }
    Ok(tile)
}

/// Visit every destination pixel of a `dest_width × dest_height` panorama
/// that falls inside a `tile_width × tile_height` tile at `orientation`.
///
/// `visit(dx, dy, tx, ty)` receives the destination pixel and the
/// continuous tile coordinates it maps to. Pixels behind the camera or
/// outside the tile's field of view are skipped.
pub fn for_each_covered_pixel(
    tile_width: usize,
    tile_height: usize,
    orientation: &Orientation,
    dest_width: usize,
    dest_height: usize,
    mut visit: impl FnMut(usize, usize, f64, f64),
) {
    let rotation = Rotation::from_orientation(orientation);
    let focal = orientation.focal_length(tile_width);
    let half_w = tile_width as f64 / 2.0;
    let half_h = tile_height as f64 / 2.0;
    let max_col = tile_width as f64 - 0.5;
    let max_row = tile_height as f64 - 0.5;

    let lon_trig: Vec<(f64, f64)> = (0..dest_width)
        .map(|x| equirect_to_sphere(x as f64, 0.0, dest_width, dest_height).lon.sin_cos())
        .collect();

    for dy in 0..dest_height {
        let (sin_lat, cos_lat) = equirect_to_sphere(0.0, dy as f64, dest_width, dest_height)
            .lat
            .sin_cos();
        for (dx, (sin_lon, cos_lon)) in lon_trig.iter().enumerate() {
            let world = [cos_lat * cos_lon, cos_lat * sin_lon, sin_lat];
            let cam = rotation.apply_inverse(world);
            if cam[0] <= MIN_FORWARD {
                continue;
            }
            let tx = focal * cam[1] / cam[0] + half_w - 0.5;
            let ty = -focal * cam[2] / cam[0] + half_h - 0.5;
            if (-0.5..=max_col).contains(&tx) && (-0.5..=max_row).contains(&ty) {
                visit(dx, dy, tx, ty);
            }
        }
    }
}

/// Back-project `tile` into `dest`, overwriting only the pixels the tile
/// covers. Repeated calls with different orientations accumulate.
pub fn to_equirectangular_into(
    tile: &ImageBuffer,
    orientation: &Orientation,
    dest: &mut ImageBuffer,
    kernel: KernelKind,
) -> Sal360Result<()> {
    if tile.is_empty() || dest.is_empty() {
        return Err(Sal360Error::allocation("cannot back-project an empty buffer"));
    }
    if tile.channels() != dest.channels() {
        return Err(Sal360Error::projection(format!(
            "tile has {} channels but destination has {}",
            tile.channels(),
            dest.channels()
        )));
    }

    let sampler = Sampler::new(kernel, Boundary::Clamp);
    let mut px = vec![0.0_f32; tile.channels()];
    let (dest_w, dest_h) = (dest.width(), dest.height());

    for_each_covered_pixel(
        tile.width(),
        tile.height(),
        orientation,
        dest_w,
        dest_h,
        |dx, dy, tx, ty| {
            sampler.sample_into(tile, tx, ty, &mut px);
            for (c, v) in px.iter().enumerate() {
                dest.set(dx, dy, c, *v);
            }
        },
    );
    Ok(())
}

/// Back-project `tile` into a freshly allocated zeroed panorama.
pub fn to_equirectangular(
    tile: &ImageBuffer,
    orientation: &Orientation,
    dest_width: usize,
    dest_height: usize,
    kernel: KernelKind,
) -> Sal360Result<ImageBuffer> {
    let mut dest = ImageBuffer::new(dest_width, dest_height, tile.channels())?;
    to_equirectangular_into(tile, orientation, &mut dest, kernel)?;
    Ok(dest)
}
