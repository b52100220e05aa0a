//! sal360 Sphere Model
//!
//! Defines the core data contracts shared by the saliency pipeline:
//! - **Orientation:** Camera pose on the sphere (yaw, pitch, roll, field of view)
//! - **ImageBuffer:** Interleaved `f32` pixel storage for panoramas, tiles and fields
//! - **Fixation:** Timestamped gaze samples produced by the scan-path predictor
//! - **HeadTrace:** Recorded per-observer head orientation logs
//! - **TilingManifest:** Persisted tile orientations for later back-projection
//!
//! Equirectangular conventions: column `x` maps to longitude
//! `(x + 0.5) / width * 360° - 180°`, row `y` maps to latitude
//! `90° - (y + 0.5) / height * 180°`.

pub mod error;
pub mod fixation;
pub mod image;
pub mod manifest;
pub mod orientation;
pub mod trace;

pub use error::*;
pub use fixation::*;
pub use image::*;
pub use manifest::*;
pub use orientation::*;
pub use trace::*;
