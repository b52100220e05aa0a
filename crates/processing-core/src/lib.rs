//! sal360 Processing Core
//!
//! Saliency and scan-path prediction for equirectangular panoramas:
//! - **Projector:** Equirectangular ⇄ rectilinear resampling at any pose
//! - **Tiling + Queue:** Overlapping tile schedule drained by per-stage worker pools
//! - **Saliency models:** Pluggable per-tile estimators behind one trait
//! - **Fusion:** Presence-guarded back-projection into a (sum, count) accumulator
//! - **Prior:** Latitude weighting for the equator bias of 360° viewing
//! - **Scan paths:** Stochastic fixation walks over a saliency node grid
//! - **Heatmaps:** Ground-truth attention maps from recorded head traces
//!
//! This crate is pure computation: images come in as buffers, results go
//! out as buffers and records. File I/O lives in the CLI.

pub mod filters;
pub mod fusion;
pub mod heatmap;
pub mod interpolation;
pub mod pipeline;
pub mod prior;
pub mod projector;
pub mod queue;
pub mod saliency;
pub mod scanpath;
pub mod tiling;

pub use fusion::FusionAccumulator;
pub use heatmap::{FixationHeatmap, HeatmapConfig};
pub use pipeline::{
    PipelineOutcome, PipelineOutput, PipelineStatus, ProjectedTile, SaliencyPipeline, TileExport,
};
pub use prior::EquatorialPrior;
pub use queue::{StageReport, TaskQueue, TileFailure};
pub use saliency::{build_model, SaliencyModel};
pub use scanpath::{ScanPath, ScanPathPredictor};
