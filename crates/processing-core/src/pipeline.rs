//! The tiled saliency pipeline: project → compute → back-project →
//! accumulate → post-process → prior.
//!
//! Every stage runs on a fresh set of scoped workers draining the same
//! [`TaskQueue`], and the next stage starts only after the previous join.

use std::collections::BTreeMap;

use sal360_common::{PipelineConfig, Sal360Error, Sal360Result, StageClock, StageTiming};
use sal360_sphere_model::{ImageBuffer, Orientation, SaliencyField};
use serde::Serialize;

use crate::fusion::{self, FusionAccumulator, TileContribution};
use crate::prior::EquatorialPrior;
use crate::projector;
use crate::queue::{run_stage, TaskQueue, TileFailure};
use crate::saliency::{build_model, FeatureKey, SaliencyModel};
use crate::tiling;

/// A rectilinear tile and the pose it was projected at.
#[derive(Debug, Clone)]
pub struct ProjectedTile {
    pub orientation: Orientation,
    pub image: ImageBuffer,
}

/// Result of [`SaliencyPipeline::export_tiles`].
#[derive(Debug, Clone)]
pub struct TileExport {
    pub tile_width: usize,
    pub tile_height: usize,
    pub tiles: Vec<ProjectedTile>,
    pub failures: Vec<TileFailure>,
}

/// Fused saliency plus run diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    #[serde(skip)]
    pub saliency: SaliencyField,
    pub width: usize,
    pub height: usize,
    pub tiles: usize,
    /// Accumulator cells no tile reached (before post-processing).
    pub uncovered: usize,
    pub failures: Vec<TileFailure>,
    pub warnings: Vec<String>,
    pub timings: Vec<StageTiming>,
}

impl PipelineOutput {
    /// The recognizable result of a failed run: an empty field.
    pub fn empty() -> Self {
        Self {
            saliency: ImageBuffer::empty(),
            width: 0,
            height: 0,
            tiles: 0,
            uncovered: 0,
            failures: vec![],
            warnings: vec![],
            timings: vec![],
        }
    }
}

impl Default for PipelineOutput {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    /// Every tile went through every stage.
    Ok,
    /// Some tiles failed; the output fuses the rest.
    Partial,
    /// Nothing usable was produced.
    Failed,
}

/// Result of [`SaliencyPipeline::run`], which never fails.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub status: PipelineStatus,
    pub output: PipelineOutput,
    pub error: Option<String>,
}

impl PipelineOutcome {
    /// Outcome of a run that produced a field: `Partial` if any tile failed.
    pub fn completed(output: PipelineOutput) -> Self {
        let status = if output.failures.is_empty() {
            PipelineStatus::Ok
        } else {
            PipelineStatus::Partial
        };
        Self {
            status,
            output,
            error: None,
        }
    }
}

/// Tiled saliency estimation for equirectangular panoramas.
pub struct SaliencyPipeline {
    config: PipelineConfig,
    model: Box<dyn SaliencyModel>,
}

impl SaliencyPipeline {
    pub fn new(config: PipelineConfig, model: Box<dyn SaliencyModel>) -> Self {
        Self { config, model }
    }

    /// Pipeline using the model selected in `config.model`.
    pub fn from_config(config: PipelineConfig) -> Self {
        let model = build_model(&config.model);
        Self::new(config, model)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }

    /// Run every stage on `panorama`.
    ///
    /// Configuration and allocation problems abort the call. Individual
    /// tile failures are reported in the output and the remaining tiles are
    /// still fused.
    pub fn estimate(&self, panorama: &ImageBuffer) -> Sal360Result<PipelineOutput> {
        let warnings = self.prepare(panorama)?;
        let mut clock = StageClock::start();

        let (schedule, (images, failures)) = self.project(panorama, &mut clock)?;
        let mut queue = TaskQueue::new(schedule.len());
        let mut output = self.compute_and_fuse(
            &mut queue,
            &mut clock,
            &schedule.orientations,
            images,
            failures,
            (panorama.width(), panorama.height()),
        )?;
        output.warnings = warnings;

        tracing::info!(
            model = self.model.name(),
            tiles = output.tiles,
            failed = output.failures.len(),
            width = output.width,
            height = output.height,
            elapsed_ms = clock.elapsed_ms(),
            "saliency estimation finished"
        );
        Ok(output)
    }

    /// Like [`estimate`](Self::estimate) but never fails: a fatal error
    /// yields an empty output with [`PipelineStatus::Failed`].
    pub fn run(&self, panorama: &ImageBuffer) -> PipelineOutcome {
        match self.estimate(panorama) {
            Ok(output) => PipelineOutcome::completed(output),
            Err(e) => {
                tracing::error!(error = %e, "saliency estimation failed");
                PipelineOutcome {
                    status: PipelineStatus::Failed,
                    output: PipelineOutput::empty(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Project `panorama` into its tiles without computing saliency.
    pub fn export_tiles(&self, panorama: &ImageBuffer) -> Sal360Result<TileExport> {
        self.prepare(panorama)?;
        let mut clock = StageClock::start();
        let (schedule, (images, failures)) = self.project(panorama, &mut clock)?;

        let tiles = schedule
            .orientations
            .iter()
            .zip(images)
            .filter_map(|(orientation, image)| {
                image.map(|image| ProjectedTile {
                    orientation: *orientation,
                    image,
                })
            })
            .collect();

        Ok(TileExport {
            tile_width: schedule.tile_width,
            tile_height: schedule.tile_height,
            tiles,
            failures,
        })
    }

    /// Compute and fuse externally produced tiles into a
    /// `source_width × source_height` panorama's saliency map.
    pub fn fuse_tiles(
        &self,
        tiles: &[ProjectedTile],
        source_width: usize,
        source_height: usize,
    ) -> Sal360Result<PipelineOutput> {
        self.config.validate()?;
        if tiles.is_empty() {
            return Err(Sal360Error::config("no tiles to fuse"));
        }
        let mut clock = StageClock::start();
        let orientations: Vec<Orientation> = tiles.iter().map(|t| t.orientation).collect();
        let images = tiles.iter().map(|t| Some(t.image.clone())).collect();
        let mut queue = TaskQueue::new(tiles.len());

        self.compute_and_fuse(
            &mut queue,
            &mut clock,
            &orientations,
            images,
            vec![],
            (source_width, source_height),
        )
    }

    /// Fuse every intermediate feature map the model exposes.
    pub fn estimate_features(
        &self,
        panorama: &ImageBuffer,
    ) -> Sal360Result<BTreeMap<FeatureKey, SaliencyField>> {
        self.prepare(panorama)?;
        let mut clock = StageClock::start();
        let (schedule, (images, _)) = self.project(panorama, &mut clock)?;
        let mut queue = TaskQueue::new(schedule.len());

        let features = clock.time("features", || {
            run_stage(
                &mut queue,
                self.config.threads,
                "features",
                &images,
                |_, tile| match tile {
                    Some(tile) => self.model.new_instance().features(tile).map(Some),
                    None => Ok(None),
                },
            )
        });

        let per_tile: Vec<fusion::TileFeatures> = schedule
            .orientations
            .iter()
            .zip(features.outputs)
            .filter_map(|(o, f)| f.flatten().map(|f| (*o, f)))
            .collect();

        let (w, h) = fusion::accumulator_size(
            panorama.width(),
            panorama.height(),
            self.config.max_dimension,
        );
        clock.time("fuse-features", || {
            fusion::fuse_features(&per_tile, w, h, self.config.kernel)
        })
    }

    fn prepare(&self, panorama: &ImageBuffer) -> Sal360Result<Vec<String>> {
        let warnings = self.config.validate()?;
        if panorama.is_empty() {
            return Err(Sal360Error::allocation("input panorama is empty"));
        }
        Ok(warnings.iter().map(ToString::to_string).collect())
    }

    #[allow(clippy::type_complexity)]
    fn project(
        &self,
        panorama: &ImageBuffer,
        clock: &mut StageClock,
    ) -> Sal360Result<(
        tiling::TilingSchedule,
        (Vec<Option<ImageBuffer>>, Vec<TileFailure>),
    )> {
        let schedule = tiling::schedule(
            panorama.width(),
            self.config.field_of_view,
            self.config.tile_size,
            self.config.equatorial_only,
        )?;
        let mut queue = TaskQueue::new(schedule.len());
        let (tw, th, kernel) = (schedule.tile_width, schedule.tile_height, self.config.kernel);

        let report = clock.time("project", || {
            run_stage(
                &mut queue,
                self.config.threads,
                "project",
                &schedule.orientations,
                |_, orientation| {
                    projector::to_rectilinear(panorama, orientation, tw, th, kernel)
                },
            )
        });
        log_stage(clock, "project", report.succeeded(), report.failures.len());

        if report.succeeded() == 0 {
            return Err(Sal360Error::stage("project", "no tile could be projected"));
        }
        Ok((schedule, (report.outputs, report.failures)))
    }

    fn compute_and_fuse(
        &self,
        queue: &mut TaskQueue,
        clock: &mut StageClock,
        orientations: &[Orientation],
        tiles: Vec<Option<ImageBuffer>>,
        mut failures: Vec<TileFailure>,
        (source_width, source_height): (usize, usize),
    ) -> Sal360Result<PipelineOutput> {
        let threads = self.config.threads;
        let normalize_tiles = self.config.normalize_tiles;
        let kernel = self.config.kernel;
        let (acc_w, acc_h) =
            fusion::accumulator_size(source_width, source_height, self.config.max_dimension);

        let computed = clock.time("compute", || {
            run_stage(&mut *queue, threads, "compute", &tiles, |_, tile| match tile {
                Some(tile) => self
                    .model
                    .new_instance()
                    .estimate(tile, normalize_tiles)
                    .map(Some),
                None => Ok(None),
            })
        });
        log_stage(clock, "compute", computed.succeeded(), computed.failures.len());
        failures.extend(computed.failures);
        let fields: Vec<Option<SaliencyField>> =
            computed.outputs.into_iter().map(Option::flatten).collect();

        let projected = clock.time("back-project", || {
            run_stage(&mut *queue, threads, "back-project", &fields, |i, field| match field {
                Some(field) => {
                    fusion::back_project(field, &orientations[i], acc_w, acc_h, kernel).map(Some)
                }
                None => Ok(None),
            })
        });
        failures.extend(projected.failures);
        let contributions: Vec<TileContribution> =
            projected.outputs.into_iter().flatten().flatten().collect();
        log_stage(clock, "back-project", contributions.len(), failures.len());

        if contributions.is_empty() {
            return Err(Sal360Error::stage(
                "back-project",
                "no tile produced a contribution",
            ));
        }

        let accumulator = clock.time("accumulate", || {
            let mut acc = FusionAccumulator::new(acc_w, acc_h)?;
            for contribution in &contributions {
                acc.add(contribution);
            }
            Ok::<_, Sal360Error>(acc)
        })?;
        let uncovered = accumulator.uncovered();
        let fused = accumulator.finalize()?;

        let saliency = clock.time("post-process", || {
            let processed = fusion::post_process(
                &fused,
                self.config.blur_sigma,
                self.config.blur_max_radius,
                self.config.normalize_output,
            );
            EquatorialPrior::new(self.config.prior).apply(&processed)
        });

        failures.sort_by_key(|f| f.index);
        Ok(PipelineOutput {
            width: saliency.width(),
            height: saliency.height(),
            saliency,
            tiles: orientations.len(),
            uncovered,
            failures,
            warnings: vec![],
            timings: clock.timings().to_vec(),
        })
    }
}

fn log_stage(clock: &StageClock, stage: &str, succeeded: usize, failed: usize) {
    let elapsed_ms = clock
        .timings()
        .iter()
        .rev()
        .find(|t| t.stage == stage)
        .map_or(0.0, |t| t.elapsed_ms);
    tracing::info!(stage, succeeded, failed, elapsed_ms, "stage complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saliency::{ConstantModel, PassthroughModel};
    use sal360_common::{KernelKind, ModelConfig, ModelKind, PriorMode};

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            threads: 2,
            ..Default::default()
        }
    }

    /// Bright column band around longitude 0.
    fn banded_panorama() -> ImageBuffer {
        ImageBuffer::from_fn(128, 64, 3, |x, _, _| {
            if (60..68).contains(&x) {
                1.0
            } else {
                0.1
            }
        })
        .unwrap()
    }

    #[test]
    fn test_estimate_produces_unit_range_field() {
        let pipeline = SaliencyPipeline::new(small_config(), Box::new(ConstantModel::new(1.0)));
        let out = pipeline.estimate(&banded_panorama()).unwrap();
        assert_eq!((out.width, out.height), (128, 64));
        assert!(out.failures.is_empty());
        assert_eq!(out.uncovered, 0);
        let (lo, hi) = out.saliency.min_max().unwrap();
        assert!(lo >= 0.0 && hi <= 1.0);
        let stages: Vec<&str> = out.timings.iter().map(|t| t.stage.as_str()).collect();
        assert_eq!(
            stages,
            vec!["project", "compute", "back-project", "accumulate", "post-process"]
        );
    }

    #[test]
    fn test_passthrough_keeps_bright_band() {
        let config = PipelineConfig {
            equatorial_only: true,
            kernel: KernelKind::Bilinear,
            ..small_config()
        };
        let pipeline = SaliencyPipeline::new(config, Box::new(PassthroughModel));
        let out = pipeline.estimate(&banded_panorama()).unwrap();
        assert!(out.saliency.get(64, 32, 0) > out.saliency.get(10, 32, 0));
    }

    #[test]
    fn test_invalid_config_fails_the_call() {
        let config = PipelineConfig {
            field_of_view: 200.0,
            ..small_config()
        };
        let pipeline = SaliencyPipeline::from_config(config);
        let outcome = pipeline.run(&banded_panorama());
        assert_eq!(outcome.status, PipelineStatus::Failed);
        assert!(outcome.output.saliency.is_empty());
        assert!(outcome.error.unwrap().contains("field_of_view"));
    }

    #[test]
    fn test_oversized_tile_fails_the_call() {
        let config = PipelineConfig {
            tile_size: Some(1 << 22),
            equatorial_only: true,
            ..small_config()
        };
        let panorama = ImageBuffer::filled(64, 32, 3, 0.5).unwrap();
        let outcome = SaliencyPipeline::from_config(config).run(&panorama);
        assert_eq!(outcome.status, PipelineStatus::Failed);
        assert!(outcome.output.saliency.is_empty());
        assert!(outcome.error.unwrap().contains("tile_size"));
    }

    #[test]
    fn test_empty_panorama_is_fatal() {
        let pipeline = SaliencyPipeline::from_config(small_config());
        let err = pipeline.estimate(&ImageBuffer::empty()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_warnings_are_reported() {
        let config = PipelineConfig {
            model: ModelConfig {
                kind: ModelKind::Constant,
                contrast_levels: Some(2),
                ..Default::default()
            },
            equatorial_only: true,
            ..small_config()
        };
        let out = SaliencyPipeline::from_config(config)
            .estimate(&banded_panorama())
            .unwrap();
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn test_export_then_fuse_matches_estimate() {
        let config = PipelineConfig {
            prior: PriorMode::Fixed,
            ..small_config()
        };
        let pipeline = SaliencyPipeline::new(config, Box::new(PassthroughModel));
        let pano = banded_panorama();

        let export = pipeline.export_tiles(&pano).unwrap();
        assert!(export.failures.is_empty());
        let fused = pipeline.fuse_tiles(&export.tiles, 128, 64).unwrap();
        let direct = pipeline.estimate(&pano).unwrap();
        assert_eq!(fused.saliency, direct.saliency);
    }

    #[test]
    fn test_feature_maps_are_fused() {
        let config = PipelineConfig {
            equatorial_only: true,
            model: ModelConfig {
                kind: ModelKind::Contrast,
                contrast_levels: Some(2),
                ..Default::default()
            },
            ..small_config()
        };
        let features = SaliencyPipeline::from_config(config)
            .estimate_features(&banded_panorama())
            .unwrap();
        assert_eq!(features.len(), 3);
        assert!(features.contains_key(&FeatureKey::SALIENCY));
    }
}
