//! Compute saliency on a tile directory and back-project it.

use std::path::PathBuf;

use anyhow::Context;
use sal360_common::{KernelKind, PipelineConfig, Sal360Error};
use sal360_processing_core::{PipelineOutcome, ProjectedTile, SaliencyPipeline};
use sal360_sphere_model::TilingManifest;

use crate::io;

pub fn run(
    dir: PathBuf,
    output: PathBuf,
    report: Option<PathBuf>,
    mut config: PipelineConfig,
    kernel_from_manifest: bool,
) -> anyhow::Result<()> {
    println!("Fusing tiles from: {}", dir.display());

    if !dir.exists() {
        return Err(Sal360Error::FileNotFound { path: dir }.into());
    }
    let manifest = TilingManifest::load(&dir).map_err(Sal360Error::from)?;

    let missing = manifest.missing_files(&dir);
    if !missing.is_empty() {
        for line in &missing {
            println!("  {line}");
        }
        anyhow::bail!("{} tile(s) listed in the manifest are missing", missing.len());
    }

    if kernel_from_manifest {
        match KernelKind::from_name(&manifest.kernel) {
            Some(kernel) => config.kernel = kernel,
            None => tracing::warn!(
                kernel = %manifest.kernel,
                "unknown kernel in manifest, keeping configured kernel"
            ),
        }
    }

    let mut tiles = Vec::with_capacity(manifest.tiles.len());
    for entry in &manifest.tiles {
        let image = io::load_rgb(&dir.join(&entry.file))?;
        let orientation = entry
            .orientation()
            .with_context(|| format!("tile {}", entry.file))?;
        tiles.push(ProjectedTile { orientation, image });
    }
    println!(
        "  Loaded {} tiles for a {}x{} panorama",
        tiles.len(),
        manifest.source_width,
        manifest.source_height
    );

    let pipeline = SaliencyPipeline::from_config(config);
    let fused = pipeline
        .fuse_tiles(&tiles, manifest.source_width, manifest.source_height)
        .context("fusing tiles")?;
    let outcome = PipelineOutcome::completed(fused);

    super::print_summary(&outcome);
    if let Some(report) = &report {
        super::write_report(&outcome, report)?;
    }

    io::save_gray(&outcome.output.saliency, &output)?;
    println!("  Saliency map saved to: {}", output.display());

    Ok(())
}
