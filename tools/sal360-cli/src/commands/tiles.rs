//! Export rectilinear tiles plus `manifest.json`.

use std::path::PathBuf;

use sal360_common::{PipelineConfig, Sal360Error};
use sal360_processing_core::SaliencyPipeline;
use sal360_sphere_model::{ManifestEntry, TilingManifest};

use crate::io;

pub fn run(input: PathBuf, output: PathBuf, config: PipelineConfig) -> anyhow::Result<()> {
    println!("Exporting tiles for: {}", input.display());

    let panorama = io::load_rgb(&input)?;
    let kernel = config.kernel;
    let pipeline = SaliencyPipeline::from_config(config);
    let export = pipeline.export_tiles(&panorama)?;

    let mut manifest = TilingManifest::new(
        panorama.width(),
        panorama.height(),
        export.tile_width,
        export.tile_height,
        kernel.name(),
    );

    for (i, tile) in export.tiles.iter().enumerate() {
        let file = format!("tile_{i:03}.png");
        io::save_image(&tile.image, &output.join(&file))?;
        manifest
            .tiles
            .push(ManifestEntry::new(file, &tile.orientation));
    }
    let manifest_path = manifest.save(&output).map_err(Sal360Error::from)?;

    println!(
        "  {} tiles of {}x{} written to: {}",
        manifest.tiles.len(),
        export.tile_width,
        export.tile_height,
        output.display()
    );
    for failure in &export.failures {
        println!("  Tile {} skipped: {}", failure.index, failure.message);
    }
    println!("  Manifest: {}", manifest_path.display());

    Ok(())
}
