//! Estimate the saliency map of a panorama.

use std::path::PathBuf;

use anyhow::Context;
use sal360_common::PipelineConfig;
use sal360_processing_core::{PipelineStatus, SaliencyPipeline};

use crate::io;

pub fn run(
    input: PathBuf,
    output: PathBuf,
    report: Option<PathBuf>,
    dump_features: Option<PathBuf>,
    config: PipelineConfig,
) -> anyhow::Result<()> {
    println!("Estimating saliency for: {}", input.display());

    let panorama = io::load_rgb(&input)?;
    println!("  Panorama: {}x{}", panorama.width(), panorama.height());

    let pipeline = SaliencyPipeline::from_config(config);
    println!(
        "  Model: {} ({} threads, fov {}°)",
        pipeline.model_name(),
        pipeline.config().threads,
        pipeline.config().field_of_view
    );

    let outcome = pipeline.run(&panorama);
    super::print_summary(&outcome);
    if let Some(report) = &report {
        super::write_report(&outcome, report)?;
    }

    if outcome.status == PipelineStatus::Failed {
        anyhow::bail!(
            "saliency estimation failed: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }

    io::save_gray(&outcome.output.saliency, &output)?;
    println!("  Saliency map saved to: {}", output.display());

    if let Some(dir) = dump_features {
        let features = pipeline
            .estimate_features(&panorama)
            .context("fusing feature maps")?;
        for (key, field) in &features {
            let path = dir.join(format!("{key}.png"));
            io::save_gray(field, &path)?;
        }
        println!(
            "  {} feature maps saved to: {}",
            features.len(),
            dir.display()
        );
    }

    Ok(())
}
