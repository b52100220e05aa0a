//! Predict observer scan paths.

use std::path::PathBuf;

use anyhow::Context;
use sal360_common::{PipelineConfig, ScanPathConfig};
use sal360_processing_core::{SaliencyPipeline, ScanPathPredictor};

use crate::io;

pub fn run(
    input: PathBuf,
    output: Option<PathBuf>,
    json: bool,
    from_saliency: bool,
    pipeline_config: PipelineConfig,
    scanpath_config: ScanPathConfig,
) -> anyhow::Result<()> {
    eprintln!("Predicting scan paths for: {}", input.display());

    let predictor = ScanPathPredictor::new(scanpath_config);
    let path = if from_saliency {
        let field = io::load_gray(&input)?;
        predictor.predict(&field)?
    } else {
        let panorama = io::load_rgb(&input)?;
        let pipeline = SaliencyPipeline::from_config(pipeline_config);
        let estimate = pipeline
            .estimate(&panorama)
            .context("estimating saliency")?;
        predictor.predict_scaled(&estimate.saliency, panorama.width(), panorama.height())?
    };

    let config = predictor.config();
    eprintln!(
        "  {} observers x {} fixations over {}s (seed {})",
        config.experiment_repetition, config.number_fixations, config.duration_secs, config.seed
    );
    if path.degenerate_fallbacks > 0 {
        eprintln!("  Fallback steps: {}", path.degenerate_fallbacks);
    }

    let rendered = if json { path.to_json()? } else { path.to_csv() };
    match output {
        Some(output) => {
            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&output, rendered)?;
            eprintln!("  {} fixations written to: {}", path.len(), output.display());
        }
        None => print!("{rendered}"),
    }

    Ok(())
}
