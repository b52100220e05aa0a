pub mod fuse;
pub mod heatmap;
pub mod saliency;
pub mod scanpath;
pub mod tiles;

use std::path::Path;

use sal360_processing_core::PipelineOutcome;

/// Write the JSON run report for a pipeline outcome.
pub(crate) fn write_report(outcome: &PipelineOutcome, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(outcome)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json)?;
    println!("  Report written to: {}", path.display());
    Ok(())
}

/// Print the per-stage summary shared by `saliency` and `fuse`.
pub(crate) fn print_summary(outcome: &PipelineOutcome) {
    let output = &outcome.output;
    println!("  Status: {:?}", outcome.status);
    println!("  Tiles fused: {}", output.tiles);
    println!("  Output size: {}x{}", output.width, output.height);
    if output.uncovered > 0 {
        println!("  Uncovered cells: {}", output.uncovered);
    }
    for warning in &output.warnings {
        println!("  Warning: {warning}");
    }
    for failure in &output.failures {
        println!(
            "  Tile {} failed in {}: {}",
            failure.index, failure.stage, failure.message
        );
    }
    for timing in &output.timings {
        println!("  {:<14} {:>8.1} ms", timing.stage, timing.elapsed_ms);
    }
}
