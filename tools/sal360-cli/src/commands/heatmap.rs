//! Build an attention heatmap from recorded head traces.

use std::path::PathBuf;

use anyhow::Context;
use sal360_common::Sal360Error;
use sal360_processing_core::{FixationHeatmap, HeatmapConfig};
use sal360_sphere_model::parse_head_traces;

use crate::io;

pub fn run(
    traces: PathBuf,
    output: PathBuf,
    content: Option<String>,
    cols: usize,
    rows: usize,
    spread: f64,
    fps: Option<f64>,
) -> anyhow::Result<()> {
    println!("Building heatmap from: {}", traces.display());

    if !traces.exists() {
        return Err(Sal360Error::FileNotFound { path: traces }.into());
    }
    let jsonl = std::fs::read_to_string(&traces)
        .map_err(|_| Sal360Error::MediaOpen {
            path: traces.clone(),
        })?;
    let mut sessions = parse_head_traces(&jsonl)
        .with_context(|| format!("parsing head traces in {}", traces.display()))?;
    println!("  Loaded {} sessions", sessions.len());

    if let Some(content) = &content {
        sessions.retain(|trace| &trace.content_id == content);
        println!("  {} sessions recorded for {content}", sessions.len());
    }
    if sessions.is_empty() {
        println!("  No samples to accumulate.");
        return Ok(());
    }

    let heatmap = FixationHeatmap::from_traces(
        &sessions,
        HeatmapConfig {
            cols,
            rows,
            spread_deg: spread,
            fps,
        },
    );
    println!(
        "  {} samples on a {}x{} grid (peak density {:.3})",
        heatmap.samples, heatmap.cols, heatmap.rows, heatmap.max_density
    );

    let field = heatmap.to_field()?;
    io::save_gray(&field, &output)?;
    println!("  Heatmap saved to: {}", output.display());

    Ok(())
}
