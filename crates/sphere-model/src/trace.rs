//! Recorded head-orientation traces.
//!
//! Traces are stored as JSON lines, one observer session per line:
//!
//! ```text
//! {"content_id":"P1","device_id":"hmd-03","samples":[{"pitch":-2.0,"yaw":35.0,"roll":0.0,"second":0.0}, ...]}
//! ```
//!
//! Samples are angles in degrees with a timestamp in seconds from the start
//! of the content.

use serde::{Deserialize, Serialize};

/// One recorded head pose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadSample {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
    pub second: f64,
}

/// All samples one device recorded while showing one piece of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadTrace {
    pub content_id: String,
    pub device_id: String,
    pub samples: Vec<HeadSample>,
}

impl HeadTrace {
    /// Timestamp of the last sample, or 0 for an empty trace.
    pub fn duration_secs(&self) -> f64 {
        self.samples
            .iter()
            .map(|s| s.second)
            .fold(0.0_f64, f64::max)
    }

    /// One sample per output frame at `fps`, using zero-order hold.
    ///
    /// A frame between two recorded timestamps repeats the last known
    /// sample; frames before the first sample repeat the first one.
    /// Returns an empty vec for an empty trace.
    pub fn frame_samples(&self, fps: f64, frames: usize) -> Vec<HeadSample> {
        if self.samples.is_empty() || fps <= 0.0 {
            return vec![];
        }

        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.second.total_cmp(&b.second));

        (0..frames)
            .map(|frame| {
                let t = frame as f64 / fps;
                let after = sorted.partition_point(|s| s.second <= t);
                sorted[after.saturating_sub(1)]
            })
            .collect()
    }
}

/// Group samples per frame across observers: `result[frame]` holds one
/// sample from every non-empty trace.
pub fn frame_orientations(traces: &[HeadTrace], fps: f64, frames: usize) -> Vec<Vec<HeadSample>> {
    let per_trace: Vec<Vec<HeadSample>> = traces
        .iter()
        .map(|trace| trace.frame_samples(fps, frames))
        .filter(|samples| !samples.is_empty())
        .collect();

    (0..frames)
        .map(|frame| per_trace.iter().map(|samples| samples[frame]).collect())
        .collect()
}

/// Parse traces from JSONL content (one JSON object per line).
pub fn parse_head_traces(jsonl: &str) -> Result<Vec<HeadTrace>, serde_json::Error> {
    jsonl
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(serde_json::from_str)
        .collect()
}

/// Serialize traces to JSONL format.
pub fn serialize_head_traces(traces: &[HeadTrace]) -> Result<String, serde_json::Error> {
    let mut output = String::new();
    for trace in traces {
        output.push_str(&serde_json::to_string(trace)?);
        output.push('\n');
    }
    Ok(output)
}
