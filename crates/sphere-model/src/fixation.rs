//! Simulated gaze samples.

use serde::{Deserialize, Serialize};

/// One simulated fixation in source-pixel coordinates.
///
/// Fixations are appended in order and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fixation {
    /// Column in the source panorama (pixels).
    pub x: f64,
    /// Row in the source panorama (pixels).
    pub y: f64,
    /// Dwell start (seconds since the observer's first fixation).
    pub timestamp_start: f64,
    /// Dwell end (seconds).
    pub timestamp_end: f64,
    /// Saliency at the fixated grid node.
    pub value: f64,
}

impl Fixation {
    pub fn duration(&self) -> f64 {
        self.timestamp_end - self.timestamp_start
    }
}

/// A fixation tagged with its observer, as written to tabular output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixationRow {
    pub observer: usize,
    pub index: usize,
    #[serde(flatten)]
    pub fixation: Fixation,
}

/// Header line used by [`rows_to_csv`].
pub const FIXATION_CSV_HEADER: &str = "observer,index,x,y,start,end,value";

/// Render rows as CSV with a header line.
pub fn rows_to_csv(rows: &[FixationRow]) -> String {
    let mut out = String::with_capacity(32 * (rows.len() + 1));
    out.push_str(FIXATION_CSV_HEADER);
    out.push('\n');
    for row in rows {
        let f = &row.fixation;
        out.push_str(&format!(
            "{},{},{:.3},{:.3},{:.6},{:.6},{:.6}\n",
            row.observer, row.index, f.x, f.y, f.timestamp_start, f.timestamp_end, f.value
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_has_header_and_rows() {
        let rows = vec![FixationRow {
            observer: 0,
            index: 0,
            fixation: Fixation {
                x: 12.5,
                y: 3.0,
                timestamp_start: 0.0,
                timestamp_end: 0.25,
                value: 0.9,
            },
        }];
        let csv = rows_to_csv(&rows);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], FIXATION_CSV_HEADER);
        assert_eq!(lines[1], "0,0,12.500,3.000,0.000000,0.250000,0.900000");
    }

    #[test]
    fn test_row_json_is_flat() {
        let row = FixationRow {
            observer: 2,
            index: 7,
            fixation: Fixation {
                x: 1.0,
                y: 2.0,
                timestamp_start: 0.5,
                timestamp_end: 1.0,
                value: 0.1,
            },
        };
        let json = serde_json::to_string(&row).unwrap();
        assert!(json.contains("\"observer\":2"));
        assert!(json.contains("\"timestamp_end\":1.0"));
        assert!(!json.contains("\"fixation\""));
    }
}
