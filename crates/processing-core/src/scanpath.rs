//! Scan-path predictor: stochastic walks over a saliency node grid.
//!
//! # Algorithm
//!
//! 1. **Grid**: average the field into a small pyramid (base
//!    `grid_width × grid_width/2`, each further level halved) and flatten
//!    every level into one node list.
//! 2. **Distances**: pairwise haversine-style angular distance between
//!    nodes, wrapping across the seam.
//! 3. **Affinity**: column-normalize the distance matrix and take
//!    `1 − normalized`.
//! 4. **Start**: each observer starts on the centre row of the base level
//!    at an observer-dependent column, searches a small neighbourhood when
//!    that node is dim, then hill-climbs to a local maximum.
//! 5. **Walk**: score every node by affinity × Gaussian falloff × value,
//!    keep those close to the best score, relax when nothing qualifies and
//!    pick uniformly among the top four. Nodes seen in the last 20 steps are
//!    never candidates.
//! 6. **Timing**: dwell times are proportional to node values and add up
//!    to the configured duration.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sal360_common::{Sal360Error, Sal360Result, ScanPathConfig};
use sal360_sphere_model::{
    rows_to_csv, sphere_to_equirect, wrap_longitude, Fixation, FixationRow, SaliencyField,
    SpherePoint,
};
use serde::Serialize;

/// Start nodes dimmer than this trigger a neighbourhood search.
pub const START_THRESHOLD: f64 = 0.8;

/// Radius (in base-level cells) of the start neighbourhood search.
pub const START_SEARCH_RADIUS: usize = 2;

/// Nodes visited within this many steps are excluded.
pub const REVISIT_WINDOW: usize = 20;

/// Threshold relaxations per falloff width.
pub const MAX_RELAXATIONS: usize = 15;

/// Falloff widenings after the first width is exhausted.
pub const MAX_WIDENINGS: usize = 10;

/// The next fixation is drawn from this many best candidates.
pub const TOP_CANDIDATES: usize = 4;

const INITIAL_ACCEPTANCE: f64 = 0.9;
const INITIAL_MIN_SALIENCY: f64 = 0.5;
const ACCEPTANCE_RELAX: f64 = 0.8;
const MIN_SALIENCY_RELAX: f64 = 0.5;
const FALLOFF_WIDEN: f64 = 1.5;

/// Half-angle divisors of the latitude and longitude terms of
/// [`node_distance`]. The longitude term is divided twice as much as in
/// the textbook haversine; see DESIGN.md.
const LAT_DIVISOR: f64 = 2.0;
const LON_DIVISOR: f64 = 4.0;

/// One cell of the node pyramid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridNode {
    pub level: usize,
    pub col: usize,
    pub row: usize,
    /// Cell centre (radians).
    pub lon: f64,
    pub lat: f64,
    /// Mean field value, rescaled so the brightest node is 1.
    pub value: f64,
}

/// Flattened multi-level grid over a saliency field.
#[derive(Debug, Clone)]
pub struct NodeGrid {
    pub nodes: Vec<GridNode>,
    pub base_width: usize,
    pub base_height: usize,
}

impl NodeGrid {
    /// Average `field` into `levels` grids starting at `grid_width` columns.
    pub fn build(field: &SaliencyField, grid_width: usize, levels: usize) -> Sal360Result<Self> {
        if field.is_empty() {
            return Err(Sal360Error::allocation("scan path needs a non-empty field"));
        }
        let base_width = grid_width.max(2);
        let base_height = (base_width / 2).max(1);
        let (w, h) = (field.width(), field.height());

        let mut nodes = Vec::new();
        for level in 0..levels.max(1) {
            let (gw, gh) = (base_width >> level, base_height >> level);
            if gw < 2 || gh < 1 {
                break;
            }
            for row in 0..gh {
                let y0 = row * h / gh;
                let y1 = ((row + 1) * h / gh).max(y0 + 1).min(h);
                for col in 0..gw {
                    let x0 = col * w / gw;
                    let x1 = ((col + 1) * w / gw).max(x0 + 1).min(w);
                    let mut total = 0.0_f64;
                    for y in y0..y1 {
                        for x in x0..x1 {
                            let v = field.get(x, y, 0);
                            if v.is_finite() {
                                total += f64::from(v.max(0.0));
                            }
                        }
                    }
                    let area = ((x1 - x0) * (y1 - y0)) as f64;
                    nodes.push(GridNode {
                        level,
                        col,
                        row,
                        lon: (col as f64 + 0.5) / gw as f64 * std::f64::consts::TAU
                            - std::f64::consts::PI,
                        lat: std::f64::consts::FRAC_PI_2
                            - (row as f64 + 0.5) / gh as f64 * std::f64::consts::PI,
                        value: total / area,
                    });
                }
            }
        }

        let max = nodes.iter().map(|n| n.value).fold(0.0_f64, f64::max);
        if max > 0.0 {
            nodes.iter_mut().for_each(|n| n.value /= max);
        }

        Ok(Self {
            nodes,
            base_width,
            base_height,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Flat index of a base-level cell. Columns wrap, rows clamp.
    pub fn base_index(&self, col: i64, row: i64) -> usize {
        let col = col.rem_euclid(self.base_width as i64) as usize;
        let row = row.clamp(0, self.base_height as i64 - 1) as usize;
        row * self.base_width + col
    }

    /// Continuous pixel position of a node's centre in a `width × height`
    /// equirectangular image.
    pub fn source_position(&self, index: usize, width: usize, height: usize) -> (f64, f64) {
        let node = &self.nodes[index];
        sphere_to_equirect(SpherePoint::new(node.lon, node.lat), width, height)
    }
}

/// Haversine-style angular distance (radians) between two nodes.
pub fn node_distance(a: &GridNode, b: &GridNode) -> f64 {
    let d_lat = b.lat - a.lat;
    let d_lon = wrap_longitude(b.lon - a.lon);
    let h = (d_lat / LAT_DIVISOR).sin().powi(2)
        + a.lat.cos() * b.lat.cos() * (d_lon / LON_DIVISOR).sin().powi(2);
    2.0 * h.clamp(0.0, 1.0).sqrt().asin()
}

/// Pairwise distances and the derived affinity table.
#[derive(Debug, Clone)]
pub struct TransitionMatrix {
    n: usize,
    distance: Vec<f64>,
    affinity: Vec<f64>,
}

impl TransitionMatrix {
    /// Fails with an allocation error when the `n × n` tables cannot be
    /// allocated.
    pub fn build(grid: &NodeGrid) -> Sal360Result<Self> {
        let n = grid.len();
        let mut distance = square_table(n, 0.0)?;
        for i in 0..n {
            for j in (i + 1)..n {
                let d = node_distance(&grid.nodes[i], &grid.nodes[j]);
                distance[i * n + j] = d;
                distance[j * n + i] = d;
            }
        }

        let mut affinity = square_table(n, 1.0)?;
        for j in 0..n {
            let column_sum: f64 = (0..n).map(|i| distance[i * n + j]).sum();
            if column_sum > 0.0 {
                for i in 0..n {
                    affinity[i * n + j] = 1.0 - distance[i * n + j] / column_sum;
                }
            }
        }

        Ok(Self {
            n,
            distance,
            affinity,
        })
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn distance(&self, i: usize, j: usize) -> f64 {
        self.distance[i * self.n + j]
    }

    /// Affinity of node `i` seen from node `j` (column `j`).
    pub fn affinity(&self, i: usize, j: usize) -> f64 {
        self.affinity[i * self.n + j]
    }
}

fn square_table(n: usize, fill: f64) -> Sal360Result<Vec<f64>> {
    let too_large = || Sal360Error::allocation(format!("{n}x{n} transition matrix"));
    let len = n.checked_mul(n).ok_or_else(too_large)?;
    let mut table = Vec::new();
    table.try_reserve_exact(len).map_err(|_| too_large())?;
    table.resize(len, fill);
    Ok(table)
}

/// Fixations of one simulated observer.
#[derive(Debug, Clone, Serialize)]
pub struct ObserverPath {
    pub fixations: Vec<Fixation>,
    /// Grid node behind each fixation.
    pub nodes: Vec<usize>,
    /// Steps that fell back to the highest-affinity node.
    pub fallbacks: usize,
}

/// Output of one prediction.
#[derive(Debug, Clone, Serialize)]
pub struct ScanPath {
    pub observers: Vec<ObserverPath>,
    pub degenerate_fallbacks: usize,
}

impl ScanPath {
    /// Total number of fixations.
    pub fn len(&self) -> usize {
        self.observers.iter().map(|o| o.fixations.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten to one row per fixation, observers in order.
    pub fn rows(&self) -> Vec<FixationRow> {
        self.observers
            .iter()
            .enumerate()
            .flat_map(|(observer, path)| {
                path.fixations
                    .iter()
                    .enumerate()
                    .map(move |(index, fixation)| FixationRow {
                        observer,
                        index,
                        fixation: *fixation,
                    })
            })
            .collect()
    }

    pub fn to_csv(&self) -> String {
        rows_to_csv(&self.rows())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.rows())
    }
}

fn gaussian(d: f64, sigma: f64) -> f64 {
    (-d * d / (2.0 * sigma * sigma)).exp()
}

/// Stochastic scan-path generator.
pub struct ScanPathPredictor {
    config: ScanPathConfig,
}

impl ScanPathPredictor {
    pub fn new(config: ScanPathConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ScanPathConfig::default())
    }

    pub fn config(&self) -> &ScanPathConfig {
        &self.config
    }

    /// Predict fixations in the field's own pixel coordinates.
    pub fn predict(&self, field: &SaliencyField) -> Sal360Result<ScanPath> {
        self.predict_scaled(field, field.width(), field.height())
    }

    /// Predict fixations reported in a `source_width × source_height`
    /// panorama (the field may be a downscaled copy).
    pub fn predict_scaled(
        &self,
        field: &SaliencyField,
        source_width: usize,
        source_height: usize,
    ) -> Sal360Result<ScanPath> {
        self.config.validate()?;
        let grid = NodeGrid::build(field, self.config.grid_width, self.config.pyramid_levels)?;
        let matrix = TransitionMatrix::build(&grid)?;
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        tracing::debug!(
            nodes = grid.len(),
            observers = self.config.experiment_repetition,
            fixations = self.config.number_fixations,
            "built scan-path grid"
        );

        let mut observers = Vec::with_capacity(self.config.experiment_repetition);
        for observer in 0..self.config.experiment_repetition {
            let path = self.walk(observer, &grid, &matrix, &mut rng, source_width, source_height);
            observers.push(path);
        }

        let degenerate_fallbacks = observers.iter().map(|o| o.fallbacks).sum();
        if degenerate_fallbacks > 0 {
            tracing::warn!(
                degenerate_fallbacks,
                "scan path fell back to highest-affinity nodes"
            );
        }

        Ok(ScanPath {
            observers,
            degenerate_fallbacks,
        })
    }

    fn start_node(&self, observer: usize, grid: &NodeGrid) -> usize {
        let repetitions = self.config.experiment_repetition.max(1);
        let row = (grid.base_height / 2) as i64;
        let col = ((observer * grid.base_width / repetitions) % grid.base_width) as i64;
        let value = |i: usize| grid.nodes[i].value;

        let mut current = grid.base_index(col, row);
        if value(current) < START_THRESHOLD {
            let r = START_SEARCH_RADIUS as i64;
            for dy in -r..=r {
                for dx in -r..=r {
                    let candidate = grid.base_index(col + dx, row + dy);
                    if value(candidate) > value(current) {
                        current = candidate;
                    }
                }
            }
        }

        // hill-climb on the base level
        for _ in 0..grid.base_width * grid.base_height {
            let node = &grid.nodes[current];
            let (c, r) = (node.col as i64, node.row as i64);
            let mut best = current;
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let candidate = grid.base_index(c + dx, r + dy);
                    if value(candidate) > value(best) {
                        best = candidate;
                    }
                }
            }
            if best == current {
                break;
            }
            current = best;
        }
        current
    }

    /// Choose the node after `current`. The flag is true for a fallback.
    fn next_node(
        &self,
        current: usize,
        recent: &[bool],
        grid: &NodeGrid,
        matrix: &TransitionMatrix,
        rng: &mut StdRng,
    ) -> (usize, bool) {
        let n = grid.len();
        let mut sigma = self.config.falloff_sigma_deg.to_radians();

        for widening in 0..=MAX_WIDENINGS {
            let (mut acceptance, mut min_saliency) = (INITIAL_ACCEPTANCE, INITIAL_MIN_SALIENCY);
            if widening > 0 {
                sigma *= FALLOFF_WIDEN;
            }
            if widening == MAX_WIDENINGS {
                acceptance = 0.0;
                min_saliency = 0.0;
            }

            let scores: Vec<Option<f64>> = (0..n)
                .map(|i| {
                    (!recent[i]).then(|| {
                        matrix.affinity(i, current)
                            * gaussian(matrix.distance(current, i), sigma)
                            * grid.nodes[i].value
                    })
                })
                .collect();
            let Some(best) = scores.iter().flatten().copied().reduce(f64::max) else {
                break;
            };

            for _ in 0..=MAX_RELAXATIONS {
                let mut candidates: Vec<(usize, f64)> = scores
                    .iter()
                    .enumerate()
                    .filter_map(|(i, s)| s.map(|s| (i, s)))
                    .filter(|(i, s)| {
                        grid.nodes[*i].value >= min_saliency && *s >= acceptance * best
                    })
                    .collect();

                if !candidates.is_empty() {
                    candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
                    let k = candidates.len().min(TOP_CANDIDATES);
                    return (candidates[rng.random_range(0..k)].0, false);
                }
                acceptance *= ACCEPTANCE_RELAX;
                min_saliency *= MIN_SALIENCY_RELAX;
            }
        }

        let by_affinity = |i: &usize, j: &usize| {
            matrix
                .affinity(*i, current)
                .total_cmp(&matrix.affinity(*j, current))
        };
        let fallback = (0..n)
            .filter(|i| !recent[*i])
            .max_by(by_affinity)
            .or_else(|| (0..n).filter(|i| *i != current).max_by(by_affinity))
            .unwrap_or(current);
        (fallback, true)
    }

    fn walk(
        &self,
        observer: usize,
        grid: &NodeGrid,
        matrix: &TransitionMatrix,
        rng: &mut StdRng,
        source_width: usize,
        source_height: usize,
    ) -> ObserverPath {
        let count = self.config.number_fixations;
        let mut nodes = Vec::with_capacity(count);
        let mut recent_mask = vec![false; grid.len()];
        let mut recent = VecDeque::with_capacity(REVISIT_WINDOW + 1);
        let mut fallbacks = 0;

        let mut current = self.start_node(observer, grid);
        for step in 0..count {
            if step > 0 {
                let (next, fell_back) = self.next_node(current, &recent_mask, grid, matrix, rng);
                if fell_back {
                    fallbacks += 1;
                    tracing::warn!(observer, step, node = next, "no candidate qualified");
                }
                current = next;
            }
            nodes.push(current);
            recent.push_back(current);
            recent_mask[current] = true;
            if recent.len() > REVISIT_WINDOW {
                if let Some(old) = recent.pop_front() {
                    recent_mask[old] = recent.contains(&old);
                }
            }
        }

        let weights: Vec<f64> = nodes.iter().map(|i| grid.nodes[*i].value).collect();
        let timestamps = dwell_intervals(&weights, self.config.duration_secs);
        let fixations = nodes
            .iter()
            .zip(timestamps)
            .map(|(i, (start, end))| {
                let (x, y) = grid.source_position(*i, source_width, source_height);
                Fixation {
                    x,
                    y,
                    timestamp_start: start,
                    timestamp_end: end,
                    value: grid.nodes[*i].value,
                }
            })
            .collect();

        ObserverPath {
            fixations,
            nodes,
            fallbacks,
        }
    }
}

/// Split `duration` into consecutive intervals proportional to `weights`.
///
/// Negative or non-finite weights count as zero; an all-zero input gets
/// equal intervals. The last interval ends exactly at `duration`.
pub fn dwell_intervals(weights: &[f64], duration: f64) -> Vec<(f64, f64)> {
    if weights.is_empty() {
        return vec![];
    }
    let clean: Vec<f64> = weights
        .iter()
        .map(|w| if w.is_finite() { w.max(0.0) } else { 0.0 })
        .collect();
    let total: f64 = clean.iter().sum();
    let share = |w: f64| {
        if total > 0.0 {
            w / total
        } else {
            1.0 / clean.len() as f64
        }
    };

    let mut elapsed = 0.0;
    let mut out: Vec<(f64, f64)> = clean
        .iter()
        .map(|w| {
            let start = elapsed;
            elapsed = (elapsed + share(*w) * duration).min(duration);
            (start, elapsed)
        })
        .collect();
    if let Some(last) = out.last_mut() {
        last.1 = duration;
    }
    out
}
