//! Application configuration.
//!
//! A configuration value is built once per request (from defaults, a JSON
//! file, or CLI flags) and passed explicitly to every stage.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Sal360Error, Sal360Result};

/// Largest accepted tile edge (pixels).
pub const MAX_TILE_SIZE: usize = 8192;

/// Largest scan-path base grid width. The transition matrix is quadratic
/// in the node count.
pub const MAX_GRID_WIDTH: usize = 128;

/// Most pyramid levels a scan-path grid may have.
pub const MAX_PYRAMID_LEVELS: usize = 8;

/// Full application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Tiled saliency estimation settings.
    pub pipeline: PipelineConfig,

    /// Scan-path synthesis settings.
    pub scanpath: ScanPathConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Settings for the project → compute → back-project pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker threads per stage.
    pub threads: usize,

    /// Tile aperture in degrees, strictly inside (0, 180).
    pub field_of_view: f64,

    /// Tile edge in pixels. `None` derives it from the panorama width.
    pub tile_size: Option<usize>,

    /// Cap on the larger dimension of the fused map.
    pub max_dimension: usize,

    /// Only tile the horizon row.
    pub equatorial_only: bool,

    /// Resampling kernel for both projection directions.
    pub kernel: KernelKind,

    /// Ask the model for `[0, 1]` fields per tile.
    pub normalize_tiles: bool,

    /// Gaussian blur of the fused map in pixels (0 disables).
    pub blur_sigma: f64,

    /// Upper bound on the blur kernel radius in pixels.
    pub blur_max_radius: usize,

    /// Min–max rescale the fused map into `[0, 1]`.
    pub normalize_output: bool,

    /// Latitude prior applied after fusion.
    pub prior: PriorMode,

    /// Saliency strategy selection and its parameters.
    pub model: ModelConfig,
}

/// Saliency strategy and strategy-specific parameters.
///
/// Parameters belonging to a strategy other than `kind` are ignored and
/// reported as [`ConfigWarning`]s by [`PipelineConfig::validate`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub kind: ModelKind,

    /// Contrast: number of centre–surround scales.
    pub contrast_levels: Option<usize>,

    /// Contrast: centre sigma of the finest scale, in pixels.
    pub contrast_center_sigma: Option<f64>,

    /// Contrast: surround sigma as a multiple of the centre sigma.
    pub contrast_surround_ratio: Option<f64>,

    /// Constant: value returned for every pixel.
    pub constant_value: Option<f32>,
}

/// Available saliency strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Multi-scale centre–surround luminance contrast.
    #[default]
    Contrast,
    /// Same value everywhere.
    Constant,
    /// Input tiles already hold saliency in their first channel.
    Passthrough,
}

/// Interpolation kernels, selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelKind {
    Nearest,
    #[default]
    Bilinear,
    Bicubic,
}

/// Equatorial prior mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorMode {
    #[default]
    Off,
    /// Mixture centred on the equator.
    Fixed,
    /// Mixture re-centred on the latitude with most saliency mass.
    Adaptive,
}

/// Settings for the stochastic scan-path walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanPathConfig {
    /// Number of simulated observers.
    pub experiment_repetition: usize,

    /// Fixations per observer.
    pub number_fixations: usize,

    /// Total viewing time per observer in seconds.
    pub duration_secs: f64,

    /// RNG seed.
    pub seed: u64,

    /// Columns of the finest grid level (rows are half of this).
    pub grid_width: usize,

    /// Levels in the node pyramid, finest first.
    pub pyramid_levels: usize,

    /// Initial standard deviation of the angular falloff, in degrees.
    pub falloff_sigma_deg: f64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "sal360_processing_core=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

/// Non-fatal configuration problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    /// Offending parameter name.
    pub parameter: &'static str,
    /// Strategy that actually uses the parameter.
    pub belongs_to: ModelKind,
    /// Strategy currently selected.
    pub selected: ModelKind,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parameter `{}` only applies to the {} model; ignored because {} is selected",
            self.parameter, self.belongs_to, self.selected
        )
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            field_of_view: 90.0,
            tile_size: None,
            max_dimension: 2048,
            equatorial_only: false,
            kernel: KernelKind::Bilinear,
            normalize_tiles: true,
            blur_sigma: 0.0,
            blur_max_radius: 25,
            normalize_output: true,
            prior: PriorMode::Off,
            model: ModelConfig::default(),
        }
    }
}

impl Default for ScanPathConfig {
    fn default() -> Self {
        Self {
            experiment_repetition: 10,
            number_fixations: 25,
            duration_secs: 20.0,
            seed: 42,
            grid_width: 32,
            pyramid_levels: 2,
            falloff_sigma_deg: 20.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ModelConfig {
    pub fn contrast_levels(&self) -> usize {
        self.contrast_levels.unwrap_or(3).max(1)
    }

    pub fn contrast_center_sigma(&self) -> f64 {
        self.contrast_center_sigma.unwrap_or(1.5)
    }

    pub fn contrast_surround_ratio(&self) -> f64 {
        self.contrast_surround_ratio.unwrap_or(4.0)
    }

    pub fn constant_value(&self) -> f32 {
        self.constant_value.unwrap_or(1.0)
    }

    /// Parameters supplied for a strategy other than the selected one.
    pub fn warnings(&self) -> Vec<ConfigWarning> {
        let supplied = [
            (
                "contrast_levels",
                ModelKind::Contrast,
                self.contrast_levels.is_some(),
            ),
            (
                "contrast_center_sigma",
                ModelKind::Contrast,
                self.contrast_center_sigma.is_some(),
            ),
            (
                "contrast_surround_ratio",
                ModelKind::Contrast,
                self.contrast_surround_ratio.is_some(),
            ),
            (
                "constant_value",
                ModelKind::Constant,
                self.constant_value.is_some(),
            ),
        ];

        supplied
            .into_iter()
            .filter(|(_, owner, present)| *present && *owner != self.kind)
            .map(|(parameter, belongs_to, _)| ConfigWarning {
                parameter,
                belongs_to,
                selected: self.kind,
            })
            .collect()
    }
}

impl PipelineConfig {
    /// Check numeric ranges. Fatal problems are errors; parameters for an
    /// unselected strategy come back as warnings and are also logged.
    pub fn validate(&self) -> Sal360Result<Vec<ConfigWarning>> {
        if !(self.field_of_view > 0.0 && self.field_of_view < 180.0) {
            return Err(Sal360Error::config(format!(
                "field_of_view must be inside (0, 180), got {}",
                self.field_of_view
            )));
        }
        if self.threads == 0 {
            return Err(Sal360Error::config("threads must be at least 1"));
        }
        if self.max_dimension < 4 {
            return Err(Sal360Error::config("max_dimension must be at least 4"));
        }
        match self.tile_size {
            Some(0) => return Err(Sal360Error::config("tile_size must be non-zero")),
            Some(size) if size > MAX_TILE_SIZE => {
                return Err(Sal360Error::config(format!(
                    "tile_size must be at most {MAX_TILE_SIZE}, got {size}"
                )));
            }
            _ => {}
        }
        if !self.blur_sigma.is_finite() || self.blur_sigma < 0.0 {
            return Err(Sal360Error::config("blur_sigma must be finite and >= 0"));
        }
        if self.model.contrast_center_sigma() <= 0.0 || self.model.contrast_surround_ratio() <= 1.0
        {
            return Err(Sal360Error::config(
                "contrast sigmas must be positive with surround_ratio > 1",
            ));
        }

        let warnings = self.model.warnings();
        for warning in &warnings {
            tracing::warn!("{warning}");
        }
        Ok(warnings)
    }
}

impl ScanPathConfig {
    pub fn validate(&self) -> Sal360Result<()> {
        if self.experiment_repetition == 0 || self.number_fixations == 0 {
            return Err(Sal360Error::config(
                "experiment_repetition and number_fixations must be at least 1",
            ));
        }
        if !(self.duration_secs.is_finite() && self.duration_secs > 0.0) {
            return Err(Sal360Error::config("duration_secs must be positive"));
        }
        if !(4..=MAX_GRID_WIDTH).contains(&self.grid_width) {
            return Err(Sal360Error::config(format!(
                "grid_width must be within [4, {MAX_GRID_WIDTH}], got {}",
                self.grid_width
            )));
        }
        if !(1..=MAX_PYRAMID_LEVELS).contains(&self.pyramid_levels) {
            return Err(Sal360Error::config(format!(
                "pyramid_levels must be within [1, {MAX_PYRAMID_LEVELS}], got {}",
                self.pyramid_levels
            )));
        }
        if !(self.falloff_sigma_deg.is_finite() && self.falloff_sigma_deg > 0.0) {
            return Err(Sal360Error::config("falloff_sigma_deg must be positive"));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit JSON file.
    pub fn load_from(path: impl AsRef<Path>) -> Sal360Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Sal360Error::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

macro_rules! named_enum {
    ($ty:ty, $($name:literal => $variant:path),+ $(,)?) => {
        impl $ty {
            /// Parse a lowercase name.
            pub fn from_name(name: &str) -> Option<Self> {
                match name.trim().to_ascii_lowercase().as_str() {
                    $($name => Some($variant),)+
                    _ => None,
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $($variant => $name,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = Sal360Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_name(s).ok_or_else(|| {
                    Sal360Error::config(format!(
                        "unknown {} `{}` (expected one of: {})",
                        stringify!($ty),
                        s,
                        [$($name),+].join(", ")
                    ))
                })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

named_enum!(ModelKind,
    "contrast" => ModelKind::Contrast,
    "constant" => ModelKind::Constant,
    "passthrough" => ModelKind::Passthrough,
);

named_enum!(KernelKind,
    "nearest" => KernelKind::Nearest,
    "bilinear" => KernelKind::Bilinear,
    "bicubic" => KernelKind::Bicubic,
);

named_enum!(PriorMode,
    "off" => PriorMode::Off,
    "fixed" => PriorMode::Fixed,
    "adaptive" => PriorMode::Adaptive,
);

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("sal360").join("config.json")
}
