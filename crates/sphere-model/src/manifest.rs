//! Tiling manifest: the persisted record of an exported tile set.
//!
//! A tile directory holds one image per tile plus `manifest.json`, which
//! lists each file with the orientation it was projected at. The manifest
//! lets independently produced or edited tiles be back-projected later.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::orientation::Orientation;

/// File name of the manifest inside a tile directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Current manifest schema version.
pub const MANIFEST_VERSION: &str = "1.0";

/// Top-level manifest file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TilingManifest {
    /// Schema version.
    pub version: String,

    /// Creation timestamp (ISO 8601).
    pub created_at: String,

    /// Source panorama size (pixels).
    pub source_width: usize,
    pub source_height: usize,

    /// Size of every tile (pixels).
    pub tile_width: usize,
    pub tile_height: usize,

    /// Interpolation kernel used for the forward projection.
    #[serde(default = "default_kernel")]
    pub kernel: String,

    /// One entry per exported tile.
    pub tiles: Vec<ManifestEntry>,
}

/// One exported tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// File name relative to the manifest directory.
    pub file: String,
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
    pub field_of_view: f64,
}

fn default_kernel() -> String {
    "bilinear".to_string()
}

impl ManifestEntry {
    pub fn new(file: impl Into<String>, orientation: &Orientation) -> Self {
        Self {
            file: file.into(),
            yaw: orientation.yaw,
            pitch: orientation.pitch,
            roll: orientation.roll,
            field_of_view: orientation.field_of_view,
        }
    }

    /// The recorded pose, validated.
    pub fn orientation(&self) -> Result<Orientation, ModelError> {
        Orientation::new(self.yaw, self.pitch, self.roll, self.field_of_view)
    }
}

impl TilingManifest {
    /// Create an empty manifest stamped with the current time.
    pub fn new(
        source_width: usize,
        source_height: usize,
        tile_width: usize,
        tile_height: usize,
        kernel: impl Into<String>,
    ) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            source_width,
            source_height,
            tile_width,
            tile_height,
            kernel: kernel.into(),
            tiles: vec![],
        }
    }

    /// Load `manifest.json` from a tile directory.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = dir.as_ref().join(MANIFEST_FILE);
        let json = std::fs::read_to_string(&path).map_err(|e| ModelError::IoError {
            path: path.clone(),
            source: e,
        })?;
        let manifest: TilingManifest =
            serde_json::from_str(&json).map_err(|e| ModelError::ParseError {
                path: path.clone(),
                source: e,
            })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Write `manifest.json` into `dir`, creating it if needed.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<PathBuf, ModelError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| ModelError::IoError {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| ModelError::ParseError {
            path: path.clone(),
            source: e,
        })?;
        std::fs::write(&path, json).map_err(|e| ModelError::IoError {
            path: path.clone(),
            source: e,
        })?;
        Ok(path)
    }

    /// Structural checks: sizes are non-zero and every pose is valid.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.source_width == 0 || self.source_height == 0 {
            return Err(ModelError::ValidationError {
                message: "source size must be non-zero".to_string(),
            });
        }
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(ModelError::ValidationError {
                message: "tile size must be non-zero".to_string(),
            });
        }
        for entry in &self.tiles {
            entry.orientation().map_err(|e| ModelError::ValidationError {
                message: format!("tile {}: {e}", entry.file),
            })?;
        }
        Ok(())
    }

    /// Report tile files listed in the manifest but missing from `dir`.
    pub fn missing_files(&self, dir: impl AsRef<Path>) -> Vec<String> {
        let dir = dir.as_ref();
        self.tiles
            .iter()
            .filter(|entry| !dir.join(&entry.file).exists())
            .map(|entry| format!("Tile missing: {}", entry.file))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest() -> TilingManifest {
        let mut manifest = TilingManifest::new(2048, 1024, 512, 512, "bicubic");
        for (i, yaw) in [0.0, 45.0].iter().enumerate() {
            let o = Orientation::new(*yaw, 0.0, 0.0, 90.0).unwrap();
            manifest
                .tiles
                .push(ManifestEntry::new(format!("tile_{i:03}.png"), &o));
        }
        manifest
    }

    #[test]
    fn test_manifest_save_and_load() {
        let dir = std::env::temp_dir().join("sal360_test_manifest");
        let _ = std::fs::remove_dir_all(&dir);

        let manifest = sample_manifest();
        manifest.save(&dir).unwrap();

        let loaded = TilingManifest::load(&dir).unwrap();
        assert_eq!(loaded.tiles, manifest.tiles);
        assert_eq!(loaded.kernel, "bicubic");
        assert_eq!(loaded.version, MANIFEST_VERSION);

        let missing = loaded.missing_files(&dir);
        assert_eq!(missing.len(), 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_fov_is_rejected() {
        let mut manifest = sample_manifest();
        manifest.tiles[1].field_of_view = 200.0;
        assert!(matches!(
            manifest.validate(),
            Err(ModelError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_kernel_defaults_for_older_files() {
        let mut value = serde_json::to_value(sample_manifest()).unwrap();
        value.as_object_mut().unwrap().remove("kernel");
        let parsed: TilingManifest = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.kernel, "bilinear");
    }

    #[test]
    fn test_load_missing_directory_is_io_error() {
        let dir = std::env::temp_dir().join("sal360_test_manifest_absent");
        let _ = std::fs::remove_dir_all(&dir);
        assert!(matches!(
            TilingManifest::load(&dir),
            Err(ModelError::IoError { .. })
        ));
    }
}
