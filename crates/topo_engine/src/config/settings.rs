//! Application settings

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::sensor::depth::{DepthRange, MAX_DISTANCE_MM, MIN_DISTANCE_MM};
use crate::sensor::device::Resolution;
use crate::sensor::smoothing::SmoothingParams;
use crate::sensor::synthetic::SyntheticSettings;
use crate::sensor::SensorError;

/// Top-level settings file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Window setup
    pub window: WindowSettings,
    /// Camera and depth range
    pub sensor: SensorSettings,
    /// Topography mesh and projection
    pub topography: TopographySettings,
    /// Effect files
    pub effects: EffectPaths,
}

impl Config for AppSettings {}

/// Window setup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    /// Title bar text
    pub title: String,
    /// Initial width in pixels
    pub width: u32,
    /// Initial height in pixels
    pub height: u32,
    /// Wait for vertical sync on present
    pub vsync: bool,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            title: "Augmented Reality Gallery".to_string(),
            width: 640,
            height: 480,
            vsync: true,
        }
    }
}

/// Where frames come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorSource {
    /// Generated scene
    #[default]
    Synthetic,
    /// PNG recording directory
    Recorded,
}

/// Camera and depth range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSettings {
    /// Frame source
    pub source: SensorSource,
    /// Depth mapped to black, millimetres
    pub near_mm: u16,
    /// Depth mapped to white, millimetres
    pub far_mm: u16,
    /// Requested colour stream size
    pub colour_resolution: Resolution,
    /// Requested depth stream size
    pub depth_resolution: Resolution,
    /// Directory for [`SensorSource::Recorded`]
    pub recording_dir: PathBuf,
    /// Scene for [`SensorSource::Synthetic`]
    pub synthetic: SyntheticSettings,
    /// Skeleton joint filter
    pub smoothing: SmoothingParams,
}

impl SensorSettings {
    /// Validated depth range
    pub fn depth_range(&self) -> Result<DepthRange, SensorError> {
        DepthRange::new(self.near_mm, self.far_mm)
    }
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            source: SensorSource::default(),
            near_mm: MIN_DISTANCE_MM,
            far_mm: MAX_DISTANCE_MM,
            colour_resolution: Resolution::default(),
            depth_resolution: Resolution::default(),
            recording_dir: PathBuf::from("recordings/default"),
            synthetic: SyntheticSettings::default(),
            smoothing: SmoothingParams::default(),
        }
    }
}

/// Topography mesh and projection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopographySettings {
    /// World units between grid points
    pub cell_size: f32,
    /// Extra room in front of near and behind far, centimetres
    pub depth_padding_cm: f32,
    /// Key light colour
    pub light_colour: [f32; 3],
    /// Specular exponent
    pub shininess: f32,
}

impl Default for TopographySettings {
    fn default() -> Self {
        Self {
            cell_size: 3.0,
            depth_padding_cm: 10.0,
            light_colour: [1.0, 1.0, 1.0],
            shininess: 25.0,
        }
    }
}

/// Effect file locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectPaths {
    /// Colour stream converter
    pub colour_converter: PathBuf,
    /// Depth stream converter
    pub depth_converter: PathBuf,
    /// Topography geometry
    pub depth_geometry: PathBuf,
}

impl Default for EffectPaths {
    fn default() -> Self {
        Self {
            colour_converter: PathBuf::from("resources/shaders/colour_converter.ron"),
            depth_converter: PathBuf::from("resources/shaders/depth_converter.ron"),
            depth_geometry: PathBuf::from("resources/shaders/depth_geometry.ron"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;

    #[test]
    fn test_defaults_match_sensor_limits() {
        let settings = AppSettings::default();
        assert_eq!((settings.window.width, settings.window.height), (640, 480));
        assert_eq!((settings.sensor.near_mm, settings.sensor.far_mm), (801, 3975));
        assert_eq!(settings.topography.cell_size, 3.0);
        assert_eq!(settings.topography.depth_padding_cm, 10.0);
        assert!(settings.sensor.depth_range().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");
        std::fs::write(&path, "[sensor]\nsource = \"recorded\"\nnear_mm = 900\n\n[window]\nvsync = false\n").unwrap();

        let settings = AppSettings::load_from_file(&path).unwrap();
        assert_eq!(settings.sensor.source, SensorSource::Recorded);
        assert_eq!(settings.sensor.near_mm, 900);
        assert_eq!(settings.sensor.far_mm, 3975);
        assert!(!settings.window.vsync);
        assert_eq!(settings.window.width, 640);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = AppSettings::default();
        settings.topography.cell_size = 2.5;
        settings.sensor.smoothing.jitter_radius = 0.1;

        for name in ["app.toml", "app.ron"] {
            let path = dir.path().join(name);
            settings.save_to_file(&path).unwrap();
            assert_eq!(AppSettings::load_from_file(&path).unwrap(), settings);
        }
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = AppSettings::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, AppSettings::default());
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.json");
        std::fs::write(&path, "{}").unwrap();
        assert!(matches!(AppSettings::load_from_file(&path), Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_inverted_range_reported() {
        let settings = SensorSettings {
            near_mm: 4000,
            ..SensorSettings::default()
        };
        assert!(settings.depth_range().is_err());
    }
}
