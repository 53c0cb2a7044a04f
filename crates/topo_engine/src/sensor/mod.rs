//! Depth camera input
//!
//! A [`device::DepthCamera`] delivers colour, depth and skeleton frames; the
//! [`SensorController`] turns them into GPU textures every poll. Depth samples
//! go through the [`depth::DepthNormalizer`], skeleton joints through the
//! [`smoothing::SkeletonSmoother`] and the [`projector::SkeletonProjector`].

pub mod controller;
pub mod depth;
pub mod device;
pub mod projector;
pub mod recorded;
pub mod skeleton;
pub mod smoothing;
pub mod synthetic;

use std::path::PathBuf;

use thiserror::Error;

use crate::config::settings::{SensorSettings, SensorSource};
use crate::render::effect::EffectError;
use crate::render::RenderError;

pub use controller::SensorController;

/// Camera and sensor pipeline errors
#[derive(Error, Debug)]
pub enum SensorError {
    /// The camera could not be initialised
    #[error("Failed to initialise camera: {0}")]
    DeviceUnavailable(String),

    /// A colour or depth stream could not be opened
    #[error("Failed to open {stream} image stream: {message}")]
    StreamOpen {
        /// Stream name
        stream: &'static str,
        /// Device message
        message: String,
    },

    /// Skeleton tracking could not be enabled
    #[error("Failed to enable skeletal tracking: {0}")]
    SkeletonTracking(String),

    /// Near distance is not below far distance
    #[error("Invalid depth range: near {near_mm} mm must be below far {far_mm} mm")]
    InvalidDepthRange {
        /// Near distance
        near_mm: u16,
        /// Far distance
        far_mm: u16,
    },

    /// A frame does not match the stream it came from
    #[error("Malformed {stream} frame: {message}")]
    MalformedFrame {
        /// Stream name
        stream: &'static str,
        /// What is wrong with it
        message: String,
    },

    /// A recording directory or file is unusable
    #[error("Recording error at {}: {message}", .path.display())]
    Recording {
        /// Offending path
        path: PathBuf,
        /// What went wrong
        message: String,
    },

    /// GPU resource failure
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Converter effect failure
    #[error(transparent)]
    Effect(#[from] EffectError),
}

/// Open the camera selected in the settings
pub fn open_camera(settings: &SensorSettings) -> Result<Box<dyn device::DepthCamera>, SensorError> {
    match settings.source {
        SensorSource::Synthetic => Ok(Box::new(synthetic::SyntheticCamera::new(settings.synthetic.clone()))),
        SensorSource::Recorded => Ok(Box::new(recorded::RecordedCamera::open(&settings.recording_dir)?)),
    }
}
