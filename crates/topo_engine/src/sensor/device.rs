//! Camera device contract
//!
//! The minimal polling interface the sensor pipeline needs: open the streams,
//! fetch the next frame of each kind without blocking, project skeleton
//! positions into the depth image and shut down. Frames are released when
//! dropped.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::foundation::math::{Vec2, Vec3};
use crate::sensor::skeleton::SkeletonFrame;
use crate::sensor::SensorError;

/// Bytes per colour texel (BGRA)
pub const COLOUR_BYTES_PER_PIXEL: usize = 4;

/// Bytes per depth sample (little-endian u16 millimetres)
pub const DEPTH_BYTES_PER_PIXEL: usize = 2;

/// Focal length of the sensor's depth camera in 320x240 pixels
pub const DEPTH_FOCAL_LENGTH_320X240: f32 = 285.63;

/// Image stream size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Resolution {
    /// Construct a resolution
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixels per image
    pub const fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

/// One locked image buffer
///
/// `pitch` is the byte length of a row in `data`; devices report zero for
/// a buffer they failed to fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFrame {
    /// Sensor frame counter
    pub frame_number: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes per row
    pub pitch: usize,
    /// Row-major pixel data
    pub data: Vec<u8>,
}

impl ImageFrame {
    /// Tightly packed frame
    pub fn packed(frame_number: u32, width: u32, height: u32, bytes_per_pixel: usize, data: Vec<u8>) -> Self {
        Self {
            frame_number,
            width,
            height,
            pitch: width as usize * bytes_per_pixel,
            data,
        }
    }

    /// Whether the device handed over an empty buffer
    pub const fn is_bogus(&self) -> bool {
        self.pitch == 0
    }

    /// Frame size
    pub const fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Pixel rows without pitch padding
    ///
    /// Borrows the buffer when rows are already packed.
    pub fn packed_rows(&self, bytes_per_pixel: usize, stream: &'static str) -> Result<Cow<'_, [u8]>, SensorError> {
        let row = self.width as usize * bytes_per_pixel;
        let height = self.height as usize;
        if self.pitch < row || self.data.len() < self.pitch * height.saturating_sub(1) + row {
            return Err(SensorError::MalformedFrame {
                stream,
                message: format!(
                    "{} bytes with pitch {} cannot hold {}x{} pixels",
                    self.data.len(),
                    self.pitch,
                    self.width,
                    self.height
                ),
            });
        }

        if self.pitch == row {
            return Ok(Cow::Borrowed(&self.data[..row * height]));
        }
        let mut packed = Vec::with_capacity(row * height);
        for y in 0..height {
            let start = y * self.pitch;
            packed.extend_from_slice(&self.data[start..start + row]);
        }
        Ok(Cow::Owned(packed))
    }
}

/// Pinhole projection of a camera-space point into normalised depth image
/// coordinates, origin top-left
///
/// Points at or behind the sensor project to the origin.
pub fn project_to_depth_image(point: &Vec3) -> Vec2 {
    if point.z <= f32::EPSILON {
        return Vec2::zeros();
    }
    Vec2::new(
        0.5 + point.x * (DEPTH_FOCAL_LENGTH_320X240 / point.z) / 320.0,
        0.5 - point.y * (DEPTH_FOCAL_LENGTH_320X240 / point.z) / 240.0,
    )
}

/// Depth camera with colour, depth and skeleton streams
pub trait DepthCamera {
    /// Human-readable device name
    fn name(&self) -> &str;

    /// Open the colour stream; returns the resolution actually delivered
    fn open_colour_stream(&mut self, requested: Resolution) -> Result<Resolution, SensorError>;

    /// Open the depth stream; returns the resolution actually delivered
    fn open_depth_stream(&mut self, requested: Resolution) -> Result<Resolution, SensorError>;

    /// Start reporting skeletons
    fn enable_skeleton_tracking(&mut self) -> Result<(), SensorError>;

    /// Next BGRA colour frame, if one is ready
    fn next_colour_frame(&mut self) -> Option<ImageFrame>;

    /// Next depth frame (little-endian u16 millimetres), if one is ready
    fn next_depth_frame(&mut self) -> Option<ImageFrame>;

    /// Next skeleton frame, if one is ready
    fn next_skeleton_frame(&mut self) -> Option<SkeletonFrame>;

    /// Project a skeleton position into normalised depth image coordinates
    fn project_to_depth_image(&self, point: &Vec3) -> Vec2 {
        project_to_depth_image(point)
    }

    /// Release the device
    fn shutdown(&mut self);
}
