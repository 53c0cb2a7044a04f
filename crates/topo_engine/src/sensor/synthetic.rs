//! Generated camera for running without hardware
//!
//! A sphere orbits in front of a flat back wall and a single skeleton waves
//! its right hand. Every call returns a fresh frame, so the scene animates
//! at the render loop's rate.

use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::foundation::math::Vec3;
use crate::sensor::device::{DepthCamera, ImageFrame, Resolution, COLOUR_BYTES_PER_PIXEL, DEPTH_BYTES_PER_PIXEL};
use crate::sensor::skeleton::{Joint, SkeletonFrame, TrackingState, JOINT_COUNT};
use crate::sensor::SensorError;

/// Scene parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticSettings {
    /// Back wall distance in millimetres
    pub wall_distance_mm: u16,
    /// Distance of the sphere's silhouette plane in millimetres
    pub sphere_distance_mm: u16,
    /// How far the sphere bulges towards the camera in millimetres
    pub sphere_relief_mm: u16,
    /// Sphere radius as a fraction of image height
    pub sphere_radius: f32,
    /// Orbit radius as a fraction of image height
    pub orbit_radius: f32,
    /// Frames per orbit and per wave
    pub period_frames: u32,
    /// Distance of the skeleton from the sensor in metres
    pub skeleton_distance_m: f32,
    /// Whether skeleton frames are produced
    pub track_skeleton: bool,
}

impl Default for SyntheticSettings {
    fn default() -> Self {
        Self {
            wall_distance_mm: 3600,
            sphere_distance_mm: 2200,
            sphere_relief_mm: 600,
            sphere_radius: 0.2,
            orbit_radius: 0.2,
            period_frames: 240,
            skeleton_distance_m: 2.0,
            track_skeleton: true,
        }
    }
}

/// Joint offsets from the body centre of a standing pose, metres
const POSE: [[f32; 2]; JOINT_COUNT] = [
    [0.0, 0.0],     // hip centre
    [0.0, 0.15],    // spine
    [0.0, 0.5],     // shoulder centre
    [0.0, 0.7],     // head
    [-0.2, 0.45],   // shoulder left
    [-0.3, 0.2],    // elbow left
    [-0.35, -0.05], // wrist left
    [-0.37, -0.12], // hand left
    [0.2, 0.45],    // shoulder right
    [0.35, 0.6],    // elbow right
    [0.4, 0.85],    // wrist right
    [0.42, 0.92],   // hand right
    [-0.1, -0.05],  // hip left
    [-0.12, -0.5],  // knee left
    [-0.12, -0.9],  // ankle left
    [-0.14, -0.97], // foot left
    [0.1, -0.05],   // hip right
    [0.12, -0.5],   // knee right
    [0.12, -0.9],   // ankle right
    [0.14, -0.97],  // foot right
];

/// Deterministic generated camera
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    settings: SyntheticSettings,
    colour: Option<Resolution>,
    depth: Option<Resolution>,
    skeleton: bool,
    colour_frames: u32,
    depth_frames: u32,
    skeleton_frames: u32,
}

impl SyntheticCamera {
    /// Camera with all streams closed
    pub const fn new(settings: SyntheticSettings) -> Self {
        Self {
            settings,
            colour: None,
            depth: None,
            skeleton: false,
            colour_frames: 0,
            depth_frames: 0,
            skeleton_frames: 0,
        }
    }

    /// Scene parameters
    pub const fn settings(&self) -> &SyntheticSettings {
        &self.settings
    }

    #[allow(clippy::cast_precision_loss)]
    fn phase(&self, frame: u32) -> f32 {
        let period = self.settings.period_frames.max(1);
        (frame % period) as f32 / period as f32 * TAU
    }

    /// Sphere centre and radius in pixels
    #[allow(clippy::cast_precision_loss)]
    fn sphere(&self, resolution: Resolution, frame: u32) -> (f32, f32, f32) {
        let (w, h) = (resolution.width as f32, resolution.height as f32);
        let angle = self.phase(frame);
        let orbit = self.settings.orbit_radius * h;
        (
            w * 0.5 + orbit * angle.cos(),
            h * 0.5 + orbit * angle.sin(),
            (self.settings.sphere_radius * h).max(1.0),
        )
    }

    /// Height of the sphere cap above its silhouette at a pixel, in `[0, 1]`
    #[allow(clippy::cast_precision_loss)]
    fn bulge(sphere: (f32, f32, f32), x: u32, y: u32) -> Option<f32> {
        let (cx, cy, r) = sphere;
        let dx = x as f32 + 0.5 - cx;
        let dy = y as f32 + 0.5 - cy;
        let d2 = (dx * dx + dy * dy) / (r * r);
        (d2 < 1.0).then(|| (1.0 - d2).sqrt())
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn colour_frame(&self, resolution: Resolution, frame: u32) -> ImageFrame {
        let sphere = self.sphere(resolution, frame);
        let mut data = Vec::with_capacity(resolution.pixel_count() * COLOUR_BYTES_PER_PIXEL);
        for y in 0..resolution.height {
            for x in 0..resolution.width {
                let [r, g, b] = match Self::bulge(sphere, x, y) {
                    Some(h) => [255, (120.0 + 100.0 * h) as u8, 40],
                    None => {
                        let shade = 60 + (x * 80 / resolution.width.max(1)) as u8;
                        [shade, shade, 90 + (y * 100 / resolution.height.max(1)) as u8]
                    }
                };
                data.extend_from_slice(&[b, g, r, 255]);
            }
        }
        ImageFrame::packed(frame, resolution.width, resolution.height, COLOUR_BYTES_PER_PIXEL, data)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn depth_frame(&self, resolution: Resolution, frame: u32) -> ImageFrame {
        let sphere = self.sphere(resolution, frame);
        let relief = f32::from(self.settings.sphere_relief_mm);
        let mut data = Vec::with_capacity(resolution.pixel_count() * DEPTH_BYTES_PER_PIXEL);
        for y in 0..resolution.height {
            for x in 0..resolution.width {
                let depth = match Self::bulge(sphere, x, y) {
                    Some(h) => self.settings.sphere_distance_mm.saturating_sub((relief * h) as u16),
                    None => self.settings.wall_distance_mm,
                };
                data.extend_from_slice(&depth.to_le_bytes());
            }
        }
        ImageFrame::packed(frame, resolution.width, resolution.height, DEPTH_BYTES_PER_PIXEL, data)
    }

    fn skeleton_frame(&self, frame: u32) -> SkeletonFrame {
        let mut skeletons = SkeletonFrame {
            frame_number: frame,
            ..SkeletonFrame::default()
        };
        let body = &mut skeletons.skeletons[0];
        body.tracking_state = TrackingState::Tracked;
        body.tracking_id = 1;
        body.position = Vec3::new(0.0, 0.0, self.settings.skeleton_distance_m);

        for (joint, [x, y]) in Joint::ALL.iter().zip(POSE) {
            body.set_joint(*joint, Vec3::new(x, y, self.settings.skeleton_distance_m));
        }

        // Wave the right forearm about the elbow
        let elbow = body.joint(Joint::ElbowRight);
        let swing = 0.6 * self.phase(frame).sin();
        for (joint, reach) in [(Joint::WristRight, 0.26), (Joint::HandRight, 0.34)] {
            let offset = Vec3::new(reach * swing.sin(), reach * swing.cos(), -0.1);
            body.set_joint(joint, elbow + offset);
        }
        skeletons
    }
}

fn open_stream(stream: &'static str, requested: Resolution) -> Result<Resolution, SensorError> {
    if requested.width == 0 || requested.height == 0 {
        return Err(SensorError::StreamOpen {
            stream,
            message: format!("unsupported resolution {}x{}", requested.width, requested.height),
        });
    }
    Ok(requested)
}

impl DepthCamera for SyntheticCamera {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn open_colour_stream(&mut self, requested: Resolution) -> Result<Resolution, SensorError> {
        let resolution = open_stream("colour", requested)?;
        self.colour = Some(resolution);
        Ok(resolution)
    }

    fn open_depth_stream(&mut self, requested: Resolution) -> Result<Resolution, SensorError> {
        let resolution = open_stream("depth", requested)?;
        self.depth = Some(resolution);
        Ok(resolution)
    }

    fn enable_skeleton_tracking(&mut self) -> Result<(), SensorError> {
        self.skeleton = true;
        Ok(())
    }

    fn next_colour_frame(&mut self) -> Option<ImageFrame> {
        let resolution = self.colour?;
        let frame = self.colour_frame(resolution, self.colour_frames);
        self.colour_frames = self.colour_frames.wrapping_add(1);
        Some(frame)
    }

    fn next_depth_frame(&mut self) -> Option<ImageFrame> {
        let resolution = self.depth?;
        let frame = self.depth_frame(resolution, self.depth_frames);
        self.depth_frames = self.depth_frames.wrapping_add(1);
        Some(frame)
    }

    fn next_skeleton_frame(&mut self) -> Option<SkeletonFrame> {
        if !self.skeleton || !self.settings.track_skeleton {
            return None;
        }
        let frame = self.skeleton_frame(self.skeleton_frames);
        self.skeleton_frames = self.skeleton_frames.wrapping_add(1);
        Some(frame)
    }

    fn shutdown(&mut self) {
        log::debug!("Synthetic camera shut down after {} depth frames", self.depth_frames);
        self.colour = None;
        self.depth = None;
        self.skeleton = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::projector::is_valid_joint;

    fn opened() -> SyntheticCamera {
        let mut camera = SyntheticCamera::new(SyntheticSettings::default());
        camera.open_colour_stream(Resolution::new(64, 48)).unwrap();
        camera.open_depth_stream(Resolution::new(64, 48)).unwrap();
        camera.enable_skeleton_tracking().unwrap();
        camera
    }

    #[test]
    fn test_closed_streams_yield_nothing() {
        let mut camera = SyntheticCamera::new(SyntheticSettings::default());
        assert!(camera.next_colour_frame().is_none());
        assert!(camera.next_depth_frame().is_none());
        assert!(camera.next_skeleton_frame().is_none());
    }

    #[test]
    fn test_zero_resolution_rejected() {
        let mut camera = SyntheticCamera::new(SyntheticSettings::default());
        assert!(matches!(
            camera.open_depth_stream(Resolution::new(0, 48)),
            Err(SensorError::StreamOpen { stream: "depth", .. })
        ));
    }

    #[test]
    fn test_depth_frame_has_wall_and_sphere() {
        let mut camera = opened();
        let frame = camera.next_depth_frame().unwrap();
        assert_eq!(frame.data.len(), 64 * 48 * 2);
        assert_eq!(frame.pitch, 128);

        let samples: Vec<u16> = frame.data.chunks_exact(2).map(|b| u16::from_le_bytes([b[0], b[1]])).collect();
        assert_eq!(samples[0], 3600);
        assert!(samples.iter().any(|s| *s < 2200));
        assert!(samples.iter().all(|s| *s >= 2200 - 600));
    }

    #[test]
    fn test_colour_frame_is_bgra() {
        let mut camera = opened();
        let frame = camera.next_colour_frame().unwrap();
        assert_eq!(frame.data.len(), 64 * 48 * 4);
        assert!(frame.data.chunks_exact(4).all(|p| p[3] == 255));
    }

    #[test]
    fn test_frames_advance() {
        let mut camera = opened();
        let first = camera.next_depth_frame().unwrap();
        let second = camera.next_depth_frame().unwrap();
        assert_eq!(second.frame_number, first.frame_number + 1);
        assert_ne!(first.data, second.data);
    }

    #[test]
    fn test_skeleton_is_tracked_and_valid() {
        let mut camera = opened();
        let frame = camera.next_skeleton_frame().unwrap();
        let tracked: Vec<_> = frame.tracked().collect();
        assert_eq!(tracked.len(), 1);
        assert!(tracked[0].joints.iter().all(is_valid_joint));
    }

    #[test]
    fn test_shutdown_closes_streams() {
        let mut camera = opened();
        camera.shutdown();
        assert!(camera.next_depth_frame().is_none());
        assert!(camera.next_skeleton_frame().is_none());
    }
}
