//! Holt double exponential joint smoothing
//!
//! Each joint keeps a filtered position and a trend. Movement inside the
//! jitter radius is damped, the output is predicted ahead along the trend,
//! and the prediction is pulled back when it strays more than the maximum
//! deviation from the raw sample.

use serde::{Deserialize, Serialize};

use crate::foundation::math::Vec3;
use crate::sensor::projector::is_valid_joint;
use crate::sensor::skeleton::{SkeletonData, SkeletonFrame, JOINT_COUNT, SKELETON_COUNT};

/// Filter parameters, distances in metres
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingParams {
    /// Weight of the previous estimate, `[0, 1)`
    pub smoothing: f32,
    /// How fast the trend follows the data, `[0, 1]`
    pub correction: f32,
    /// Frames to predict ahead
    pub prediction: f32,
    /// Movement below this is treated as jitter
    pub jitter_radius: f32,
    /// Largest allowed distance between prediction and raw data
    pub max_deviation_radius: f32,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            smoothing: 0.5,
            correction: 0.5,
            prediction: 0.5,
            jitter_radius: 0.05,
            max_deviation_radius: 0.04,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct JointHistory {
    raw: Vec3,
    filtered: Vec3,
    trend: Vec3,
    frames: u32,
}

#[derive(Debug, Clone)]
struct BodyHistory {
    tracking_id: Option<u32>,
    joints: [JointHistory; JOINT_COUNT],
}

impl Default for BodyHistory {
    fn default() -> Self {
        Self {
            tracking_id: None,
            joints: [JointHistory::default(); JOINT_COUNT],
        }
    }
}

/// Per-slot joint filter for skeleton frames
#[derive(Debug, Clone)]
pub struct SkeletonSmoother {
    params: SmoothingParams,
    bodies: [BodyHistory; SKELETON_COUNT],
}

impl SkeletonSmoother {
    /// Smoother with the given parameters
    pub fn new(params: SmoothingParams) -> Self {
        Self {
            params,
            bodies: Default::default(),
        }
    }

    /// Active parameters
    pub const fn params(&self) -> SmoothingParams {
        self.params
    }

    /// Forget all history
    pub fn reset(&mut self) {
        self.bodies = Default::default();
    }

    /// Smooth every tracked body in place
    ///
    /// History is dropped for slots that lose tracking or change body.
    pub fn apply(&mut self, frame: &mut SkeletonFrame) {
        for (history, skeleton) in self.bodies.iter_mut().zip(frame.skeletons.iter_mut()) {
            if !skeleton.is_tracked() {
                *history = BodyHistory::default();
                continue;
            }
            if history.tracking_id != Some(skeleton.tracking_id) {
                *history = BodyHistory {
                    tracking_id: Some(skeleton.tracking_id),
                    ..BodyHistory::default()
                };
            }
            Self::smooth_body(&self.params, history, skeleton);
        }
    }

    fn smooth_body(params: &SmoothingParams, history: &mut BodyHistory, skeleton: &mut SkeletonData) {
        for (joint, position) in history.joints.iter_mut().zip(skeleton.joints.iter_mut()) {
            if !is_valid_joint(position) {
                *joint = JointHistory::default();
                continue;
            }
            *position = Self::smooth_joint(params, joint, *position);
        }
    }

    fn smooth_joint(params: &SmoothingParams, history: &mut JointHistory, sample: Vec3) -> Vec3 {
        let mut raw = sample;
        let (filtered, trend) = match history.frames {
            0 => (raw, Vec3::zeros()),
            1 => {
                let filtered = (raw + history.raw) * 0.5;
                let diff = filtered - history.filtered;
                (filtered, diff * params.correction + history.trend * (1.0 - params.correction))
            }
            _ => {
                let diff = raw - history.filtered;
                let length = diff.norm();
                if params.jitter_radius > 0.0 && length <= params.jitter_radius {
                    let t = length / params.jitter_radius;
                    raw = raw * t + history.filtered * (1.0 - t);
                }
                let filtered = raw * (1.0 - params.smoothing) + (history.filtered + history.trend) * params.smoothing;
                let diff = filtered - history.filtered;
                (filtered, diff * params.correction + history.trend * (1.0 - params.correction))
            }
        };

        let mut predicted = filtered + trend * params.prediction;
        let deviation = (predicted - raw).norm();
        if params.max_deviation_radius > 0.0 && deviation > params.max_deviation_radius {
            let t = params.max_deviation_radius / deviation;
            predicted = predicted * t + raw * (1.0 - t);
        }

        *history = JointHistory {
            raw,
            filtered,
            trend,
            frames: history.frames.saturating_add(1),
        };
        predicted
    }
}
