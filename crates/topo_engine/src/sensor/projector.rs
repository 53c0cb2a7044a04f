//! Skeleton to depth image projection

use crate::foundation::math::{Vec2, Vec3};
use crate::sensor::device::DepthCamera;
use crate::sensor::skeleton::{Joint, SkeletonData, SkeletonFrame, JOINT_COUNT};

/// Joints at or below this depth (metres) are sensor glitches
pub const JOINT_DEPTH_EPSILON: f32 = f32::EPSILON;

/// Whether a joint has a usable depth
pub fn is_valid_joint(position: &Vec3) -> bool {
    position.z > JOINT_DEPTH_EPSILON
}

/// Projects joints into the pixel space of a depth image of fixed size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkeletonProjector {
    scale_x: f32,
    scale_y: f32,
}

impl SkeletonProjector {
    /// Projector for a `width` x `height` image
    #[allow(clippy::cast_precision_loss)]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            scale_x: width as f32,
            scale_y: height as f32,
        }
    }

    /// Pixel position of a joint, `None` when its depth is invalid
    pub fn project(&self, camera: &dyn DepthCamera, position: &Vec3) -> Option<Vec2> {
        if !is_valid_joint(position) {
            return None;
        }
        let p = camera.project_to_depth_image(position);
        Some(Vec2::new(p.x * self.scale_x, p.y * self.scale_y))
    }

    /// Pixel positions of every joint of a body
    pub fn project_skeleton(&self, camera: &dyn DepthCamera, skeleton: &SkeletonData) -> [Option<Vec2>; JOINT_COUNT] {
        let mut points = [None; JOINT_COUNT];
        for (point, joint) in points.iter_mut().zip(&skeleton.joints) {
            *point = self.project(camera, joint);
        }
        points
    }
}

/// Right hand of the first tracked body
///
/// `x` and `y` are the projected position scaled by `scale_x` / `scale_y`
/// and clamped to `[0, scale]`; `z` is the hand depth in centimetres.
/// Returns `None` when nobody is tracked or the first tracked body's hand
/// has an invalid depth; later bodies are not consulted.
pub fn hand_position(camera: &dyn DepthCamera, frame: &SkeletonFrame, scale_x: f32, scale_y: f32) -> Option<Vec3> {
    let skeleton = frame.tracked().next()?;
    let hand = skeleton.joint(Joint::HandRight);
    if !is_valid_joint(&hand) {
        return None;
    }
    let p = camera.project_to_depth_image(&hand);
    Some(Vec3::new(
        (p.x * scale_x).clamp(0.0, scale_x),
        (p.y * scale_y).clamp(0.0, scale_y),
        hand.z * 100.0,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::skeleton::TrackingState;
    use crate::sensor::synthetic::{SyntheticCamera, SyntheticSettings};
    use approx::assert_relative_eq;

    fn camera() -> SyntheticCamera {
        SyntheticCamera::new(SyntheticSettings::default())
    }

    fn frame_with_hand(hand: Vec3) -> SkeletonFrame {
        let mut frame = SkeletonFrame::default();
        let body = &mut frame.skeletons[2];
        body.tracking_state = TrackingState::Tracked;
        for joint in Joint::ALL {
            body.set_joint(joint, Vec3::new(0.0, 0.0, 2.0));
        }
        body.set_joint(Joint::HandRight, hand);
        frame
    }

    #[test]
    fn test_project_scales_to_image() {
        let projector = SkeletonProjector::new(640, 480);
        let p = projector.project(&camera(), &Vec3::new(0.0, 0.0, 1.5)).unwrap();
        assert_relative_eq!(p, Vec2::new(320.0, 240.0));
    }

    #[test]
    fn test_zero_depth_joint_not_projected() {
        let projector = SkeletonProjector::new(640, 480);
        assert!(projector.project(&camera(), &Vec3::new(0.1, 0.1, 0.0)).is_none());
        assert!(projector.project(&camera(), &Vec3::new(0.1, 0.1, f32::EPSILON)).is_none());
        assert!(projector.project(&camera(), &Vec3::new(0.1, 0.1, -1.0)).is_none());
    }

    #[test]
    fn test_project_skeleton_marks_invalid_joints() {
        let mut frame = frame_with_hand(Vec3::new(0.2, 0.1, 1.8));
        frame.skeletons[2].set_joint(Joint::Head, Vec3::new(0.0, 0.5, 0.0));
        let points = SkeletonProjector::new(640, 480).project_skeleton(&camera(), &frame.skeletons[2]);
        assert!(points[Joint::Head.index()].is_none());
        assert_eq!(points.iter().filter(|p| p.is_some()).count(), JOINT_COUNT - 1);
    }

    #[test]
    fn test_hand_position_scaled_and_in_centimetres() {
        let frame = frame_with_hand(Vec3::new(0.0, 0.0, 1.25));
        let hand = hand_position(&camera(), &frame, 1920.0, 1440.0).unwrap();
        assert_relative_eq!(hand, Vec3::new(960.0, 720.0, 125.0), epsilon = 1e-3);
    }

    #[test]
    fn test_hand_position_clamped_to_scale() {
        let frame = frame_with_hand(Vec3::new(-5.0, -5.0, 0.5));
        let hand = hand_position(&camera(), &frame, 100.0, 50.0).unwrap();
        assert_eq!(hand.x, 0.0);
        assert_eq!(hand.y, 50.0);
    }

    #[test]
    fn test_hand_position_rejects_epsilon_depth() {
        let frame = frame_with_hand(Vec3::new(0.1, 0.1, 0.0));
        assert!(hand_position(&camera(), &frame, 100.0, 100.0).is_none());
    }

    #[test]
    fn test_hand_position_uses_first_tracked_body_only() {
        let mut frame = frame_with_hand(Vec3::new(0.1, 0.1, 0.0));
        let later = &mut frame.skeletons[4];
        later.tracking_state = TrackingState::Tracked;
        later.set_joint(Joint::HandRight, Vec3::new(0.0, 0.0, 2.0));
        assert!(hand_position(&camera(), &frame, 100.0, 100.0).is_none());
        assert!(hand_position(&camera(), &SkeletonFrame::default(), 100.0, 100.0).is_none());
    }
}
