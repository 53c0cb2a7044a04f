//! Skeleton frame data
//!
//! Joint order and counts follow the sensor SDK: twenty joints per body and
//! up to six bodies per frame, positions in metres in camera space.

use crate::foundation::math::Vec3;

/// Bodies reported per frame
pub const SKELETON_COUNT: usize = 6;

/// Joints per body
pub const JOINT_COUNT: usize = 20;

/// Tracked joint, in sensor index order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Joint {
    HipCenter,
    Spine,
    ShoulderCenter,
    Head,
    ShoulderLeft,
    ElbowLeft,
    WristLeft,
    HandLeft,
    ShoulderRight,
    ElbowRight,
    WristRight,
    HandRight,
    HipLeft,
    KneeLeft,
    AnkleLeft,
    FootLeft,
    HipRight,
    KneeRight,
    AnkleRight,
    FootRight,
}

impl Joint {
    /// Every joint in index order
    pub const ALL: [Self; JOINT_COUNT] = [
        Self::HipCenter,
        Self::Spine,
        Self::ShoulderCenter,
        Self::Head,
        Self::ShoulderLeft,
        Self::ElbowLeft,
        Self::WristLeft,
        Self::HandLeft,
        Self::ShoulderRight,
        Self::ElbowRight,
        Self::WristRight,
        Self::HandRight,
        Self::HipLeft,
        Self::KneeLeft,
        Self::AnkleLeft,
        Self::FootLeft,
        Self::HipRight,
        Self::KneeRight,
        Self::AnkleRight,
        Self::FootRight,
    ];

    /// Position in the joint array
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Joint chains drawn as connected line strips
pub const BONE_CHAINS: [&[Joint]; 5] = [
    &[Joint::HipCenter, Joint::Spine, Joint::ShoulderCenter, Joint::Head],
    &[Joint::ShoulderCenter, Joint::ShoulderLeft, Joint::ElbowLeft, Joint::WristLeft, Joint::HandLeft],
    &[Joint::ShoulderCenter, Joint::ShoulderRight, Joint::ElbowRight, Joint::WristRight, Joint::HandRight],
    &[Joint::HipCenter, Joint::HipLeft, Joint::KneeLeft, Joint::AnkleLeft, Joint::FootLeft],
    &[Joint::HipCenter, Joint::HipRight, Joint::KneeRight, Joint::AnkleRight, Joint::FootRight],
];

/// How much of a body the sensor is following
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingState {
    /// Slot unused
    #[default]
    NotTracked,
    /// Only the body centre is known
    PositionOnly,
    /// All joints are reported
    Tracked,
}

/// One body
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SkeletonData {
    /// Tracking state of the body
    pub tracking_state: TrackingState,
    /// Identifier that stays stable while the same body is followed
    pub tracking_id: u32,
    /// Body centre
    pub position: Vec3,
    /// Joint positions indexed by [`Joint::index`]
    pub joints: [Vec3; JOINT_COUNT],
}

impl SkeletonData {
    /// Position of `joint`
    pub fn joint(&self, joint: Joint) -> Vec3 {
        self.joints[joint.index()]
    }

    /// Move `joint`
    pub fn set_joint(&mut self, joint: Joint, position: Vec3) {
        self.joints[joint.index()] = position;
    }

    /// Whether all joints are reported
    pub fn is_tracked(&self) -> bool {
        self.tracking_state == TrackingState::Tracked
    }
}

/// Every body seen in one sensor frame
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SkeletonFrame {
    /// Sensor frame counter
    pub frame_number: u32,
    /// Body slots
    pub skeletons: [SkeletonData; SKELETON_COUNT],
}

impl SkeletonFrame {
    /// Fully tracked bodies in slot order
    pub fn tracked(&self) -> impl Iterator<Item = &SkeletonData> {
        self.skeletons.iter().filter(|s| s.is_tracked())
    }
}
