//! Body pose landmark topology.

/// Number of landmarks in a full-body pose.
pub const NUM_LANDMARKS: usize = 33;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

/// A connection between two landmarks, drawn as a line segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub start: LandmarkIdx,
    pub end: LandmarkIdx,
}

const fn conn(start: LandmarkIdx, end: LandmarkIdx) -> Connection {
    Connection { start, end }
}

/// The anatomical connections between the 33 body landmarks.
pub const POSE_CONNECTIONS: &[Connection] = {
    use LandmarkIdx::*;
    &[
        // face
        conn(Nose, LeftEyeInner),
        conn(LeftEyeInner, LeftEye),
        conn(LeftEye, LeftEyeOuter),
        conn(LeftEyeOuter, LeftEar),
        conn(Nose, RightEyeInner),
        conn(RightEyeInner, RightEye),
        conn(RightEye, RightEyeOuter),
        conn(RightEyeOuter, RightEar),
        conn(MouthLeft, MouthRight),
        // arms and hands
        conn(LeftShoulder, RightShoulder),
        conn(LeftShoulder, LeftElbow),
        conn(LeftElbow, LeftWrist),
        conn(LeftWrist, LeftPinky),
        conn(LeftWrist, LeftIndex),
        conn(LeftWrist, LeftThumb),
        conn(LeftPinky, LeftIndex),
        conn(RightShoulder, RightElbow),
        conn(RightElbow, RightWrist),
        conn(RightWrist, RightPinky),
        conn(RightWrist, RightIndex),
        conn(RightWrist, RightThumb),
        conn(RightPinky, RightIndex),
        // torso
        conn(LeftShoulder, LeftHip),
        conn(RightShoulder, RightHip),
        conn(LeftHip, RightHip),
        // legs and feet
        conn(LeftHip, LeftKnee),
        conn(RightHip, RightKnee),
        conn(LeftKnee, LeftAnkle),
        conn(RightKnee, RightAnkle),
        conn(LeftAnkle, LeftHeel),
        conn(RightAnkle, RightHeel),
        conn(LeftHeel, LeftFootIndex),
        conn(RightHeel, RightFootIndex),
        conn(LeftAnkle, LeftFootIndex),
        conn(RightAnkle, RightFootIndex),
    ]
};

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn connections_are_unique_and_in_range() {
        assert_eq!(POSE_CONNECTIONS.len(), 35);

        let mut seen = HashSet::new();
        for c in POSE_CONNECTIONS {
            let (a, b) = (c.start as usize, c.end as usize);
            assert!(a < NUM_LANDMARKS && b < NUM_LANDMARKS);
            assert_ne!(a, b);
            assert!(seen.insert((a.min(b), a.max(b))), "duplicate {c:?}");
        }
    }

    #[test]
    fn every_landmark_is_connected() {
        let connected: HashSet<usize> = POSE_CONNECTIONS
            .iter()
            .flat_map(|c| [c.start as usize, c.end as usize])
            .collect();
        assert_eq!(connected.len(), NUM_LANDMARKS);
    }
}
