//! Landmarks and landmark sets.

type Position = [f32; 3];

/// A landmark in 3D space, with optional visibility and presence scores.
///
/// Landmarks are produced by a [`PoseLandmarker`][crate::session::PoseLandmarker]; see the
/// [crate-level documentation][crate] for the coordinate system.
#[derive(Debug, PartialEq, PartialOrd, Clone, Copy)]
pub struct Landmark {
    pos: Position,
    visibility: Option<f32>,
    presence: Option<f32>,
}

impl Landmark {
    pub fn new(position: Position) -> Self {
        Self {
            pos: position,
            visibility: None,
            presence: None,
        }
    }

    pub fn with_visibility(self, visibility: f32) -> Self {
        Self {
            visibility: Some(visibility),
            ..self
        }
    }

    pub fn with_presence(self, presence: f32) -> Self {
        Self {
            presence: Some(presence),
            ..self
        }
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.pos[0]
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.pos[1]
    }

    #[inline]
    pub fn z(&self) -> f32 {
        self.pos[2]
    }

    /// Likelihood of the landmark being visible (not occluded) in the frame, if the model reports
    /// it.
    #[inline]
    pub fn visibility(&self) -> Option<f32> {
        self.visibility
    }

    /// Likelihood of the landmark being present in the frame at all, if the model reports it.
    #[inline]
    pub fn presence(&self) -> Option<f32> {
        self.presence
    }
}

/// An ordered set of landmarks belonging to one detected body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Landmarks {
    landmarks: Vec<Landmark>,
}

impl Landmarks {
    #[inline]
    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    /// Returns the landmark at `index`, or [`None`] if the set is too short.
    pub fn get(&self, index: usize) -> Option<Landmark> {
        self.landmarks.get(index).copied()
    }

    /// Computes the arithmetic mean of the visibility scores of all landmarks in the set.
    ///
    /// Landmarks without a visibility score count as `0.0`. An empty set has an average visibility
    /// of `0.0`.
    pub fn average_visibility(&self) -> f32 {
        if self.landmarks.is_empty() {
            return 0.0;
        }
        let sum: f32 = self
            .landmarks
            .iter()
            .map(|lm| lm.visibility.unwrap_or(0.0))
            .sum();
        sum / self.landmarks.len() as f32
    }
}

impl FromIterator<Landmark> for Landmarks {
    fn from_iter<I: IntoIterator<Item = Landmark>>(iter: I) -> Self {
        Self {
            landmarks: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Landmarks {
    type Item = Landmark;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, Landmark>>;

    fn into_iter(self) -> Self::IntoIter {
        self.landmarks.iter().copied()
    }
}
