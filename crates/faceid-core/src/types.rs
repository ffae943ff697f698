use crate::model::InferenceError;
use crate::preprocess::ImageTensor;
use serde::Serialize;

/// Per-pair score above which a single comparison counts as a match.
pub const DETECTION_THRESHOLD: f32 = 0.5;

/// Fraction of matching gallery entries required to accept the probe.
pub const VERIFICATION_THRESHOLD: f32 = 0.5;

/// Pairwise similarity scorer. Implementations must return a value in [0, 1].
pub trait SimilarityModel {
    fn score(&mut self, probe: &ImageTensor, reference: &ImageTensor)
        -> Result<f32, InferenceError>;
}

/// Outcome of one verification attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verification {
    /// Raw scores, in gallery enumeration order.
    pub scores: Vec<f32>,
    /// Number of scores strictly above [`DETECTION_THRESHOLD`].
    pub detections: usize,
    /// `detections / scores.len()`.
    pub ratio: f32,
    /// `ratio` strictly above [`VERIFICATION_THRESHOLD`].
    pub verified: bool,
}

impl Verification {
    /// Aggregate pairwise scores into a verdict.
    ///
    /// Returns `None` for an empty score list: the ratio is undefined there.
    pub fn from_scores(scores: Vec<f32>) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }

        let detections = scores.iter().filter(|&&s| s > DETECTION_THRESHOLD).count();
        let ratio = detections as f32 / scores.len() as f32;

        Some(Self {
            verified: ratio > VERIFICATION_THRESHOLD,
            scores,
            detections,
            ratio,
        })
    }

    /// Text shown to the user for this verdict.
    pub fn label(&self) -> &'static str {
        if self.verified {
            "verified"
        } else {
            "unverified"
        }
    }
}
