//! The verification procedure: score a probe against every gallery image and
//! aggregate the scores into a verdict.
//!
//! Failures are strict. An undecodable gallery image or a failed model call
//! aborts the attempt instead of being dropped from the ratio, so a returned
//! score list always covers the whole gallery.

use crate::gallery::{Gallery, GalleryError};
use crate::model::InferenceError;
use crate::preprocess::{self, ImageTensor, PreprocessError};
use crate::types::{SimilarityModel, Verification};
use image::{ImageFormat, RgbImage};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("gallery error: {0}")]
    Gallery(#[from] GalleryError),
    #[error("reference gallery is empty: {0}")]
    EmptyGallery(PathBuf),
    #[error("failed to save probe image to {path}: {source}")]
    ProbeWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to decode {path}: {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: PreprocessError,
    },
    #[error("inference failed for {path}: {source}")]
    Inference {
        path: PathBuf,
        #[source]
        source: InferenceError,
    },
}

/// A verdict together with the gallery entries it was computed over.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Gallery entries, index-aligned with `verification.scores`.
    pub references: Vec<PathBuf>,
    #[serde(flatten)]
    pub verification: Verification,
}

/// Runs verification against a gallery directory with an injected model.
pub struct Verifier<M> {
    model: M,
    gallery_dir: PathBuf,
    probe_path: PathBuf,
}

impl<M: SimilarityModel> Verifier<M> {
    /// `probe_path` is the scratch file a captured probe is written to.
    pub fn new(model: M, gallery_dir: impl Into<PathBuf>, probe_path: impl Into<PathBuf>) -> Self {
        Self {
            model,
            gallery_dir: gallery_dir.into(),
            probe_path: probe_path.into(),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn gallery_dir(&self) -> &Path {
        &self.gallery_dir
    }

    pub fn probe_path(&self) -> &Path {
        &self.probe_path
    }

    /// Enumerate the gallery, failing if it has no entries.
    pub fn scan_gallery(&self) -> Result<Gallery, VerifyError> {
        let gallery = Gallery::scan(&self.gallery_dir)?;
        if gallery.is_empty() {
            return Err(VerifyError::EmptyGallery(self.gallery_dir.clone()));
        }
        Ok(gallery)
    }

    /// Save a captured probe to the scratch path, then verify it.
    ///
    /// The gallery is checked first; nothing is written when it is empty.
    pub fn verify(&mut self, probe: &RgbImage) -> Result<Report, VerifyError> {
        let gallery = self.scan_gallery()?;
        self.save_probe(probe)?;
        let probe_path = self.probe_path.clone();
        self.run(&probe_path, &gallery)
    }

    /// Verify an existing image file without touching the scratch path.
    pub fn verify_file(&mut self, probe_path: &Path) -> Result<Report, VerifyError> {
        let gallery = self.scan_gallery()?;
        self.run(probe_path, &gallery)
    }

    fn save_probe(&self, probe: &RgbImage) -> Result<(), VerifyError> {
        let write_err = |source: image::ImageError| VerifyError::ProbeWrite {
            path: self.probe_path.clone(),
            source,
        };

        if let Some(parent) = self.probe_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| write_err(image::ImageError::IoError(e)))?;
        }
        probe
            .save_with_format(&self.probe_path, ImageFormat::Jpeg)
            .map_err(write_err)?;

        tracing::debug!(
            path = %self.probe_path.display(),
            width = probe.width(),
            height = probe.height(),
            "saved probe image"
        );
        Ok(())
    }

    fn run(&mut self, probe_path: &Path, gallery: &Gallery) -> Result<Report, VerifyError> {
        let probe = load(probe_path)?;

        let mut scores = Vec::with_capacity(gallery.len());
        for path in gallery.entries() {
            let reference = load(path)?;
            let score = self
                .model
                .score(&probe, &reference)
                .and_then(check_score)
                .map_err(|source| VerifyError::Inference {
                    path: path.clone(),
                    source,
                })?;
            tracing::debug!(reference = %path.display(), score, "scored pair");
            scores.push(score);
        }

        let verification = Verification::from_scores(scores)
            .ok_or_else(|| VerifyError::EmptyGallery(gallery.dir().to_path_buf()))?;

        tracing::info!(
            scores = ?verification.scores,
            detections = verification.detections,
            ratio = verification.ratio,
            verified = verification.verified,
            "verification complete"
        );

        Ok(Report {
            references: gallery.entries().to_vec(),
            verification,
        })
    }
}

fn load(path: &Path) -> Result<ImageTensor, VerifyError> {
    preprocess::preprocess_file(path).map_err(|source| VerifyError::ImageDecode {
        path: path.to_path_buf(),
        source,
    })
}

fn check_score(score: f32) -> Result<f32, InferenceError> {
    if (0.0..=1.0).contains(&score) {
        Ok(score)
    } else {
        Err(InferenceError::ScoreOutOfRange(score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Returns queued scores in order, one per call.
    struct Scripted(Vec<f32>);

    impl SimilarityModel for Scripted {
        fn score(&mut self, _: &ImageTensor, _: &ImageTensor) -> Result<f32, InferenceError> {
            Ok(self.0.remove(0))
        }
    }

    fn gallery_with(count: usize) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let gallery = dir.path().join("verification_images");
        std::fs::create_dir(&gallery).unwrap();
        for i in 0..count {
            RgbImage::from_pixel(20, 20, Rgb([i as u8 * 40, 0, 0]))
                .save(gallery.join(format!("{i:02}.png")))
                .unwrap();
        }
        dir
    }

    #[test]
    fn test_check_score_bounds() {
        assert_eq!(check_score(0.0).unwrap(), 0.0);
        assert_eq!(check_score(1.0).unwrap(), 1.0);
        assert!(matches!(check_score(1.01), Err(InferenceError::ScoreOutOfRange(_))));
        assert!(matches!(check_score(-0.1), Err(InferenceError::ScoreOutOfRange(_))));
        assert!(check_score(f32::NAN).is_err());
    }

    #[test]
    fn test_verify_writes_probe_and_scores_each_entry() {
        let dir = gallery_with(4);
        let probe_path = dir.path().join("input_image").join("input_image.jpg");
        let mut verifier = Verifier::new(
            Scripted(vec![0.6, 0.7, 0.3, 0.9]),
            dir.path().join("verification_images"),
            &probe_path,
        );

        assert_eq!(verifier.probe_path(), probe_path.as_path());
        assert!(verifier.gallery_dir().ends_with("verification_images"));

        let report = verifier.verify(&RgbImage::new(250, 250)).unwrap();
        assert!(probe_path.exists());
        assert_eq!(report.references.len(), 4);
        assert_eq!(report.verification.scores, vec![0.6, 0.7, 0.3, 0.9]);
        assert_eq!(report.verification.detections, 3);
        assert!(report.verification.verified);
    }

    #[test]
    fn test_out_of_range_score_is_inference_error() {
        let dir = gallery_with(2);
        let mut verifier = Verifier::new(
            Scripted(vec![0.4, 1.5]),
            dir.path().join("verification_images"),
            dir.path().join("probe.jpg"),
        );

        let err = verifier.verify(&RgbImage::new(10, 10)).unwrap_err();
        match err {
            VerifyError::Inference { path, source } => {
                assert!(path.ends_with("01.png"));
                assert!(matches!(source, InferenceError::ScoreOutOfRange(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_gallery_writes_no_probe() {
        let dir = gallery_with(0);
        let probe_path = dir.path().join("probe.jpg");
        let mut verifier = Verifier::new(
            Scripted(vec![]),
            dir.path().join("verification_images"),
            &probe_path,
        );

        let err = verifier.verify(&RgbImage::new(10, 10)).unwrap_err();
        assert!(matches!(err, VerifyError::EmptyGallery(_)));
        assert!(!probe_path.exists());
    }
}
