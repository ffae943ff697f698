use faceid_core::{Report, SimilarityModel, Verifier, VerifyError};
use faceid_hw::{CameraError, FrameError, FrameSource, Roi};
use image::RgbImage;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::MissedTickBehavior;

/// Fraction of near-black pixels above which a probe is logged as dark.
const DARK_FRAME_PCT: f32 = 0.95;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Verify(#[from] VerifyError),
}

/// The single user-facing status line.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusLabel {
    Uninitiated,
    Verified,
    Unverified,
    Failed(String),
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitiated => f.write_str("Verification Uninitiated"),
            Self::Verified => f.write_str("verified"),
            Self::Unverified => f.write_str("unverified"),
            Self::Failed(reason) => write!(f, "verification failed: {reason}"),
        }
    }
}

/// Everything a verification needs, built once at startup: the frame source,
/// the verifier (model + gallery + probe path), and the probe crop region.
pub struct Session<S, M> {
    source: S,
    verifier: Verifier<M>,
    roi: Roi,
    label: StatusLabel,
}

impl<S: FrameSource, M: SimilarityModel> Session<S, M> {
    pub fn new(source: S, verifier: Verifier<M>, roi: Roi) -> Self {
        tracing::debug!(
            gallery = %verifier.gallery_dir().display(),
            probe = %verifier.probe_path().display(),
            ?roi,
            "session created"
        );
        Self {
            source,
            verifier,
            roi,
            label: StatusLabel::Uninitiated,
        }
    }

    pub fn label(&self) -> &StatusLabel {
        &self.label
    }

    /// Discard frames while the camera's auto exposure settles.
    pub fn warm_up(&mut self, frames: usize) {
        if frames == 0 {
            return;
        }
        tracing::info!(count = frames, "discarding warmup frames");
        for _ in 0..frames {
            if let Err(e) = self.source.capture_frame() {
                tracing::debug!(error = %e, "warmup capture failed");
            }
        }
    }

    /// Refresh tick: pull the current preview crop.
    pub fn tick(&mut self) -> Result<RgbImage, SessionError> {
        let frame = self.source.capture_frame()?;
        tracing::trace!(
            seq = frame.sequence,
            brightness = frame.avg_brightness(),
            "preview frame"
        );
        Ok(frame.crop(self.roi)?)
    }

    /// Capture a probe and verify it, updating the label either way.
    pub fn verify(&mut self) -> Result<Report, SessionError> {
        let result = self.attempt();
        self.label = match &result {
            Ok(report) if report.verification.verified => StatusLabel::Verified,
            Ok(_) => StatusLabel::Unverified,
            Err(e) => {
                tracing::warn!(error = %e, "verification not completed");
                StatusLabel::Failed(e.to_string())
            }
        };
        result
    }

    fn attempt(&mut self) -> Result<Report, SessionError> {
        let frame = self.source.capture_frame()?;
        if frame.is_dark(DARK_FRAME_PCT) {
            tracing::warn!(seq = frame.sequence, "probe frame is mostly dark");
        }
        let probe = frame.crop(self.roi)?;
        Ok(self.verifier.verify(&probe)?)
    }
}

/// Drive the session until `input` hits EOF or Ctrl+C arrives.
///
/// Each tick refreshes the preview; each input line triggers one
/// verification, which runs to completion before the next tick.
pub async fn run_loop<S, M, R>(
    session: &mut Session<S, M>,
    interval: Duration,
    input: R,
) -> std::io::Result<()>
where
    S: FrameSource,
    M: SimilarityModel,
    R: AsyncBufRead + Unpin,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut lines = input.lines();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = session.tick() {
                    tracing::debug!(error = %e, "preview refresh failed");
                }
            }
            line = lines.next_line() => {
                if line?.is_none() {
                    break;
                }
                // Errors are already reflected in the label.
                let _ = session.verify();
                println!("{}", session.label());
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    Ok(())
}
