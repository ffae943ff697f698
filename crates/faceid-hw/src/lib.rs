//! faceid-hw: webcam capture for face verification.
//!
//! Provides V4L2-based camera access, conversion of the common webcam pixel
//! formats to RGB, and region-of-interest cropping.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, FrameSource, PixelFormat};
pub use frame::{Frame, FrameError, Roi};
