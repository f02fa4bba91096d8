//! rollcall-hw — Webcam capture over V4L2.
//!
//! Frames are converted to 8-bit grayscale on capture.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, CameraStream, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};
