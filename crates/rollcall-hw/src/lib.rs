//! rollcall-hw: webcam capture.
//!
//! V4L2 device access and conversion of YUYV, MJPG and RGB3 buffers into
//! RGB frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, CameraStream, DeviceInfo, FrameSource, PixelFormat};
pub use frame::Frame;
