//! V4L2 webcam capture via the `v4l` crate.

use crate::frame::{self, Frame};
use image::ImageFormat;
use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const STREAM_BUFFERS: u32 = 4;
/// Longest wait for one buffer before the camera counts as stalled.
const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Motion-JPEG, one JPEG image per buffer.
    Mjpeg,
    /// Packed 24-bit RGB.
    Rgb24,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"MJPG" => Some(Self::Mjpeg),
            b"RGB3" => Some(Self::Rgb24),
            _ => None,
        }
    }
}

/// Anything that yields RGB frames one at a time.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame, CameraError>;
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera (e.g., "/dev/video0") and negotiate a colour format
    /// near the requested resolution.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        // Webcams almost always offer YUYV; if the driver insists on something
        // else, accept MJPG or RGB3.
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = width;
        fmt.height = height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let pixel_format = PixelFormat::from_fourcc(negotiated.fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need YUYV, MJPG, or RGB3)",
                negotiated.fourcc
            ))
        })?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            ?pixel_format,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            pixel_format,
        })
    }

    /// Start streaming. Buffers are released when the stream is dropped.
    pub fn stream(&self) -> Result<CameraStream<'_>, CameraError> {
        let mut stream =
            MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
                .map_err(|e| {
                    CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
                })?;
        stream.set_timeout(FRAME_TIMEOUT);
        tracing::debug!(device = %self.device_path, "camera stream started");
        Ok(CameraStream {
            camera: self,
            stream,
        })
    }

    /// Convert a raw buffer to RGB based on the negotiated format.
    fn buf_to_rgb(&self, buf: &[u8]) -> Result<image::RgbImage, CameraError> {
        match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height)
                .map_err(|e| CameraError::CaptureFailed(format!("YUYV conversion failed: {e}"))),
            PixelFormat::Mjpeg => image::load_from_memory_with_format(buf, ImageFormat::Jpeg)
                .map(|img| img.to_rgb8())
                .map_err(|e| CameraError::CaptureFailed(format!("MJPG decode failed: {e}"))),
            PixelFormat::Rgb24 => {
                let expected = (self.width * self.height * 3) as usize;
                if buf.len() < expected {
                    return Err(CameraError::CaptureFailed(format!(
                        "RGB3 buffer too short: expected {expected}, got {}",
                        buf.len()
                    )));
                }
                image::RgbImage::from_raw(self.width, self.height, buf[..expected].to_vec())
                    .ok_or_else(|| CameraError::CaptureFailed("RGB3 buffer rejected".into()))
            }
        }
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

/// An active capture stream borrowed from a [`Camera`].
pub struct CameraStream<'a> {
    camera: &'a Camera,
    stream: MmapStream<'a>,
}

impl FrameSource for CameraStream<'_> {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let (buf, meta) = self.stream.next().map_err(dequeue_error)?;
        let sequence = meta.sequence;
        let image = self.camera.buf_to_rgb(buf)?;
        Ok(Frame::new(image, sequence))
    }
}

fn dequeue_error(e: io::Error) -> CameraError {
    if e.kind() == io::ErrorKind::TimedOut {
        CameraError::CaptureFailed(format!(
            "no frame within {}s; camera stalled",
            FRAME_TIMEOUT.as_secs()
        ))
    } else {
        CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}"))
    }
}

impl Drop for CameraStream<'_> {
    fn drop(&mut self) {
        tracing::debug!(device = %self.camera.device_path, "camera stream released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_from_fourcc() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), Some(PixelFormat::Mjpeg));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"RGB3")), Some(PixelFormat::Rgb24));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"GREY")), None);
    }

    #[test]
    fn test_dequeue_timeout_is_capture_failure() {
        let err = dequeue_error(io::Error::new(io::ErrorKind::TimedOut, "VIDIOC_DQBUF"));
        assert!(matches!(err, CameraError::CaptureFailed(ref msg) if msg.contains("stalled")));

        let err = dequeue_error(io::Error::new(io::ErrorKind::Other, "EIO"));
        assert!(matches!(err, CameraError::CaptureFailed(ref msg) if msg.contains("dequeue")));
    }

    #[test]
    fn test_open_missing_device() {
        let err = Camera::open("/dev/rollcall-missing-video", 640, 480).err().unwrap();
        assert!(matches!(err, CameraError::DeviceNotFound(_)));
    }
}
