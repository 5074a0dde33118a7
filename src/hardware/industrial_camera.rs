//! Industrial USB3 camera through the vendor vision SDK.
//!
//! Open sequence: enumerate USB devices, take the first, open it exclusively,
//! request the configured resolution and pixel format. Resolution failures are
//! only warnings (the camera keeps its current ROI); a pixel format the camera
//! refuses is fatal because every later frame would be misinterpreted.
//!
//! Frames are grabbed into one preallocated buffer sized for the largest
//! sensor mode. Only the byte count the driver reports is decoded, then the
//! frame is converted to BGR and stamped with the measured frame rate.

use crate::config::IndustrialCameraConfig;
use crate::error::{CellError, CellResult};
use crate::hardware::capabilities::CameraSource;
use crate::hardware::frame::{CameraFrame, PixelFormat};
use crate::hardware::mvs_sdk::{check, VisionSdk, MAX_FRAME_BYTES, MV_E_GC_TIMEOUT};
use crate::hardware::overlay::draw_fps;
use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Frame rate measured over windows of at least one second.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    window_start: Instant,
    frames: u32,
    fps: f64,
}

impl FpsCounter {
    const WINDOW: Duration = Duration::from_secs(1);

    /// Counter with an empty first window
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(now: Instant) -> Self {
        Self {
            window_start: now,
            frames: 0,
            fps: 0.0,
        }
    }

    /// Count one frame at `now`; returns the current estimate.
    pub fn tick(&mut self, now: Instant) -> f64 {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= Self::WINDOW {
            self.fps = f64::from(self.frames) / elapsed.as_secs_f64();
            self.frames = 0;
            self.window_start = now;
        }
        self.fps
    }

    /// Rate over the last completed window
    pub fn fps(&self) -> f64 {
        self.fps
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Camera driven through a [`VisionSdk`].
pub struct IndustrialCamera<S: VisionSdk> {
    sdk: S,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    grab_timeout_ms: u32,
    buffer: Vec<u8>,
    handle_created: bool,
    device_open: bool,
    grabbing: bool,
    frames_read: u64,
    fps: FpsCounter,
}

impl<S: VisionSdk> IndustrialCamera<S> {
    /// Validate the configuration and wrap `sdk`. Nothing is opened yet.
    ///
    /// # Errors
    /// `UnsupportedPixelFormat` for anything but `Mono8` / `BayerRG8`.
    pub fn new(config: &IndustrialCameraConfig, sdk: S) -> CellResult<Self> {
        let pixel_format = PixelFormat::from_name(&config.pixel_format)?;
        let required = config.width as usize * config.height as usize;
        if required > MAX_FRAME_BYTES {
            return Err(CellError::Configuration(format!(
                "camera resolution {}x{} exceeds the frame buffer",
                config.width, config.height
            )));
        }
        Ok(Self {
            sdk,
            width: config.width,
            height: config.height,
            pixel_format,
            grab_timeout_ms: u32::try_from(config.grab_timeout_ms).unwrap_or(u32::MAX),
            buffer: Vec::new(),
            handle_created: false,
            device_open: false,
            grabbing: false,
            frames_read: 0,
            fps: FpsCounter::new(),
        })
    }

    /// Configured sensor pixel format
    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// SDK grabbing has been started
    pub fn is_grabbing(&self) -> bool {
        self.grabbing
    }

    fn open_device(&mut self) -> CellResult<()> {
        let count = self
            .sdk
            .enum_devices()
            .map_err(|code| CellError::Sdk { operation: "MV_CC_EnumDevices", code })?;
        if count == 0 {
            return Err(CellError::Configuration("no industrial camera found".into()));
        }
        info!(count, "Found industrial camera(s), opening index 0");

        check("MV_CC_CreateHandle", self.sdk.create_handle(0))?;
        self.handle_created = true;

        check("MV_CC_OpenDevice", self.sdk.open_device())?;
        self.device_open = true;

        self.apply_resolution();

        let ret = self.sdk.set_enum_value("PixelFormat", self.pixel_format.sdk_code());
        check("Set PixelFormat", ret)?;
        info!(format = self.pixel_format.name(), "Pixel format set");
        Ok(())
    }

    fn apply_resolution(&mut self) {
        let ret = self.sdk.set_int_value("Width", self.width);
        if let Err(e) = check("Set Width", ret) {
            warn!("{e}; keeping the camera's current width");
        }
        let ret = self.sdk.set_int_value("Height", self.height);
        if let Err(e) = check("Set Height", ret) {
            warn!("{e}; keeping the camera's current height");
        }
    }

    fn decode(&mut self, frame_len: usize, width: u32, height: u32, pixel_type: u32) -> CellResult<CameraFrame> {
        if frame_len > self.buffer.len() {
            return Err(CellError::FrameDecode(format!(
                "driver reported {} bytes, buffer holds {}",
                frame_len,
                self.buffer.len()
            )));
        }
        let format = PixelFormat::from_sdk_code(pixel_type)
            .ok_or_else(|| CellError::FrameDecode(format!("unsupported pixel type {pixel_type:#x}")))?;
        let bgr = format.to_bgr(&self.buffer[..frame_len], width, height)?;
        self.frames_read += 1;
        CameraFrame::from_bgr(width, height, bgr, self.frames_read)
    }
}

impl<S: VisionSdk> CameraSource for IndustrialCamera<S> {
    fn open(&mut self) -> Result<()> {
        if let Err(e) = self.open_device() {
            error!("Industrial camera open failed: {e}");
            self.release();
            return Err(e.into());
        }
        info!(width = self.width, height = self.height, "Industrial camera opened");
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if !self.device_open {
            return Err(CellError::Configuration("camera is not open".into()).into());
        }
        check("MV_CC_StartGrabbing", self.sdk.start_grabbing())?;
        if self.buffer.is_empty() {
            self.buffer = vec![0; MAX_FRAME_BYTES];
        }
        self.grabbing = true;
        self.fps = FpsCounter::new();
        info!("Industrial camera grabbing");
        Ok(())
    }

    fn read(&mut self) -> Result<Option<CameraFrame>> {
        if !self.grabbing {
            return Ok(None);
        }

        let info = match self.sdk.get_one_frame_timeout(&mut self.buffer, self.grab_timeout_ms) {
            Ok(info) => info,
            Err(MV_E_GC_TIMEOUT) => {
                debug!("Frame grab timed out");
                return Ok(None);
            }
            Err(code) => {
                warn!("Frame grab failed (ret = {code:#x})");
                return Ok(None);
            }
        };

        match self.decode(info.frame_len as usize, info.width, info.height, info.pixel_type) {
            Ok(mut frame) => {
                let fps = self.fps.tick(Instant::now());
                draw_fps(&mut frame, fps);
                Ok(Some(frame))
            }
            Err(e) => {
                error!(frame = info.frame_num, "Dropping frame: {e}");
                Ok(None)
            }
        }
    }

    fn stop(&mut self) {
        if !self.grabbing {
            return;
        }
        if let Err(e) = check("MV_CC_StopGrabbing", self.sdk.stop_grabbing()) {
            warn!("{e}");
        }
        self.grabbing = false;
        info!("Industrial camera stopped grabbing");
    }

    fn release(&mut self) {
        self.stop();
        if self.device_open {
            if let Err(e) = check("MV_CC_CloseDevice", self.sdk.close_device()) {
                warn!("{e}");
            }
            self.device_open = false;
        }
        if self.handle_created {
            if let Err(e) = check("MV_CC_DestroyHandle", self.sdk.destroy_handle()) {
                warn!("{e}");
            }
            self.handle_created = false;
        }
        debug!("Industrial camera released");
    }

    fn name(&self) -> &str {
        "industrial"
    }

    fn fps(&self) -> f64 {
        self.fps.fps()
    }
}

impl<S: VisionSdk> Drop for IndustrialCamera<S> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockVisionSdk;
    use crate::hardware::mvs_sdk::FrameInfo;

    fn config(pixel_format: &str) -> IndustrialCameraConfig {
        IndustrialCameraConfig {
            width: 4,
            height: 2,
            pixel_format: pixel_format.to_string(),
            grab_timeout_ms: 10,
        }
    }

    fn mono_info(len: u32) -> FrameInfo {
        FrameInfo {
            width: 4,
            height: 2,
            pixel_type: PixelFormat::Mono8.sdk_code(),
            frame_num: 1,
            frame_len: len,
        }
    }

    #[test]
    fn test_rejects_unknown_pixel_format() {
        let err = IndustrialCamera::new(&config("RGB8"), MockVisionSdk::new()).err().unwrap();
        assert!(matches!(err, CellError::UnsupportedPixelFormat { .. }));
    }

    #[test]
    fn test_open_without_devices_fails() {
        let sdk = MockVisionSdk::new().with_devices(0);
        let mut camera = IndustrialCamera::new(&config("Mono8"), sdk).unwrap();
        assert!(camera.open().is_err());
    }

    #[test]
    fn test_resolution_failure_is_not_fatal() {
        let sdk = MockVisionSdk::new().fail_on("set_int_value", 0x8000_0004);
        let mut camera = IndustrialCamera::new(&config("Mono8"), sdk).unwrap();
        assert!(camera.open().is_ok());
    }

    #[test]
    fn test_pixel_format_failure_releases_device() {
        let sdk = MockVisionSdk::new().fail_on("set_enum_value", 0x8000_0004);
        let calls = sdk.call_log();
        let mut camera = IndustrialCamera::new(&config("BayerRG8"), sdk).unwrap();

        assert!(camera.open().is_err());
        let calls = calls.lock();
        assert!(calls.iter().any(|c| c == "close_device"));
        assert!(calls.iter().any(|c| c == "destroy_handle"));
    }

    #[test]
    fn test_read_uses_reported_frame_length() {
        let sdk = MockVisionSdk::new();
        sdk.push_frame(mono_info(8), vec![50; 8]);
        let mut camera = IndustrialCamera::new(&config("Mono8"), sdk).unwrap();
        camera.open().unwrap();
        camera.start().unwrap();

        let frame = camera.read().unwrap().expect("frame");
        assert_eq!((frame.width, frame.height), (4, 2));
        assert_eq!(frame.pixel(3, 1), Some([50, 50, 50]));
        assert_eq!(frame.frame_number, 1);
    }

    #[test]
    fn test_timeout_and_bad_frames_yield_nothing() {
        let sdk = MockVisionSdk::new();
        sdk.push_error(MV_E_GC_TIMEOUT);
        sdk.push_frame(mono_info(5), vec![0; 5]);
        sdk.push_frame(
            FrameInfo {
                pixel_type: 0x0210_0014,
                ..mono_info(8)
            },
            vec![0; 8],
        );
        let mut camera = IndustrialCamera::new(&config("Mono8"), sdk).unwrap();
        camera.open().unwrap();
        camera.start().unwrap();

        for _ in 0..3 {
            assert!(camera.read().unwrap().is_none());
        }
    }

    #[test]
    fn test_release_is_idempotent() {
        let sdk = MockVisionSdk::new();
        let calls = sdk.call_log();
        let mut camera = IndustrialCamera::new(&config("Mono8"), sdk).unwrap();
        camera.open().unwrap();
        camera.start().unwrap();
        camera.release();
        camera.release();

        let closes = calls.lock().iter().filter(|c| *c == "close_device").count();
        assert_eq!(closes, 1);
    }

    #[test]
    fn test_fps_counter_window() {
        let start = Instant::now();
        let mut counter = FpsCounter::starting_at(start);
        for i in 1..10 {
            assert_eq!(counter.tick(start + Duration::from_millis(i * 100)), 0.0);
        }
        let fps = counter.tick(start + Duration::from_secs(1));
        assert!((fps - 10.0).abs() < 1e-9);
    }
}
