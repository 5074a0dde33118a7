//! Camera selection.

use crate::config::CameraConfig;
use crate::error::{CellError, CellResult};
use crate::hardware::capabilities::CameraSource;
use crate::hardware::frame::PixelFormat;
use crate::hardware::generic_camera::GenericCamera;
use tracing::info;

/// Camera kinds accepted in `camera.type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraKind {
    /// Vision SDK camera
    Industrial,
    /// V4L2 device or video file through ffmpeg
    Generic,
}

impl CameraKind {
    /// Parse `camera.type`, case-insensitively.
    pub fn parse(kind: &str) -> CellResult<Self> {
        match kind.to_lowercase().as_str() {
            "industrial" => Ok(Self::Industrial),
            "generic" => Ok(Self::Generic),
            _ => Err(CellError::UnknownCameraType(kind.to_string())),
        }
    }
}

/// Build the configured camera. Validation errors (unknown type, unsupported
/// pixel format, missing file path) surface here, before any device is touched.
pub fn build_camera(config: &CameraConfig) -> CellResult<Box<dyn CameraSource>> {
    match CameraKind::parse(&config.kind)? {
        CameraKind::Industrial => {
            let format = PixelFormat::from_name(&config.industrial.pixel_format)?;
            info!(
                format = format.name(),
                width = config.industrial.width,
                height = config.industrial.height,
                "Using industrial camera"
            );
            build_industrial(config)
        }
        CameraKind::Generic => {
            let camera = GenericCamera::new(&config.generic)?;
            info!(input = %camera.input().display(), "Using generic video source");
            Ok(Box::new(camera))
        }
    }
}

#[cfg(feature = "hikrobot_sdk")]
fn build_industrial(config: &CameraConfig) -> CellResult<Box<dyn CameraSource>> {
    use crate::hardware::industrial_camera::IndustrialCamera;
    use crate::hardware::mvs_sdk::MvsSdk;

    Ok(Box::new(IndustrialCamera::new(&config.industrial, MvsSdk::new())?))
}

#[cfg(not(feature = "hikrobot_sdk"))]
fn build_industrial(_config: &CameraConfig) -> CellResult<Box<dyn CameraSource>> {
    Err(CellError::FeatureNotEnabled(
        "industrial camera requires building with --features hikrobot_sdk".into(),
    ))
}
