//! Cell configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/conveyor.toml` (base configuration)
//! 2. Environment variables prefixed with `CONVEYOR_`, nested keys separated
//!    by a double underscore (e.g. `CONVEYOR_SERVO__PORT=/dev/ttyUSB1`)
//!
//! Every field except the serial port paths has a default matching the
//! shipped cell, so a minimal file only names the ports.
//!
//! # Example
//! ```no_run
//! use conveyor_cell::config::CellConfig;
//!
//! let config = CellConfig::load()?;
//! config.validate()?;
//! println!("Servo on {}", config.servo.link.port);
//! # Ok::<(), conveyor_cell::error::CellError>(())
//! ```

use crate::error::{CellError, CellResult};
use crate::hardware::servo::MAX_JOG_SPEED;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/conveyor.toml";

/// Top-level cell configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CellConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Camera selection and geometry
    #[serde(default)]
    pub camera: CameraConfig,
    /// Servo drive (Modbus RTU) link and JOG limits
    #[serde(default)]
    pub servo: ServoConfig,
    /// Vibration feeder (UART PWM) link and defaults
    #[serde(default)]
    pub vibration: VibrationConfig,
    /// Operator surface settings
    #[serde(default)]
    pub control: ControlConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

/// Camera configuration.
///
/// `type` selects the driver. It is kept as a string and checked when the
/// camera is built so that a typo is reported as a configuration error rather
/// than a parse error of the whole file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Camera driver: `industrial` or `generic`
    #[serde(rename = "type", default = "default_camera_type")]
    pub kind: String,
    /// Vendor SDK camera settings
    #[serde(default)]
    pub industrial: IndustrialCameraConfig,
    /// Video device / file settings
    #[serde(default)]
    pub generic: GenericCameraConfig,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            kind: default_camera_type(),
            industrial: IndustrialCameraConfig::default(),
            generic: GenericCameraConfig::default(),
        }
    }
}

/// Settings applied to the industrial camera after opening it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndustrialCameraConfig {
    /// Requested frame width in pixels
    #[serde(default = "default_industrial_width")]
    pub width: u32,
    /// Requested frame height in pixels
    #[serde(default = "default_industrial_height")]
    pub height: u32,
    /// Pixel format name (`Mono8` or `BayerRG8`)
    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,
    /// Frame grab timeout in milliseconds
    #[serde(default = "default_grab_timeout_ms")]
    pub grab_timeout_ms: u64,
}

impl Default for IndustrialCameraConfig {
    fn default() -> Self {
        Self {
            width: default_industrial_width(),
            height: default_industrial_height(),
            pixel_format: default_pixel_format(),
            grab_timeout_ms: default_grab_timeout_ms(),
        }
    }
}

/// Where the generic camera takes its video from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoSourceKind {
    /// A capture device by index (`/dev/videoN`)
    Device,
    /// A video file
    File,
}

/// Generic (device or file) camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericCameraConfig {
    /// Device or file
    #[serde(default = "default_video_source")]
    pub source: VideoSourceKind,
    /// Device index when `source = "device"`
    #[serde(default)]
    pub device_id: u32,
    /// File path when `source = "file"`
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    /// Decoded frame width
    #[serde(default = "default_generic_width")]
    pub width: u32,
    /// Decoded frame height
    #[serde(default = "default_generic_height")]
    pub height: u32,
    /// Decoder executable
    #[serde(default = "default_decoder")]
    pub decoder: String,
    /// Per-frame read timeout in milliseconds
    #[serde(default = "default_grab_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl Default for GenericCameraConfig {
    fn default() -> Self {
        Self {
            source: default_video_source(),
            device_id: 0,
            file_path: None,
            width: default_generic_width(),
            height: default_generic_height(),
            decoder: default_decoder(),
            read_timeout_ms: default_grab_timeout_ms(),
        }
    }
}

/// Serial line parameters for the Modbus RTU servo link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServoLinkConfig {
    /// Serial port path (e.g. "/dev/ttyUSB0", "COM3")
    #[serde(default)]
    pub port: String,
    /// Modbus slave address of the drive
    #[serde(default = "default_slave_address")]
    pub slave_address: u8,
    /// Baud rate
    #[serde(default = "default_servo_baudrate")]
    pub baudrate: u32,
    /// Data bits (7 or 8)
    #[serde(default = "default_bytesize")]
    pub bytesize: u8,
    /// Parity: "N", "E" or "O"
    #[serde(default = "default_servo_parity")]
    pub parity: String,
    /// Stop bits (1 or 2)
    #[serde(default = "default_stopbits")]
    pub stopbits: u8,
    /// Response timeout in milliseconds
    #[serde(default = "default_serial_timeout_ms")]
    pub timeout_ms: u64,
}

impl ServoLinkConfig {
    /// Response timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ServoLinkConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            slave_address: default_slave_address(),
            baudrate: default_servo_baudrate(),
            bytesize: default_bytesize(),
            parity: default_servo_parity(),
            stopbits: default_stopbits(),
            timeout_ms: default_serial_timeout_ms(),
        }
    }
}

/// Servo drive configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServoConfig {
    /// Serial link
    #[serde(flatten)]
    pub link: ServoLinkConfig,
    /// Lowest JOG speed (rpm)
    #[serde(default)]
    pub min_speed: u16,
    /// Highest JOG speed (rpm)
    #[serde(default = "default_max_speed")]
    pub max_speed: u16,
    /// Step applied by speed up / speed down
    #[serde(default = "default_jog_step")]
    pub jog_step: u16,
    /// Speed assumed at startup
    #[serde(default = "default_initial_speed")]
    pub initial_speed: u16,
    /// Speed written when the link is closed
    #[serde(default = "default_close_speed")]
    pub close_speed: u16,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            link: ServoLinkConfig::default(),
            min_speed: 0,
            max_speed: default_max_speed(),
            jog_step: default_jog_step(),
            initial_speed: default_initial_speed(),
            close_speed: default_close_speed(),
        }
    }
}

/// Serial line parameters for the vibration feeder UART
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VibrationLinkConfig {
    /// Serial port path
    #[serde(default)]
    pub port: String,
    /// Baud rate
    #[serde(default = "default_uart_baudrate")]
    pub baudrate: u32,
    /// Write timeout in milliseconds
    #[serde(default = "default_serial_timeout_ms")]
    pub timeout_ms: u64,
}

impl VibrationLinkConfig {
    /// Write timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for VibrationLinkConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baudrate: default_uart_baudrate(),
            timeout_ms: default_serial_timeout_ms(),
        }
    }
}

/// Command templates for the PWM controller. `{freq}` and `{duty}` are
/// substituted; a missing template falls back to the built-in format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandTemplates {
    /// Template for the on command
    #[serde(default)]
    pub on: Option<String>,
    /// Template for the off command
    #[serde(default)]
    pub off: Option<String>,
}

/// Vibration feeder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VibrationConfig {
    /// Serial link
    #[serde(flatten)]
    pub link: VibrationLinkConfig,
    /// PWM frequency used when none is given (Hz)
    #[serde(default = "default_freq")]
    pub default_freq: u32,
    /// PWM duty used when none is given (percent)
    #[serde(default = "default_duty")]
    pub default_duty: u32,
    /// Command templates
    #[serde(default)]
    pub commands: CommandTemplates,
}

impl Default for VibrationConfig {
    fn default() -> Self {
        Self {
            link: VibrationLinkConfig::default(),
            default_freq: default_freq(),
            default_duty: default_duty(),
            commands: CommandTemplates::default(),
        }
    }
}

/// Operator surface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Status refresh period in milliseconds
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
    /// Key overrides, by action name (`start_conveyor`, `vib_on`, ...)
    #[serde(default)]
    pub keys: HashMap<String, String>,
}

impl ControlConfig {
    /// Status refresh period as a `Duration`
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: default_status_interval_ms(),
            keys: HashMap::new(),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "Conveyor Cell".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// Industrial needs the SDK feature, the generic source always builds
fn default_camera_type() -> String {
    "generic".to_string()
}

fn default_industrial_width() -> u32 {
    3072
}

fn default_industrial_height() -> u32 {
    2048
}

fn default_pixel_format() -> String {
    "BayerRG8".to_string()
}

fn default_grab_timeout_ms() -> u64 {
    1000
}

fn default_video_source() -> VideoSourceKind {
    VideoSourceKind::Device
}

fn default_generic_width() -> u32 {
    1280
}

fn default_generic_height() -> u32 {
    720
}

fn default_decoder() -> String {
    "ffmpeg".to_string()
}

fn default_slave_address() -> u8 {
    1
}

fn default_servo_baudrate() -> u32 {
    9600
}

fn default_bytesize() -> u8 {
    8
}

fn default_servo_parity() -> String {
    "N".to_string()
}

fn default_stopbits() -> u8 {
    2
}

fn default_serial_timeout_ms() -> u64 {
    1000
}

fn default_max_speed() -> u16 {
    400
}

fn default_jog_step() -> u16 {
    25
}

fn default_initial_speed() -> u16 {
    75
}

fn default_close_speed() -> u16 {
    20
}

fn default_uart_baudrate() -> u32 {
    115200
}

fn default_freq() -> u32 {
    15
}

fn default_duty() -> u32 {
    50
}

fn default_status_interval_ms() -> u64 {
    300
}

impl CellConfig {
    /// Load configuration from `config/conveyor.toml` and environment variables
    pub fn load() -> CellResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> CellResult<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CONVEYOR_").split("__"))
            .extract()
            .map_err(CellError::from)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> CellResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(CellError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let link = &self.servo.link;
        if link.port.trim().is_empty() {
            return Err(CellError::Configuration("servo.port is empty".into()));
        }
        if !matches!(link.parity.to_uppercase().as_str(), "N" | "E" | "O") {
            return Err(CellError::Configuration(format!(
                "Invalid servo parity '{}'. Must be N, E or O",
                link.parity
            )));
        }
        if !matches!(link.stopbits, 1 | 2) {
            return Err(CellError::Configuration(format!(
                "Invalid servo stopbits {}. Must be 1 or 2",
                link.stopbits
            )));
        }
        if !matches!(link.bytesize, 5..=8) {
            return Err(CellError::Configuration(format!(
                "Invalid servo bytesize {}. Must be 5-8",
                link.bytesize
            )));
        }
        if self.servo.min_speed > self.servo.max_speed {
            return Err(CellError::Configuration(format!(
                "servo.min_speed {} exceeds servo.max_speed {}",
                self.servo.min_speed, self.servo.max_speed
            )));
        }
        if self.servo.max_speed > MAX_JOG_SPEED {
            return Err(CellError::Configuration(format!(
                "servo.max_speed {} collides with the JOG command codes (limit {})",
                self.servo.max_speed, MAX_JOG_SPEED
            )));
        }

        if self.vibration.link.port.trim().is_empty() {
            return Err(CellError::Configuration("vibration.port is empty".into()));
        }
        if self.vibration.default_duty > 100 {
            return Err(CellError::Configuration(format!(
                "vibration.default_duty {} exceeds 100%",
                self.vibration.default_duty
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_config() -> CellConfig {
        let mut config = CellConfig::default();
        config.servo.link.port = "/dev/ttyUSB0".into();
        config.vibration.link.port = "/dev/ttyACM0".into();
        config
    }

    #[test]
    fn test_defaults_match_cell() {
        let config = CellConfig::default();
        assert_eq!(config.servo.max_speed, 400);
        assert_eq!(config.servo.jog_step, 25);
        assert_eq!(config.servo.initial_speed, 75);
        assert_eq!(config.vibration.default_freq, 15);
        assert_eq!(config.vibration.default_duty, 50);
        assert_eq!(config.control.status_interval(), Duration::from_millis(300));
    }

    #[test]
    fn test_config_validation() {
        assert!(valid_config().validate().is_ok());

        let mut config = valid_config();
        config.application.log_level = "loud".into();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.servo.link.parity = "X".into();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.servo.min_speed = 500;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.vibration.default_duty = 120;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.servo.max_speed = MAX_JOG_SPEED;
        assert!(config.validate().is_ok());
        config.servo.max_speed = 6000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("JOG command codes"));

        let mut config = valid_config();
        config.servo.link.stopbits = 3;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.vibration.link.port = " ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[camera]
type = "generic"

[camera.generic]
source = "file"
file_path = "belt.mp4"

[servo]
port = "/dev/ttyUSB0"
baudrate = 38400
parity = "E"

[vibration]
port = "/dev/ttyACM0"
default_freq = 20

[vibration.commands]
on = "PWM {{freq}} {{duty}}"

[control.keys]
vib_on = "x"
"#
        )
        .unwrap();

        let config = CellConfig::load_from(file.path()).unwrap();
        assert_eq!(config.camera.kind, "generic");
        assert_eq!(config.camera.generic.source, VideoSourceKind::File);
        assert_eq!(config.servo.link.baudrate, 38400);
        assert_eq!(config.servo.link.parity, "E");
        assert_eq!(config.servo.link.slave_address, 1);
        assert_eq!(config.vibration.default_freq, 20);
        assert_eq!(config.vibration.default_duty, 50);
        assert_eq!(
            config.vibration.commands.on.as_deref(),
            Some("PWM {freq} {duty}")
        );
        assert!(config.vibration.commands.off.is_none());
        assert_eq!(config.control.keys.get("vib_on").map(String::as_str), Some("x"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = CellConfig::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config.camera.kind, "generic");
        assert!(config.validate().is_err());
    }
}
