//! Custom error types for the conveyor cell.
//!
//! `CellError` is the typed failure for everything that is decided inside this
//! crate: configuration problems, wire protocol violations, vendor SDK return
//! codes and frame decoding. Transport and capability traits use
//! `anyhow::Result` and wrap these with context; the device controllers never
//! let either escape and report a `bool` instead.
//!
//! ## Error Hierarchy
//!
//! - **`Figment`**: the configuration file or environment could not be parsed.
//! - **`Configuration`**: values parsed fine but are semantically wrong. Raised
//!   at construction time, before any hardware is touched.
//! - **`UnknownCameraType`** / **`UnsupportedPixelFormat`**: the two fatal
//!   camera configuration errors.
//! - **`Modbus*`**: a Modbus RTU response that failed validation.
//! - **`Sdk`**: a non-zero return code from the vision SDK.
//! - **`FrameDecode`**: a frame whose reported size does not match its geometry.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type CellResult<T> = std::result::Result<T, CellError>;

/// Primary error type for the conveyor cell.
#[derive(Error, Debug)]
pub enum CellError {
    /// Configuration file or environment could not be parsed
    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    /// Configuration parsed but holds an invalid value
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// `camera.type` names no known driver
    #[error("Unknown camera type '{0}'. Supported: industrial, generic")]
    UnknownCameraType(String),

    /// Pixel format outside the supported set
    #[error("Unsupported pixel format '{name}'. Supported: {supported}")]
    UnsupportedPixelFormat {
        /// Format as configured or reported
        name: String,
        /// Comma-separated supported formats
        supported: String,
    },

    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial operation before `open` succeeded
    #[error("Serial port not connected")]
    SerialPortNotConnected,

    /// Built without the `serial` feature
    #[error("Serial support not enabled. Rebuild with --features serial")]
    SerialFeatureDisabled,

    /// Requested component needs a cargo feature this build lacks
    #[error("Feature not enabled: {0}")]
    FeatureNotEnabled(String),

    /// Modbus response failed its CRC check
    #[error("Modbus CRC mismatch (expected {expected:#06x}, received {received:#06x})")]
    ModbusCrc {
        /// CRC computed over the received bytes
        expected: u16,
        /// CRC carried by the frame
        received: u16,
    },

    /// Drive answered with a Modbus exception
    #[error("Modbus exception {code:#04x} for function {function:#04x}")]
    ModbusException {
        /// Function code of the request
        function: u8,
        /// Exception code returned by the drive
        code: u8,
    },

    /// Modbus response with the wrong address, function or length
    #[error("Unexpected Modbus response: {0}")]
    ModbusFrame(String),

    /// No Modbus response within the link timeout
    #[error("Modbus response timed out after {0:?}")]
    ModbusTimeout(std::time::Duration),

    /// Vision SDK call returned a non-zero status
    #[error("{operation} failed (ret = {code:#x})")]
    Sdk {
        /// SDK function that failed
        operation: &'static str,
        /// Returned status code
        code: u32,
    },

    /// Raw frame could not be converted for display
    #[error("Frame decode error: {0}")]
    FrameDecode(String),
}

impl From<figment::Error> for CellError {
    fn from(err: figment::Error) -> Self {
        CellError::Figment(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CellError::UnknownCameraType("thermal".to_string());
        assert_eq!(
            err.to_string(),
            "Unknown camera type 'thermal'. Supported: industrial, generic"
        );
    }

    #[test]
    fn test_sdk_error_shows_hex_code() {
        let err = CellError::Sdk {
            operation: "MV_CC_OpenDevice",
            code: 0x8000_0003,
        };
        assert_eq!(err.to_string(), "MV_CC_OpenDevice failed (ret = 0x80000003)");
    }

    #[test]
    fn test_modbus_exception_display() {
        let err = CellError::ModbusException {
            function: 0x86,
            code: 0x02,
        };
        assert!(err.to_string().contains("0x02"));
    }
}
