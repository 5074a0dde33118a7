//! Plain UART link to the vibration feeder's PWM controller.
//!
//! Write-only: the controller does not acknowledge commands.

use crate::config::VibrationLinkConfig;
use crate::error::CellError;
use crate::hardware::capabilities::LineTransport;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

#[cfg(feature = "serial")]
use anyhow::Context;
#[cfg(feature = "serial")]
use tokio::io::AsyncWriteExt;
#[cfg(feature = "serial")]
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// 8N1 serial line without flow control
pub struct SerialLine {
    port_name: String,
    timeout: Duration,
    #[cfg(feature = "serial")]
    port: Option<SerialStream>,
}

impl SerialLine {
    /// Line with no port opened
    pub fn new() -> Self {
        Self {
            port_name: String::new(),
            timeout: Duration::from_secs(1),
            #[cfg(feature = "serial")]
            port: None,
        }
    }

    /// Port opened last, empty before `open`
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl Default for SerialLine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "serial")]
#[async_trait]
impl LineTransport for SerialLine {
    async fn open(&mut self, config: &VibrationLinkConfig) -> Result<()> {
        let port = tokio_serial::new(&config.port, config.baudrate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(config.timeout())
            .open_native_async()
            .with_context(|| format!("Failed to open UART {}", config.port))?;

        self.port = Some(port);
        self.port_name = config.port.clone();
        self.timeout = config.timeout();
        info!(port = %config.port, baud = config.baudrate, "UART open");
        Ok(())
    }

    async fn write_line(&mut self, line: &[u8]) -> Result<()> {
        let timeout = self.timeout;
        let port = self.port.as_mut().ok_or(CellError::SerialPortNotConnected)?;
        tokio::time::timeout(timeout, async {
            port.write_all(line).await?;
            port.flush().await
        })
        .await
        .with_context(|| format!("UART write timed out after {timeout:?}"))?
        .context("UART write failed")?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            info!(port = %self.port_name, "UART closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

#[cfg(not(feature = "serial"))]
#[async_trait]
impl LineTransport for SerialLine {
    async fn open(&mut self, config: &VibrationLinkConfig) -> Result<()> {
        info!(port = %config.port, "UART requested without serial support");
        Err(CellError::SerialFeatureDisabled.into())
    }

    async fn write_line(&mut self, _line: &[u8]) -> Result<()> {
        Err(CellError::SerialPortNotConnected.into())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_on_closed_line_fails() {
        let mut line = SerialLine::new();
        assert!(!line.is_open());
        let err = line.write_line(b"0,15,50\r\n").await.unwrap_err();
        assert!(err.to_string().contains("not connected"));
        assert!(line.close().await.is_ok());
    }

    #[cfg(feature = "serial")]
    #[tokio::test]
    async fn test_open_missing_port_fails() {
        let mut line = SerialLine::new();
        let config = VibrationLinkConfig {
            port: "/dev/does-not-exist-vib".into(),
            ..Default::default()
        };
        assert!(line.open(&config).await.is_err());
        assert!(!line.is_open());
    }
}
