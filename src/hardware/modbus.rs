//! Modbus RTU master for the servo drive.
//!
//! Only the two function codes the drive needs are implemented:
//!
//! | Function | Request                               | Normal response        |
//! |----------|---------------------------------------|------------------------|
//! | `0x03`   | slave, fn, reg hi/lo, count=1, CRC    | slave, fn, 2, hi, lo, CRC |
//! | `0x06`   | slave, fn, reg hi/lo, value hi/lo, CRC | echo of the request   |
//!
//! An exception response is `slave, fn | 0x80, code, CRC` (5 bytes). The CRC is
//! CRC-16/MODBUS transmitted low byte first.

use crate::config::ServoLinkConfig;
use crate::error::{CellError, CellResult};
use crate::hardware::capabilities::RegisterBus;
use anyhow::{Context, Result};
use async_trait::async_trait;
use crc::{Crc, CRC_16_MODBUS};
use std::time::Duration;
use tracing::info;
#[cfg(feature = "serial")]
use tracing::debug;

#[cfg(feature = "serial")]
use tokio::io::{AsyncReadExt, AsyncWriteExt};
#[cfg(feature = "serial")]
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};

/// Read holding registers
pub const FN_READ_HOLDING: u8 = 0x03;
/// Write single register
pub const FN_WRITE_SINGLE: u8 = 0x06;

const EXCEPTION_FLAG: u8 = 0x80;
const EXCEPTION_LEN: usize = 5;

const MODBUS_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// CRC-16/MODBUS of `data`
pub fn crc16(data: &[u8]) -> u16 {
    MODBUS_CRC.checksum(data)
}

fn with_crc(mut pdu: Vec<u8>) -> Vec<u8> {
    let crc = crc16(&pdu);
    pdu.extend_from_slice(&crc.to_le_bytes());
    pdu
}

/// Build a function 0x06 request frame.
pub fn write_single_register_request(slave: u8, register: u16, value: u16) -> Vec<u8> {
    let [reg_hi, reg_lo] = register.to_be_bytes();
    let [val_hi, val_lo] = value.to_be_bytes();
    with_crc(vec![slave, FN_WRITE_SINGLE, reg_hi, reg_lo, val_hi, val_lo])
}

/// Build a function 0x03 request frame for a single register.
pub fn read_holding_register_request(slave: u8, register: u16) -> Vec<u8> {
    let [reg_hi, reg_lo] = register.to_be_bytes();
    with_crc(vec![slave, FN_READ_HOLDING, reg_hi, reg_lo, 0x00, 0x01])
}

/// Length of a normal (non-exception) response to `function`.
pub fn response_len(function: u8) -> usize {
    match function {
        FN_READ_HOLDING => 7,
        _ => 8,
    }
}

/// Validate the CRC trailer of a complete frame.
pub fn check_crc(frame: &[u8]) -> CellResult<()> {
    if frame.len() < 4 {
        return Err(CellError::ModbusFrame(format!("frame too short ({} bytes)", frame.len())));
    }
    let (body, trailer) = frame.split_at(frame.len() - 2);
    let expected = crc16(body);
    let received = u16::from_le_bytes([trailer[0], trailer[1]]);
    if expected != received {
        return Err(CellError::ModbusCrc { expected, received });
    }
    Ok(())
}

/// Validate a response to `request` and return the register value it carries
/// (the echoed value for writes).
pub fn parse_response(request: &[u8], response: &[u8]) -> CellResult<u16> {
    check_crc(response)?;

    let (slave, function) = (request[0], request[1]);
    if response[0] != slave {
        return Err(CellError::ModbusFrame(format!(
            "response from slave {} while talking to {}",
            response[0], slave
        )));
    }
    if response[1] == function | EXCEPTION_FLAG {
        return Err(CellError::ModbusException {
            function,
            code: response[2],
        });
    }
    if response[1] != function {
        return Err(CellError::ModbusFrame(format!(
            "function {:#04x} in response to {:#04x}",
            response[1], function
        )));
    }

    match function {
        FN_READ_HOLDING => {
            if response.len() != 7 || response[2] != 2 {
                return Err(CellError::ModbusFrame(format!(
                    "expected 2 data bytes, got frame of {} bytes",
                    response.len()
                )));
            }
            Ok(u16::from_be_bytes([response[3], response[4]]))
        }
        _ => {
            if response.len() != request.len() || response[..6] != request[..6] {
                return Err(CellError::ModbusFrame("write echo does not match request".into()));
            }
            Ok(u16::from_be_bytes([response[4], response[5]]))
        }
    }
}

/// Silent interval required between RTU frames: 3.5 characters of 11 bits,
/// fixed at 1.75 ms above 19200 baud.
pub fn inter_frame_delay(baudrate: u32) -> Duration {
    if baudrate == 0 || baudrate > 19_200 {
        return Duration::from_micros(1750);
    }
    Duration::from_micros(38_500_000 / u64::from(baudrate))
}

#[cfg(feature = "serial")]
fn serial_settings(
    config: &ServoLinkConfig,
) -> CellResult<(tokio_serial::DataBits, tokio_serial::Parity, tokio_serial::StopBits)> {
    let data_bits = match config.bytesize {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        8 => tokio_serial::DataBits::Eight,
        other => return Err(CellError::Configuration(format!("unsupported bytesize {other}"))),
    };
    let parity = match config.parity.to_uppercase().as_str() {
        "N" => tokio_serial::Parity::None,
        "E" => tokio_serial::Parity::Even,
        "O" => tokio_serial::Parity::Odd,
        other => return Err(CellError::Configuration(format!("unsupported parity '{other}'"))),
    };
    let stop_bits = match config.stopbits {
        1 => tokio_serial::StopBits::One,
        2 => tokio_serial::StopBits::Two,
        other => return Err(CellError::Configuration(format!("unsupported stopbits {other}"))),
    };
    Ok((data_bits, parity, stop_bits))
}

/// Modbus RTU master on a serial port.
pub struct ModbusRtuBus {
    slave: u8,
    timeout: Duration,
    frame_gap: Duration,
    #[cfg(feature = "serial")]
    port: Option<SerialStream>,
}

impl ModbusRtuBus {
    /// Bus with no port opened
    pub fn new() -> Self {
        Self {
            slave: 1,
            timeout: Duration::from_secs(1),
            frame_gap: inter_frame_delay(9600),
            #[cfg(feature = "serial")]
            port: None,
        }
    }

    #[cfg(feature = "serial")]
    async fn transact(&mut self, request: &[u8]) -> Result<u16> {
        let timeout = self.timeout;
        let gap = self.frame_gap;
        let port = self.port.as_mut().ok_or(CellError::SerialPortNotConnected)?;

        // Drop stale bytes from an earlier timed-out exchange
        port.clear(tokio_serial::ClearBuffer::Input)
            .context("Failed to clear Modbus input buffer")?;
        tokio::time::sleep(gap).await;

        port.write_all(request).await.context("Modbus write failed")?;
        port.flush().await.context("Modbus flush failed")?;

        let function = request[1];
        let response = tokio::time::timeout(timeout, async {
            let mut frame = vec![0u8; EXCEPTION_LEN];
            port.read_exact(&mut frame).await?;
            if frame[1] & EXCEPTION_FLAG == 0 {
                let total = response_len(function);
                frame.resize(total, 0);
                port.read_exact(&mut frame[EXCEPTION_LEN..]).await?;
            }
            Ok::<_, std::io::Error>(frame)
        })
        .await
        .map_err(|_| CellError::ModbusTimeout(timeout))?
        .context("Modbus read failed")?;

        debug!(request = ?request, response = ?response, "Modbus transaction");
        Ok(parse_response(request, &response)?)
    }

    #[cfg(not(feature = "serial"))]
    async fn transact(&mut self, _request: &[u8]) -> Result<u16> {
        Err(CellError::SerialFeatureDisabled.into())
    }

    #[cfg(feature = "serial")]
    fn release_port(&mut self) -> bool {
        self.port.take().is_some()
    }

    #[cfg(not(feature = "serial"))]
    fn release_port(&mut self) -> bool {
        false
    }

    #[cfg(feature = "serial")]
    fn has_port(&self) -> bool {
        self.port.is_some()
    }

    #[cfg(not(feature = "serial"))]
    fn has_port(&self) -> bool {
        false
    }
}

impl Default for ModbusRtuBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegisterBus for ModbusRtuBus {
    #[cfg(feature = "serial")]
    async fn open(&mut self, config: &ServoLinkConfig) -> Result<()> {
        let (data_bits, parity, stop_bits) = serial_settings(config)?;
        let port = tokio_serial::new(&config.port, config.baudrate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(config.timeout())
            .open_native_async()
            .with_context(|| format!("Failed to open Modbus port {}", config.port))?;

        self.port = Some(port);
        self.slave = config.slave_address;
        self.timeout = config.timeout();
        self.frame_gap = inter_frame_delay(config.baudrate);
        info!(port = %config.port, baud = config.baudrate, slave = self.slave, "Modbus RTU port open");
        Ok(())
    }

    #[cfg(not(feature = "serial"))]
    async fn open(&mut self, _config: &ServoLinkConfig) -> Result<()> {
        Err(CellError::SerialFeatureDisabled.into())
    }

    async fn write_register(&mut self, register: u16, value: u16) -> Result<()> {
        let request = write_single_register_request(self.slave, register, value);
        self.transact(&request)
            .await
            .with_context(|| format!("write register {register} <- {value}"))?;
        Ok(())
    }

    async fn read_register(&mut self, register: u16) -> Result<u16> {
        let request = read_holding_register_request(self.slave, register);
        self.transact(&request)
            .await
            .with_context(|| format!("read register {register}"))
    }

    async fn close(&mut self) -> Result<()> {
        if self.release_port() {
            info!("Modbus RTU port closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.has_port()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc_known_vector() {
        let frame = read_holding_register_request(0x01, 0x0000);
        assert_eq!(frame, vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A]);
    }

    #[test]
    fn test_write_request_layout() {
        let frame = write_single_register_request(1, 1029, 4998);
        assert_eq!(&frame[..6], &[0x01, 0x06, 0x04, 0x05, 0x13, 0x86]);
        assert!(check_crc(&frame).is_ok());
    }

    #[test]
    fn test_write_echo_accepted() {
        let request = write_single_register_request(1, 1029, 300);
        assert_eq!(parse_response(&request, &request).unwrap(), 300);
    }

    #[test]
    fn test_read_response_value() {
        let request = read_holding_register_request(1, 0);
        let response = with_crc(vec![0x01, 0x03, 0x02, 0x01, 0x2C]);
        assert_eq!(parse_response(&request, &response).unwrap(), 300);
    }

    #[test]
    fn test_exception_response() {
        let request = write_single_register_request(1, 1029, 4998);
        let response = with_crc(vec![0x01, 0x86, 0x02]);
        let err = parse_response(&request, &response).unwrap_err();
        assert!(matches!(
            err,
            CellError::ModbusException {
                function: 0x06,
                code: 0x02
            }
        ));
    }

    #[test]
    fn test_corrupted_crc_rejected() {
        let request = write_single_register_request(1, 1029, 5000);
        let mut response = request.clone();
        response[7] ^= 0xFF;
        assert!(matches!(
            parse_response(&request, &response),
            Err(CellError::ModbusCrc { .. })
        ));
    }

    #[test]
    fn test_wrong_slave_rejected() {
        let request = write_single_register_request(1, 1029, 5000);
        let response = write_single_register_request(2, 1029, 5000);
        assert!(matches!(
            parse_response(&request, &response),
            Err(CellError::ModbusFrame(_))
        ));
    }

    #[test]
    fn test_inter_frame_delay() {
        assert_eq!(inter_frame_delay(9600), Duration::from_micros(4010));
        assert_eq!(inter_frame_delay(115_200), Duration::from_micros(1750));
    }

    #[tokio::test]
    async fn test_closed_bus_refuses_transactions() {
        let mut bus = ModbusRtuBus::new();
        assert!(!bus.is_open());
        assert!(bus.write_register(1029, 5000).await.is_err());
    }
}
