//! Mock Hardware Implementations
//!
//! Simulated links for testing the cell without a drive, a feeder or a camera
//! attached. Every mock is `Clone` and shares its state between clones, so a
//! test keeps one handle for inspection while the controller owns the other.
//!
//! # Available Mocks
//!
//! - `MockRegisterBus` - Modbus holding registers with call log
//! - `MockLine` - UART that records every line written
//! - `MockCamera` - Synthetic frame source with scripted failures
//! - `MockVisionSdk` - Scripted vision SDK for the industrial camera
//!
//! Failure injection follows one pattern: `trigger_failure()` fails the next
//! operation only, `fail_open()` makes every open fail.

use crate::config::{ServoLinkConfig, VibrationLinkConfig};
use crate::error::CellError;
use crate::hardware::capabilities::{CameraSource, LineTransport, RegisterBus};
use crate::hardware::frame::CameraFrame;
use crate::hardware::mvs_sdk::{FrameInfo, SdkCode, VisionSdk, MV_E_GC_TIMEOUT, MV_OK};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// MockRegisterBus - Simulated Modbus Drive
// =============================================================================

/// One call made on a [`MockRegisterBus`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusCall {
    /// Port opened
    Open { port: String },
    /// Single register write
    Write { register: u16, value: u16 },
    /// Holding register read
    Read { register: u16 },
    /// Port closed
    Close,
}

#[derive(Debug, Default)]
struct BusState {
    open: bool,
    fail_open: bool,
    fail_next: bool,
    failing_values: HashSet<u16>,
    registers: HashMap<u16, u16>,
    calls: Vec<BusCall>,
}

/// In-memory register bank standing in for the servo drive
#[derive(Debug, Clone, Default)]
pub struct MockRegisterBus {
    state: Arc<Mutex<BusState>>,
}

impl MockRegisterBus {
    /// Closed bus, all registers read as 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next operation
    pub fn trigger_failure(&self) {
        self.state.lock().fail_next = true;
    }

    /// Make every `open` fail
    pub fn fail_open(&self) {
        self.state.lock().fail_open = true;
    }

    /// Reject every write of `value`, whatever the register
    pub fn fail_writes_of(&self, value: u16) {
        self.state.lock().failing_values.insert(value);
    }

    /// Preset a register for reads
    pub fn set_register(&self, register: u16, value: u16) {
        self.state.lock().registers.insert(register, value);
    }

    /// Every call so far, in order
    pub fn calls(&self) -> Vec<BusCall> {
        self.state.lock().calls.clone()
    }

    /// `(register, value)` of every attempted write, in order
    pub fn writes(&self) -> Vec<(u16, u16)> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                BusCall::Write { register, value } => Some((*register, *value)),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }
}

#[async_trait]
impl RegisterBus for MockRegisterBus {
    async fn open(&mut self, config: &ServoLinkConfig) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(BusCall::Open {
            port: config.port.clone(),
        });
        if state.fail_open || std::mem::take(&mut state.fail_next) {
            return Err(anyhow!("Mock open failure on {}", config.port));
        }
        state.open = true;
        Ok(())
    }

    async fn write_register(&mut self, register: u16, value: u16) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(BusCall::Write { register, value });
        if !state.open {
            return Err(CellError::SerialPortNotConnected.into());
        }
        if std::mem::take(&mut state.fail_next) || state.failing_values.contains(&value) {
            return Err(anyhow!("Mock write failure ({register} <- {value})"));
        }
        state.registers.insert(register, value);
        Ok(())
    }

    async fn read_register(&mut self, register: u16) -> Result<u16> {
        let mut state = self.state.lock();
        state.calls.push(BusCall::Read { register });
        if !state.open {
            return Err(CellError::SerialPortNotConnected.into());
        }
        if std::mem::take(&mut state.fail_next) {
            return Err(anyhow!("Mock read failure ({register})"));
        }
        Ok(state.registers.get(&register).copied().unwrap_or(0))
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(BusCall::Close);
        state.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }
}

// =============================================================================
// MockLine - Simulated UART
// =============================================================================

#[derive(Debug, Default)]
struct LineState {
    open: bool,
    fail_open: bool,
    fail_next: bool,
    lines: Vec<String>,
    closes: usize,
}

/// Records every line written to the vibration feeder
#[derive(Debug, Clone, Default)]
pub struct MockLine {
    state: Arc<Mutex<LineState>>,
}

impl MockLine {
    /// Closed line with an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next operation
    pub fn trigger_failure(&self) {
        self.state.lock().fail_next = true;
    }

    /// Make every `open` fail
    pub fn fail_open(&self) {
        self.state.lock().fail_open = true;
    }

    /// Lines written so far, exactly as sent (terminators included)
    pub fn lines(&self) -> Vec<String> {
        self.state.lock().lines.clone()
    }

    /// How many times `close` was called
    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }
}

#[async_trait]
impl LineTransport for MockLine {
    async fn open(&mut self, config: &VibrationLinkConfig) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_open || std::mem::take(&mut state.fail_next) {
            return Err(anyhow!("Mock open failure on {}", config.port));
        }
        state.open = true;
        Ok(())
    }

    async fn write_line(&mut self, line: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(CellError::SerialPortNotConnected.into());
        }
        if std::mem::take(&mut state.fail_next) {
            return Err(anyhow!("Mock write failure"));
        }
        state.lines.push(String::from_utf8_lossy(line).into_owned());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.open = false;
        state.closes += 1;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }
}

// =============================================================================
// MockCamera - Synthetic Frame Source
// =============================================================================

/// Lifecycle events recorded by [`MockCamera`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraEvent {
    /// `open` called
    Open,
    /// `start` called
    Start,
    /// `stop` called
    Stop,
    /// `release` called
    Release,
}

/// Produces small uniform frames whose pixel value is the frame number.
#[derive(Debug, Clone)]
pub struct MockCamera {
    width: u32,
    height: u32,
    frame_interval: Duration,
    fail_open: bool,
    fail_every: Option<u64>,
    frame_limit: Option<u64>,
    reads: u64,
    produced: u64,
    events: Arc<Mutex<Vec<CameraEvent>>>,
}

impl MockCamera {
    /// Camera producing `width` x `height` frames
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_interval: Duration::from_millis(1),
            fail_open: false,
            fail_every: None,
            frame_limit: None,
            reads: 0,
            produced: 0,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sleep this long inside every `read`
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Fail every `open`
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Every `n`th read returns an error instead of a frame
    pub fn failing_every(mut self, n: u64) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }

    /// Stop producing after `n` frames (end of stream)
    pub fn with_frame_limit(mut self, n: u64) -> Self {
        self.frame_limit = Some(n);
        self
    }

    /// Shared lifecycle log
    pub fn events(&self) -> Arc<Mutex<Vec<CameraEvent>>> {
        Arc::clone(&self.events)
    }
}

impl CameraSource for MockCamera {
    fn open(&mut self) -> Result<()> {
        self.events.lock().push(CameraEvent::Open);
        if self.fail_open {
            return Err(anyhow!("Mock camera not found"));
        }
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.events.lock().push(CameraEvent::Start);
        Ok(())
    }

    fn read(&mut self) -> Result<Option<CameraFrame>> {
        std::thread::sleep(self.frame_interval);
        self.reads += 1;

        if self.fail_every.is_some_and(|n| self.reads % n == 0) {
            return Err(anyhow!("Mock decode failure on read {}", self.reads));
        }
        if self.frame_limit.is_some_and(|limit| self.produced >= limit) {
            return Ok(None);
        }

        self.produced += 1;
        let len = self.width as usize * self.height as usize * 3;
        let data = vec![self.produced as u8; len];
        Ok(Some(CameraFrame::from_bgr(self.width, self.height, data, self.produced)?))
    }

    fn stop(&mut self) {
        self.events.lock().push(CameraEvent::Stop);
    }

    fn release(&mut self) {
        self.events.lock().push(CameraEvent::Release);
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// =============================================================================
// MockVisionSdk - Scripted Vision SDK
// =============================================================================

#[derive(Debug)]
struct SdkState {
    devices: u32,
    failures: HashMap<&'static str, SdkCode>,
    frames: VecDeque<Result<(FrameInfo, Vec<u8>), SdkCode>>,
    calls: Arc<Mutex<Vec<String>>>,
}

/// Scripted [`VisionSdk`]: one device by default, every call succeeds, grabs
/// time out once the frame queue is empty.
#[derive(Debug, Clone)]
pub struct MockVisionSdk {
    state: Arc<Mutex<SdkState>>,
}

impl MockVisionSdk {
    /// SDK with one device and no queued frames
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SdkState {
                devices: 1,
                failures: HashMap::new(),
                frames: VecDeque::new(),
                calls: Arc::new(Mutex::new(Vec::new())),
            })),
        }
    }

    /// Report `count` enumerated devices
    pub fn with_devices(self, count: u32) -> Self {
        self.state.lock().devices = count;
        self
    }

    /// Make every call of `operation` (trait method name) return `code`
    pub fn fail_on(self, operation: &'static str, code: SdkCode) -> Self {
        self.state.lock().failures.insert(operation, code);
        self
    }

    /// Queue a frame for `get_one_frame_timeout`
    pub fn push_frame(&self, info: FrameInfo, bytes: Vec<u8>) {
        self.state.lock().frames.push_back(Ok((info, bytes)));
    }

    /// Queue a failed grab
    pub fn push_error(&self, code: SdkCode) {
        self.state.lock().frames.push_back(Err(code));
    }

    /// Shared log of trait method names called
    pub fn call_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.state.lock().calls)
    }

    fn call(&self, operation: &'static str) -> SdkCode {
        let state = self.state.lock();
        state.calls.lock().push(operation.to_string());
        state.failures.get(operation).copied().unwrap_or(MV_OK)
    }
}

impl Default for MockVisionSdk {
    fn default() -> Self {
        Self::new()
    }
}

impl VisionSdk for MockVisionSdk {
    fn enum_devices(&mut self) -> Result<u32, SdkCode> {
        match self.call("enum_devices") {
            MV_OK => Ok(self.state.lock().devices),
            code => Err(code),
        }
    }

    fn create_handle(&mut self, _index: u32) -> SdkCode {
        self.call("create_handle")
    }

    fn open_device(&mut self) -> SdkCode {
        self.call("open_device")
    }

    fn set_int_value(&mut self, _key: &str, _value: u32) -> SdkCode {
        self.call("set_int_value")
    }

    fn set_enum_value(&mut self, _key: &str, _value: u32) -> SdkCode {
        self.call("set_enum_value")
    }

    fn start_grabbing(&mut self) -> SdkCode {
        self.call("start_grabbing")
    }

    fn stop_grabbing(&mut self) -> SdkCode {
        self.call("stop_grabbing")
    }

    fn get_one_frame_timeout(&mut self, buffer: &mut [u8], _timeout_ms: u32) -> Result<FrameInfo, SdkCode> {
        match self.call("get_one_frame_timeout") {
            MV_OK => {}
            code => return Err(code),
        }
        match self.state.lock().frames.pop_front() {
            Some(Ok((info, bytes))) => {
                let n = bytes.len().min(buffer.len());
                buffer[..n].copy_from_slice(&bytes[..n]);
                Ok(info)
            }
            Some(Err(code)) => Err(code),
            None => Err(MV_E_GC_TIMEOUT),
        }
    }

    fn close_device(&mut self) -> SdkCode {
        self.call("close_device")
    }

    fn destroy_handle(&mut self) -> SdkCode {
        self.call("destroy_handle")
    }
}
