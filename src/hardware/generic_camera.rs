//! Generic video source: a capture device or a video file, decoded by an
//! external `ffmpeg` process into raw BGR frames at the configured size.
//!
//! A reader thread pulls fixed-size frames from the decoder's stdout into a
//! small bounded channel; `read` waits on that channel for at most the
//! configured read timeout.

use crate::config::{GenericCameraConfig, VideoSourceKind};
use crate::error::{CellError, CellResult};
use crate::hardware::capabilities::CameraSource;
use crate::hardware::frame::CameraFrame;
use anyhow::{anyhow, Context, Result};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Frames buffered between the decoder and `read`
const CHANNEL_DEPTH: usize = 2;

/// What the decoder reader thread hands over
type DecodedChunk = std::io::Result<Vec<u8>>;

/// Copy `frame_bytes`-sized chunks from `reader` into `tx` until EOF, a read
/// error, or the receiver going away. EOF is reported as `UnexpectedEof`.
pub fn pump_frames<R: Read>(mut reader: R, frame_bytes: usize, tx: &SyncSender<DecodedChunk>) {
    loop {
        let mut buf = vec![0u8; frame_bytes];
        match reader.read_exact(&mut buf) {
            Ok(()) => {
                if tx.send(Ok(buf)).is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        }
    }
}

/// Device or file decoded by `ffmpeg`.
pub struct GenericCamera {
    config: GenericCameraConfig,
    input: PathBuf,
    child: Option<Child>,
    frames: Option<Receiver<DecodedChunk>>,
    reader: Option<JoinHandle<()>>,
    running: bool,
    frame_number: u64,
}

impl GenericCamera {
    /// Validate the configuration. Nothing is opened yet.
    ///
    /// # Errors
    /// `Configuration` when a file source has no path or the size is zero.
    pub fn new(config: &GenericCameraConfig) -> CellResult<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(CellError::Configuration(format!(
                "generic camera size {}x{} is invalid",
                config.width, config.height
            )));
        }
        let input = match config.source {
            VideoSourceKind::Device => PathBuf::from(format!("/dev/video{}", config.device_id)),
            VideoSourceKind::File => config.file_path.clone().ok_or_else(|| {
                CellError::Configuration("camera.generic.file_path is required for a file source".into())
            })?,
        };
        Ok(Self {
            config: config.clone(),
            input,
            child: None,
            frames: None,
            reader: None,
            running: false,
            frame_number: 0,
        })
    }

    /// Device node or file being decoded
    pub fn input(&self) -> &Path {
        &self.input
    }

    fn frame_bytes(&self) -> usize {
        self.config.width as usize * self.config.height as usize * 3
    }

    fn decoder_command(&self) -> Command {
        let mut cmd = Command::new(&self.config.decoder);
        cmd.arg("-hide_banner").arg("-loglevel").arg("error");

        match self.config.source {
            VideoSourceKind::Device => {
                cmd.arg("-f").arg("video4linux2");
            }
            // Pace file playback at its native rate
            VideoSourceKind::File => {
                cmd.arg("-re");
            }
        }

        cmd.arg("-i")
            .arg(&self.input)
            .arg("-vf")
            .arg(format!("scale={}:{}", self.config.width, self.config.height))
            .arg("-pix_fmt")
            .arg("bgr24")
            .arg("-f")
            .arg("rawvideo")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        cmd
    }
}

impl CameraSource for GenericCamera {
    fn open(&mut self) -> Result<()> {
        if !self.input.exists() {
            return Err(anyhow!("Failed to open video source {}", self.input.display()));
        }
        info!(input = %self.input.display(), "Generic video source ready");
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }

        let mut child = self
            .decoder_command()
            .spawn()
            .with_context(|| format!("Failed to start decoder '{}'", self.config.decoder))?;
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(anyhow!("Decoder stdout unavailable"));
            }
        };

        let (tx, rx) = sync_channel(CHANNEL_DEPTH);
        let frame_bytes = self.frame_bytes();
        let reader = std::thread::Builder::new()
            .name("video-decoder".into())
            .spawn(move || pump_frames(stdout, frame_bytes, &tx))
            .context("Failed to spawn decoder reader thread")?;

        self.child = Some(child);
        self.frames = Some(rx);
        self.reader = Some(reader);
        self.running = true;
        info!(
            width = self.config.width,
            height = self.config.height,
            "Generic video source streaming"
        );
        Ok(())
    }

    fn read(&mut self) -> Result<Option<CameraFrame>> {
        let timeout = Duration::from_millis(self.config.read_timeout_ms);
        // An ended stream still paces the caller at the read timeout
        let frames = match self.frames.as_ref() {
            Some(frames) if self.running => frames,
            _ => {
                std::thread::sleep(timeout);
                return Ok(None);
            }
        };

        match frames.recv_timeout(timeout) {
            Ok(Ok(data)) => {
                self.frame_number += 1;
                let frame = CameraFrame::from_bgr(self.config.width, self.config.height, data, self.frame_number)?;
                Ok(Some(frame))
            }
            Ok(Err(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                info!("Video source reached end of stream");
                self.running = false;
                Ok(None)
            }
            Ok(Err(e)) => {
                warn!("Video decoder read failed: {e}");
                self.running = false;
                Ok(None)
            }
            Err(RecvTimeoutError::Timeout) => {
                debug!("No frame within {timeout:?}");
                Ok(None)
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.running = false;
                Ok(None)
            }
        }
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn release(&mut self) {
        self.running = false;
        // Receiver first so a reader blocked on a full channel wakes up
        self.frames = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("Decoder reader thread panicked");
            }
        }
        debug!("Generic video source released");
    }

    fn name(&self) -> &str {
        "generic"
    }
}

impl Drop for GenericCamera {
    fn drop(&mut self) {
        self.release();
    }
}
