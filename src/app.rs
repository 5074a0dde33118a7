//! Headless operator loop.
//!
//! One tokio task owns the cell. It reacts to key lines on stdin, renders the
//! status lines at the configured interval and hands every published frame to
//! a [`FrameSink`]. The camera runs on its own thread behind a
//! [`FrameSlot`].

use crate::acquisition::{FrameProducer, FrameSlot};
use crate::config::CellConfig;
use crate::control::{CellController, DispatchOutcome, KeyBindings};
use crate::hardware::build_camera;
use crate::hardware::capabilities::{LineTransport, RegisterBus};
use crate::hardware::frame::CameraFrame;
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Where displayed frames go
pub trait FrameSink: Send {
    /// Display one frame; ownership passes to the sink
    fn show(&mut self, frame: CameraFrame);
}

/// Sink that only reports what it would have displayed.
#[derive(Debug)]
pub struct LogFrameSink {
    report_every: Duration,
    window_start: Instant,
    window_frames: u64,
    total: u64,
}

impl LogFrameSink {
    /// Log a throughput line at most once per `report_every`
    pub fn new(report_every: Duration) -> Self {
        Self {
            report_every,
            window_start: Instant::now(),
            window_frames: 0,
            total: 0,
        }
    }

    /// Frames shown so far
    pub fn total(&self) -> u64 {
        self.total
    }
}

impl FrameSink for LogFrameSink {
    fn show(&mut self, frame: CameraFrame) {
        self.total += 1;
        self.window_frames += 1;
        debug!(frame = frame.frame_number, "Frame {}x{}", frame.width, frame.height);

        let elapsed = self.window_start.elapsed();
        if elapsed >= self.report_every {
            let rate = self.window_frames as f64 / elapsed.as_secs_f64();
            info!(
                frame = frame.frame_number,
                width = frame.width,
                height = frame.height,
                "Displaying {:.1} frames/s",
                rate
            );
            self.window_frames = 0;
            self.window_start = Instant::now();
        }
    }
}

/// Why the operator loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Quit key
    Quit,
    /// Operator input reached end of file
    InputClosed,
    /// Ctrl-C
    Interrupted,
}

/// Drive the cell from `input` until quit, end of input or Ctrl-C.
///
/// Every character of a line is looked up as a key; unknown keys are
/// ignored.
pub async fn operate<B, L, S, R>(
    cell: &mut CellController<B, L>,
    slot: &FrameSlot,
    sink: &mut S,
    keys: &KeyBindings,
    input: R,
) -> ExitReason
where
    B: RegisterBus,
    L: LineTransport,
    S: FrameSink + ?Sized,
    R: AsyncBufRead + Unpin,
{
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl-C handler unavailable: {e}");
            std::future::pending::<()>().await;
        }
    };
    operate_until(cell, slot, sink, keys, input, interrupt).await
}

/// [`operate`] with an arbitrary interrupt. `interrupt` is created once and
/// stays armed across loop iterations.
pub async fn operate_until<B, L, S, R, I>(
    cell: &mut CellController<B, L>,
    slot: &FrameSlot,
    sink: &mut S,
    keys: &KeyBindings,
    input: R,
    interrupt: I,
) -> ExitReason
where
    B: RegisterBus,
    L: LineTransport,
    S: FrameSink + ?Sized,
    R: AsyncBufRead + Unpin,
    I: Future<Output = ()>,
{
    tokio::pin!(interrupt);
    let mut lines = input.lines();
    let mut status_tick = tokio::time::interval(cell.status_interval());
    status_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    for key in line.chars() {
                        let Some(command) = keys.lookup(key) else {
                            debug!("Unbound key {key:?}");
                            continue;
                        };
                        if cell.dispatch(command).await == DispatchOutcome::Quit {
                            return ExitReason::Quit;
                        }
                    }
                }
                Ok(None) => return ExitReason::InputClosed,
                Err(e) => {
                    warn!("Operator input failed: {e}");
                    return ExitReason::InputClosed;
                }
            },
            _ = status_tick.tick() => {
                if let Some(status) = cell.status_changed() {
                    info!("{} | {}", status.conveyor, status.vibration);
                }
            }
            _ = slot.ready() => {
                if let Some(frame) = slot.take() {
                    sink.show(frame);
                }
            }
            () = &mut interrupt => return ExitReason::Interrupted,
        }
    }
}

/// Run the cell with the configured hardware until the operator leaves.
///
/// Camera configuration errors are returned before any device is touched.
/// Missing serial devices are not errors: the cell runs without them.
pub async fn run(config: CellConfig) -> Result<()> {
    let camera = build_camera(&config.camera)?;
    let keys = KeyBindings::from_config(&config.control.keys);

    let mut cell = CellController::new(&config);
    cell.startup().await;
    info!("Key bindings:\n{}", keys.help());

    let slot = Arc::new(FrameSlot::new());
    let producer = FrameProducer::spawn(camera, Arc::clone(&slot)).context("Failed to start frame producer")?;

    let mut sink = LogFrameSink::new(Duration::from_secs(5));
    let stdin = BufReader::new(tokio::io::stdin());
    let reason = operate(&mut cell, &slot, &mut sink, &keys, stdin).await;
    info!(?reason, "Leaving operator loop");

    // Joining waits out one camera read timeout
    let report = tokio::task::spawn_blocking(move || producer.stop())
        .await
        .context("Frame producer join failed")?;
    let stats = slot.stats();
    info!(
        published = report.frames_published,
        displayed = sink.total(),
        dropped = stats.overwritten,
        "Frame producer stopped"
    );

    cell.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServoConfig, VibrationConfig};
    use crate::hardware::mock::{MockLine, MockRegisterBus};
    use crate::hardware::{ServoDriveController, VibrationController};

    struct CollectingSink(Vec<u64>);

    impl FrameSink for CollectingSink {
        fn show(&mut self, frame: CameraFrame) {
            self.0.push(frame.frame_number);
        }
    }

    async fn connected_cell() -> (CellController<MockRegisterBus, MockLine>, MockRegisterBus, MockLine) {
        let bus = MockRegisterBus::new();
        let line = MockLine::new();
        let mut cell = CellController::with_controllers(
            ServoDriveController::with_bus(ServoConfig::default(), bus.clone()),
            VibrationController::with_line(VibrationConfig::default(), line.clone()),
            Duration::from_millis(10),
        );
        cell.startup().await;
        (cell, bus, line)
    }

    #[tokio::test]
    async fn test_keys_drive_the_cell_until_quit() {
        let (mut cell, bus, line) = connected_cell().await;
        let slot = FrameSlot::new();
        let mut sink = CollectingSink(Vec::new());

        let input: &[u8] = b"w\ndv\nq\nw\n";
        let reason = operate(&mut cell, &slot, &mut sink, &KeyBindings::default(), input).await;

        assert_eq!(reason, ExitReason::Quit);
        assert_eq!(bus.writes(), vec![(1029, 4998), (1029, 100), (1029, 4998)]);
        assert_eq!(line.lines(), vec!["1,15,50\r\n"]);
    }

    #[tokio::test]
    async fn test_end_of_input_ends_loop() {
        let (mut cell, bus, _line) = connected_cell().await;
        let slot = FrameSlot::new();
        let mut sink = CollectingSink(Vec::new());

        let input: &[u8] = b"xyz\n";
        let reason = operate(&mut cell, &slot, &mut sink, &KeyBindings::default(), input).await;

        assert_eq!(reason, ExitReason::InputClosed);
        assert!(bus.writes().is_empty());
    }

    #[tokio::test]
    async fn test_published_frames_reach_sink() {
        let (mut cell, _bus, _line) = connected_cell().await;
        let slot = Arc::new(FrameSlot::new());
        slot.publish(CameraFrame::from_bgr(1, 1, vec![0; 3], 42).unwrap());

        let (mut reader, mut writer) = tokio::io::duplex(64);
        let quitter = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tokio::io::AsyncWriteExt::write_all(&mut writer, b"q\n").await.unwrap();
        });

        let mut sink = CollectingSink(Vec::new());
        let input = BufReader::new(&mut reader);
        let reason = operate(&mut cell, &slot, &mut sink, &KeyBindings::default(), input).await;
        quitter.await.unwrap();

        assert_eq!(reason, ExitReason::Quit);
        assert_eq!(sink.0, vec![42]);
    }

    #[tokio::test]
    async fn test_interrupt_survives_busy_loop() {
        // The 10 ms status tick wakes the loop many times before the interrupt fires
        let (mut cell, _bus, _line) = connected_cell().await;
        let slot = FrameSlot::new();
        let mut sink = CollectingSink(Vec::new());
        let (mut reader, _writer) = tokio::io::duplex(64);

        let interrupt = tokio::time::sleep(Duration::from_millis(60));
        let bindings = KeyBindings::default();
        let session = operate_until(
            &mut cell,
            &slot,
            &mut sink,
            &bindings,
            BufReader::new(&mut reader),
            interrupt,
        );
        let reason = tokio::time::timeout(Duration::from_secs(2), session)
            .await
            .expect("interrupt was lost");

        assert_eq!(reason, ExitReason::Interrupted);
    }

    #[test]
    fn test_log_sink_counts_frames() {
        let mut sink = LogFrameSink::new(Duration::ZERO);
        sink.show(CameraFrame::from_bgr(1, 1, vec![0; 3], 1).unwrap());
        sink.show(CameraFrame::from_bgr(1, 1, vec![0; 3], 2).unwrap());
        assert_eq!(sink.total(), 2);
    }
}
