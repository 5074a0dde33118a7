//! Frame producer thread.
//!
//! Owns the camera for its whole life: open, start, read until asked to stop,
//! then stop and release. Camera calls block, so this is a plain OS thread
//! rather than a tokio task.

use crate::acquisition::frame_slot::FrameSlot;
use crate::hardware::capabilities::CameraSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// What the capture loop did before it exited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProducerReport {
    /// Whether open and start both succeeded
    pub started: bool,
    /// Frames published into the slot
    pub frames_published: u64,
    /// Reads that produced no frame (timeouts, decode errors, end of stream)
    pub empty_reads: u64,
}

/// Handle to the running capture thread.
///
/// Dropping the handle stops the thread and waits for it.
pub struct FrameProducer {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<ProducerReport>>,
}

impl FrameProducer {
    /// Start capturing from `camera` into `slot` on a thread named
    /// `frame-producer`.
    pub fn spawn<C>(camera: C, slot: Arc<FrameSlot>) -> std::io::Result<Self>
    where
        C: CameraSource + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("frame-producer".into())
            .spawn(move || {
                let mut camera = camera;
                run_capture_loop(&mut camera, &slot, &stop_flag)
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Whether the capture loop has exited on its own (e.g. open failed)
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Ask the loop to exit and wait for it. Blocks for at most one camera
    /// read timeout.
    pub fn stop(mut self) -> ProducerReport {
        self.join()
    }

    fn join(&mut self) -> ProducerReport {
        self.stop.store(true, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return ProducerReport::default();
        };
        match handle.join() {
            Ok(report) => report,
            Err(_) => {
                error!("Frame producer thread panicked");
                ProducerReport::default()
            }
        }
    }
}

impl Drop for FrameProducer {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.join();
        }
    }
}

/// Capture until `stop` is set. A failed read only costs that frame.
pub fn run_capture_loop<C: CameraSource + ?Sized>(
    camera: &mut C,
    slot: &FrameSlot,
    stop: &AtomicBool,
) -> ProducerReport {
    let mut report = ProducerReport::default();

    if let Err(e) = camera.open() {
        error!(camera = camera.name(), "Camera open failed: {e:#}");
        camera.release();
        return report;
    }
    if let Err(e) = camera.start() {
        error!(camera = camera.name(), "Camera start failed: {e:#}");
        camera.release();
        return report;
    }
    report.started = true;
    info!(camera = camera.name(), "Frame producer running");

    while !stop.load(Ordering::Acquire) {
        match camera.read() {
            Ok(Some(frame)) => {
                slot.publish(frame);
                report.frames_published += 1;
            }
            Ok(None) => report.empty_reads += 1,
            Err(e) => {
                warn!("Frame read failed: {e:#}");
                report.empty_reads += 1;
            }
        }
    }

    camera.stop();
    camera.release();
    debug!(
        published = report.frames_published,
        empty = report.empty_reads,
        "Frame producer exited"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{CameraEvent, MockCamera};
    use std::time::Duration;

    #[test]
    fn test_producer_publishes_and_stops() {
        let slot = Arc::new(FrameSlot::new());
        let camera = MockCamera::new(4, 4);
        let events = camera.events();
        let producer = FrameProducer::spawn(camera, Arc::clone(&slot)).unwrap();

        std::thread::sleep(Duration::from_millis(50));
        let report = producer.stop();

        assert!(report.started);
        assert!(report.frames_published > 0);
        assert_eq!(slot.stats().published, report.frames_published);
        assert_eq!(
            events.lock().as_slice(),
            &[
                CameraEvent::Open,
                CameraEvent::Start,
                CameraEvent::Stop,
                CameraEvent::Release
            ]
        );
    }

    #[test]
    fn test_read_errors_do_not_end_the_loop() {
        let slot = Arc::new(FrameSlot::new());
        let camera = MockCamera::new(2, 2).failing_every(2);
        let producer = FrameProducer::spawn(camera, Arc::clone(&slot)).unwrap();

        std::thread::sleep(Duration::from_millis(50));
        let report = producer.stop();
        assert!(report.frames_published > 1);
        assert!(report.empty_reads > 0);
    }

    #[test]
    fn test_open_failure_releases_and_exits() {
        let slot = Arc::new(FrameSlot::new());
        let camera = MockCamera::new(2, 2).failing_open();
        let events = camera.events();
        let producer = FrameProducer::spawn(camera, Arc::clone(&slot)).unwrap();

        let report = producer.stop();
        assert!(!report.started);
        assert!(slot.is_empty());
        assert_eq!(events.lock().as_slice(), &[CameraEvent::Open, CameraEvent::Release]);
    }

    #[test]
    fn test_drop_stops_thread() {
        let slot = Arc::new(FrameSlot::new());
        let camera = MockCamera::new(2, 2);
        let events = camera.events();
        drop(FrameProducer::spawn(camera, Arc::clone(&slot)).unwrap());

        assert_eq!(events.lock().last(), Some(&CameraEvent::Release));
    }
}
