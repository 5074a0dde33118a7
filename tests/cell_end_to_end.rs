//! End-to-end behaviour of the cell against mock links and a mock camera.

use conveyor_cell::acquisition::{FrameProducer, FrameSlot};
use conveyor_cell::config::{CellConfig, ServoConfig, VibrationConfig};
use conveyor_cell::control::{CellController, ControlCommand, DispatchOutcome};
use conveyor_cell::hardware::mock::{CameraEvent, MockCamera, MockLine, MockRegisterBus};
use conveyor_cell::hardware::servo::{jog_codes, registers};
use conveyor_cell::hardware::{
    CameraFrame, JogDirection, PowerState, ServoDriveController, VibrationController,
};
use std::sync::Arc;
use std::time::Duration;

async fn servo() -> (ServoDriveController<MockRegisterBus>, MockRegisterBus) {
    let bus = MockRegisterBus::new();
    let mut servo = ServoDriveController::with_bus(ServoConfig::default(), bus.clone());
    assert!(servo.connect().await);
    (servo, bus)
}

async fn feeder() -> (VibrationController<MockLine>, MockLine) {
    let line = MockLine::new();
    let mut vib = VibrationController::with_line(VibrationConfig::default(), line.clone());
    assert!(vib.connect().await);
    (vib, line)
}

#[tokio::test]
async fn forward_then_speed_change_reissues_forward() {
    let (mut servo, bus) = servo().await;

    assert!(servo.jog(JogDirection::Forward).await);
    assert!(servo.set_speed(300).await);

    let state = servo.state();
    assert_eq!(state.direction, JogDirection::Forward);
    assert_eq!(state.speed, 300);
    assert_eq!(
        bus.writes(),
        vec![
            (registers::JOG, jog_codes::FORWARD),
            (registers::JOG, 300),
            (registers::JOG, jog_codes::FORWARD),
        ]
    );
}

#[tokio::test]
async fn out_of_range_speeds_are_stored_clamped() {
    let (mut servo, _bus) = servo().await;
    for (requested, stored) in [(401, 400), (10_000, 400), (-1, 0), (i32::MIN, 0)] {
        assert!(servo.set_speed(requested).await);
        assert_eq!(servo.state().speed, stored, "requested {requested}");
    }
}

#[tokio::test]
async fn stop_always_ends_stopped() {
    let (mut servo, bus) = servo().await;
    for prior in [JogDirection::Forward, JogDirection::Reverse, JogDirection::Stopped] {
        servo.jog(prior).await;
        bus.trigger_failure();
        servo.jog(JogDirection::Stopped).await;
        assert_eq!(servo.state().direction, JogDirection::Stopped);
    }
}

#[tokio::test]
async fn vibration_defaults_carry_over_to_off() {
    let (mut vib, line) = feeder().await;

    assert!(vib.vib_on(None, None).await);
    let on = vib.state();
    assert_eq!((on.power, on.frequency, on.duty), (PowerState::On, 15, 50));

    assert!(vib.vib_off().await);
    let off = vib.state();
    assert_eq!((off.power, off.frequency, off.duty), (PowerState::Off, 15, 50));
    assert_eq!(line.lines(), vec!["1,15,50\r\n", "0,15,50\r\n"]);
}

#[tokio::test]
async fn off_carries_commanded_values_not_defaults() {
    let (mut vib, line) = feeder().await;
    vib.vib_on(Some(40), Some(70)).await;
    vib.vib_off().await;
    assert_eq!(line.lines().last().map(String::as_str), Some("0,40,70\r\n"));
}

#[tokio::test]
async fn status_reads_no_link_while_disconnected() {
    let servo = ServoDriveController::with_bus(ServoConfig::default(), MockRegisterBus::new());
    let vib = VibrationController::with_line(VibrationConfig::default(), MockLine::new());
    assert_eq!(servo.get_status(), "no link");
    assert_eq!(vib.get_status(), "no link");
}

#[test]
fn slot_keeps_only_the_newest_frame() {
    let slot = FrameSlot::new();
    assert!(slot.take().is_none());

    for n in [1, 2] {
        slot.publish(CameraFrame::from_bgr(1, 1, vec![0; 3], n).unwrap());
    }
    assert_eq!(slot.take().map(|f| f.frame_number), Some(2));
    assert!(slot.take().is_none());
}

#[test]
fn producer_releases_camera_even_when_reads_fail() {
    let slot = Arc::new(FrameSlot::new());
    let camera = MockCamera::new(2, 2).failing_every(1);
    let events = camera.events();

    let producer = FrameProducer::spawn(camera, Arc::clone(&slot)).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    let report = producer.stop();

    assert_eq!(report.frames_published, 0);
    assert_eq!(events.lock().last(), Some(&CameraEvent::Release));
}

#[tokio::test]
async fn cell_session_from_startup_to_shutdown() {
    let bus = MockRegisterBus::new();
    let line = MockLine::new();
    let config = CellConfig::default();
    let mut cell = CellController::with_controllers(
        ServoDriveController::with_bus(config.servo.clone(), bus.clone()),
        VibrationController::with_line(config.vibration.clone(), line.clone()),
        config.control.status_interval(),
    );

    let links = cell.startup().await;
    assert!(links.servo && links.vibration);

    for command in [
        ControlCommand::Forward,
        ControlCommand::SpeedUp,
        ControlCommand::VibrationOn,
    ] {
        assert_eq!(cell.dispatch(command).await, DispatchOutcome::Done);
    }
    let status = cell.status();
    assert_eq!(status.conveyor, "Conveyor: Forward (100 rpm)");
    assert_eq!(status.vibration, "Vibration: On: 15 Hz, 50%");

    cell.shutdown().await;
    assert_eq!(
        bus.writes(),
        vec![(1029, 4998), (1029, 100), (1029, 4998), (1029, 5000), (1029, 20)]
    );
    assert_eq!(line.lines(), vec!["1,15,50\r\n", "0,15,50\r\n"]);
    assert_eq!(cell.status().conveyor, "Conveyor: no link");
}
