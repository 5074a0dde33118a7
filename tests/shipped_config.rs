//! The configuration file shipped in `config/` must load and validate.

use conveyor_cell::config::CellConfig;
use conveyor_cell::control::{ControlCommand, KeyBindings};
use conveyor_cell::hardware::build_camera;
use std::path::Path;

fn shipped() -> CellConfig {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/conveyor.toml");
    CellConfig::load_from(path).unwrap()
}

#[test]
fn shipped_config_is_valid() {
    let config = shipped();
    config.validate().unwrap();

    assert_eq!(config.camera.industrial.pixel_format, "BayerRG8");
    assert_eq!(config.servo.link.stopbits, 2);
    assert_eq!(config.servo.close_speed, 20);
    assert_eq!(config.vibration.link.baudrate, 115_200);
    assert_eq!(
        config.vibration.commands.on.as_deref(),
        Some("1,{freq},{duty}\r\n")
    );
}

#[test]
fn shipped_config_builds_its_camera_in_a_default_build() {
    let config = shipped();
    let camera = build_camera(&config.camera).unwrap();
    assert_eq!(camera.name(), "generic");
}

#[test]
fn shipped_config_keeps_default_keys() {
    let keys = KeyBindings::from_config(&shipped().control.keys);
    assert_eq!(keys.lookup('w'), Some(ControlCommand::Forward));
    assert_eq!(keys.lookup('q'), Some(ControlCommand::Quit));
}
