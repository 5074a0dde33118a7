//! Vibration feeder controller.
//!
//! A small PWM board listens on a UART for text lines built from two
//! templates, one for on and one for off, with `{freq}` (Hz) and `{duty}`
//! (percent) placeholders. The board never answers, so state here is what was
//! last sent successfully or attempted.

use crate::config::{VibrationConfig, VibrationLinkConfig};
use crate::hardware::capabilities::LineTransport;
use crate::hardware::uart::SerialLine;
use crate::hardware::ConnectionState;
use std::collections::HashMap;
use strfmt::strfmt;
use tracing::{error, info, warn};

/// Template used when none is configured for the on command
pub const DEFAULT_ON_TEMPLATE: &str = "1,{freq},{duty}\r\n";
/// Template used when none is configured for the off command
pub const DEFAULT_OFF_TEMPLATE: &str = "0,{freq},{duty}\r\n";

const MAX_DUTY: u32 = 100;

/// Feeder output state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerState {
    /// Output disabled
    #[default]
    Off,
    /// Output driven at the commanded frequency and duty
    On,
}

/// Commanded feeder state.
///
/// `frequency`/`duty` are the values of the last command; the `default_*`
/// pair is what a bare "on" uses and what the status line shows while off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VibrationState {
    /// Last commanded power
    pub power: PowerState,
    /// Last commanded frequency, Hz
    pub frequency: u32,
    /// Last commanded duty, percent
    pub duty: u32,
    /// Frequency used when none is given
    pub default_frequency: u32,
    /// Duty used when none is given
    pub default_duty: u32,
}

/// Feeder controller over a [`LineTransport`].
pub struct VibrationController<L: LineTransport = SerialLine> {
    link: VibrationLinkConfig,
    on_template: String,
    off_template: String,
    line: L,
    connection: ConnectionState,
    state: VibrationState,
}

impl VibrationController<SerialLine> {
    /// Controller on a real UART. Nothing is opened yet.
    pub fn new(config: VibrationConfig) -> Self {
        Self::with_line(config, SerialLine::new())
    }
}

impl<L: LineTransport> VibrationController<L> {
    /// Controller on any line transport. Nothing is opened yet.
    pub fn with_line(config: VibrationConfig, line: L) -> Self {
        let duty = config.default_duty.min(MAX_DUTY);
        Self {
            on_template: config
                .commands
                .on
                .unwrap_or_else(|| DEFAULT_ON_TEMPLATE.to_string()),
            off_template: config
                .commands
                .off
                .unwrap_or_else(|| DEFAULT_OFF_TEMPLATE.to_string()),
            link: config.link,
            line,
            connection: ConnectionState::Disconnected,
            state: VibrationState {
                power: PowerState::Off,
                frequency: config.default_freq,
                duty,
                default_frequency: config.default_freq,
                default_duty: duty,
            },
        }
    }

    /// Open the UART. A single attempt; no retries.
    pub async fn connect(&mut self) -> bool {
        match self.line.open(&self.link).await {
            Ok(()) => {
                self.connection = ConnectionState::Connected;
                info!(port = %self.link.port, baud = self.link.baudrate, "Vibration feeder connected");
                true
            }
            Err(e) => {
                self.connection = ConnectionState::Disconnected;
                error!(port = %self.link.port, "Vibration feeder connection failed: {e:#}");
                false
            }
        }
    }

    /// Link opened and not closed since
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    /// Snapshot of the commanded state
    pub fn state(&self) -> VibrationState {
        self.state
    }

    /// Effective (default frequency, default duty)
    pub fn config_values(&self) -> (u32, u32) {
        (self.state.default_frequency, self.state.default_duty)
    }

    /// Effective (on, off) command templates
    pub fn templates(&self) -> (&str, &str) {
        (&self.on_template, &self.off_template)
    }

    fn clamp_duty(duty: u32) -> u32 {
        if duty > MAX_DUTY {
            warn!("Duty {duty}% above {MAX_DUTY}%, clamping");
            MAX_DUTY
        } else {
            duty
        }
    }

    fn render(template: &str, frequency: u32, duty: u32) -> Result<String, strfmt::FmtError> {
        let mut vars = HashMap::new();
        vars.insert("freq".to_string(), frequency.to_string());
        vars.insert("duty".to_string(), duty.to_string());
        let mut command = strfmt(template, &vars)?;
        if !command.ends_with('\n') {
            command.push_str("\r\n");
        }
        Ok(command)
    }

    /// Render and send one command. On: `frequency`/`duty` fall back to the
    /// defaults. Off: always repeats the last commanded values.
    pub async fn send_command(&mut self, on: bool, frequency: Option<u32>, duty: Option<u32>) -> bool {
        if !self.is_connected() {
            warn!("Vibration feeder not connected");
            return false;
        }

        let (power, frequency, duty, template) = if on {
            (
                PowerState::On,
                frequency.unwrap_or(self.state.default_frequency),
                Self::clamp_duty(duty.unwrap_or(self.state.default_duty)),
                &self.on_template,
            )
        } else {
            (PowerState::Off, self.state.frequency, self.state.duty, &self.off_template)
        };

        let command = match Self::render(template, frequency, duty) {
            Ok(command) => command,
            Err(e) => {
                error!("Bad vibration command template '{}': {e}", template.escape_default());
                return false;
            }
        };

        self.state.power = power;
        self.state.frequency = frequency;
        self.state.duty = duty;

        match self.line.write_line(command.as_bytes()).await {
            Ok(()) => {
                info!("PWM command sent: {}", command.trim_end());
                true
            }
            Err(e) => {
                error!("PWM command '{}' failed: {e:#}", command.trim_end());
                false
            }
        }
    }

    /// Switch on; missing values fall back to the defaults
    pub async fn vib_on(&mut self, frequency: Option<u32>, duty: Option<u32>) -> bool {
        self.send_command(true, frequency, duty).await
    }

    /// Switch off, repeating the last commanded values
    pub async fn vib_off(&mut self) -> bool {
        self.send_command(false, None, None).await
    }

    /// New frequency: sent immediately while on, otherwise just remembered.
    pub async fn set_frequency(&mut self, frequency: u32) -> bool {
        if self.state.power == PowerState::On {
            let duty = self.state.duty;
            return self.vib_on(Some(frequency), Some(duty)).await;
        }
        self.state.default_frequency = frequency;
        self.state.frequency = frequency;
        true
    }

    /// New duty: sent immediately while on, otherwise just remembered.
    pub async fn set_duty(&mut self, duty: u32) -> bool {
        let duty = Self::clamp_duty(duty);
        if self.state.power == PowerState::On {
            let frequency = self.state.frequency;
            return self.vib_on(Some(frequency), Some(duty)).await;
        }
        self.state.default_duty = duty;
        self.state.duty = duty;
        true
    }

    /// One-line status, never fails
    pub fn get_status(&self) -> String {
        if !self.is_connected() {
            return "no link".to_string();
        }
        match self.state.power {
            PowerState::On => format!("On: {} Hz, {}%", self.state.frequency, self.state.duty),
            PowerState::Off => format!(
                "Off: {} Hz, {}%",
                self.state.default_frequency, self.state.default_duty
            ),
        }
    }

    /// Switch the feeder off and close the UART. Safe to call more than once.
    pub async fn close(&mut self) {
        if !self.is_connected() {
            return;
        }
        self.vib_off().await;
        if let Err(e) = self.line.close().await {
            warn!("Closing UART failed: {e:#}");
        }
        self.connection = ConnectionState::Disconnected;
        info!("Vibration feeder disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommandTemplates;
    use crate::hardware::mock::MockLine;

    async fn connected(config: VibrationConfig) -> (VibrationController<MockLine>, MockLine) {
        let line = MockLine::new();
        let handle = line.clone();
        let mut vib = VibrationController::with_line(config, line);
        assert!(vib.connect().await);
        (vib, handle)
    }

    #[tokio::test]
    async fn test_on_off_use_defaults_and_carry_values() {
        let (mut vib, line) = connected(VibrationConfig::default()).await;
        assert!(vib.vib_on(None, None).await);
        assert!(vib.vib_off().await);
        assert_eq!(line.lines(), vec!["1,15,50\r\n", "0,15,50\r\n"]);
    }

    #[tokio::test]
    async fn test_off_repeats_last_commanded_values() {
        let (mut vib, line) = connected(VibrationConfig::default()).await;
        vib.vib_on(Some(30), Some(80)).await;
        vib.vib_off().await;
        assert_eq!(line.lines()[1], "0,30,80\r\n");
        assert_eq!(vib.get_status(), "Off: 15 Hz, 50%");
    }

    #[test]
    fn test_config_values_and_templates() {
        let config = VibrationConfig {
            default_freq: 25,
            commands: CommandTemplates {
                on: Some("ON {freq} {duty}".into()),
                off: None,
            },
            ..Default::default()
        };
        let vib = VibrationController::with_line(config, MockLine::new());
        assert_eq!(vib.config_values(), (25, 50));
        assert_eq!(vib.templates(), ("ON {freq} {duty}", DEFAULT_OFF_TEMPLATE));
    }

    #[tokio::test]
    async fn test_terminator_added_once() {
        let config = VibrationConfig {
            commands: CommandTemplates {
                on: Some("ON {freq} {duty}".into()),
                off: Some("OFF\n".into()),
            },
            ..Default::default()
        };
        let (mut vib, line) = connected(config).await;
        vib.vib_on(None, None).await;
        vib.vib_off().await;
        assert_eq!(line.lines(), vec!["ON 15 50\r\n", "OFF\n"]);
    }

    #[tokio::test]
    async fn test_duty_clamped() {
        let (mut vib, line) = connected(VibrationConfig::default()).await;
        vib.vib_on(Some(20), Some(150)).await;
        assert_eq!(line.lines(), vec!["1,20,100\r\n"]);
        assert_eq!(vib.get_status(), "On: 20 Hz, 100%");
    }

    #[tokio::test]
    async fn test_set_frequency_resends_only_when_on() {
        let (mut vib, line) = connected(VibrationConfig::default()).await;
        assert!(vib.set_frequency(25).await);
        assert!(line.lines().is_empty());
        assert_eq!(vib.get_status(), "Off: 25 Hz, 50%");

        vib.vib_on(None, None).await;
        vib.set_duty(60).await;
        assert_eq!(line.lines(), vec!["1,25,50\r\n", "1,25,60\r\n"]);
    }

    #[tokio::test]
    async fn test_bad_template_is_reported() {
        let config = VibrationConfig {
            commands: CommandTemplates {
                on: Some("{power},{freq}".into()),
                off: None,
            },
            ..Default::default()
        };
        let (mut vib, line) = connected(config).await;
        assert!(!vib.vib_on(None, None).await);
        assert!(line.lines().is_empty());
        assert_eq!(vib.state().power, PowerState::Off);
    }

    #[tokio::test]
    async fn test_status_and_commands_without_link() {
        let mut vib = VibrationController::with_line(VibrationConfig::default(), MockLine::new());
        assert_eq!(vib.get_status(), "no link");
        assert!(!vib.vib_on(None, None).await);
    }

    #[tokio::test]
    async fn test_close_sends_off_once() {
        let (mut vib, line) = connected(VibrationConfig::default()).await;
        vib.vib_on(None, None).await;
        vib.close().await;
        vib.close().await;
        assert_eq!(line.lines(), vec!["1,15,50\r\n", "0,15,50\r\n"]);
        assert_eq!(line.close_count(), 1);
        assert_eq!(vib.get_status(), "no link");
    }
}
