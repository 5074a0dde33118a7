//! Operator commands and their key bindings.

use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// Everything the operator can ask the cell to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCommand {
    /// Jog the belt forward
    Forward,
    /// Jog the belt in reverse
    Reverse,
    /// Stop the belt
    Stop,
    /// Raise the jog speed by one step
    SpeedUp,
    /// Lower the jog speed by one step
    SpeedDown,
    /// Switch the feeder on with its defaults
    VibrationOn,
    /// Switch the feeder off
    VibrationOff,
    /// Leave the operator loop
    Quit,
}

impl ControlCommand {
    /// Every command, in help order
    pub const ALL: [ControlCommand; 8] = [
        Self::Forward,
        Self::Reverse,
        Self::Stop,
        Self::SpeedUp,
        Self::SpeedDown,
        Self::VibrationOn,
        Self::VibrationOff,
        Self::Quit,
    ];

    /// Action name used in `[control.keys]`
    pub const fn action_name(self) -> &'static str {
        match self {
            Self::Forward => "start_conveyor",
            Self::Reverse => "reverse_conveyor",
            Self::Stop => "stop_conveyor",
            Self::SpeedUp => "increase_speed",
            Self::SpeedDown => "decrease_speed",
            Self::VibrationOn => "vib_on",
            Self::VibrationOff => "vib_off",
            Self::Quit => "quit",
        }
    }

    /// Key bound when the config names none
    pub const fn default_key(self) -> char {
        match self {
            Self::Forward => 'w',
            Self::Reverse => 's',
            Self::Stop => ' ',
            Self::SpeedUp => 'd',
            Self::SpeedDown => 'a',
            Self::VibrationOn => 'v',
            Self::VibrationOff => 'b',
            Self::Quit => 'q',
        }
    }

    /// Command for a `control.keys` action name
    pub fn from_action_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.action_name() == name)
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action_name())
    }
}

/// Key to command table. Keys are matched case-insensitively; space always
/// stops the belt.
#[derive(Debug, Clone)]
pub struct KeyBindings {
    keys: HashMap<char, ControlCommand>,
}

impl KeyBindings {
    /// Defaults overridden by `[control.keys]` (`action = "key"`). Unknown
    /// actions and empty keys are skipped with a warning.
    pub fn from_config(overrides: &HashMap<String, String>) -> Self {
        let mut assigned: HashMap<ControlCommand, char> =
            ControlCommand::ALL.into_iter().map(|c| (c, c.default_key())).collect();

        for (action, key) in overrides {
            let Some(command) = ControlCommand::from_action_name(action) else {
                warn!("Unknown key binding action '{action}'");
                continue;
            };
            let Some(key) = key.chars().next() else {
                warn!("Empty key for '{action}', keeping default");
                continue;
            };
            assigned.insert(command, key.to_ascii_lowercase());
        }

        let mut keys: HashMap<char, ControlCommand> = assigned.into_iter().map(|(c, k)| (k, c)).collect();
        keys.insert(' ', ControlCommand::Stop);
        Self { keys }
    }

    /// Command bound to `key`, ignoring case
    pub fn lookup(&self, key: char) -> Option<ControlCommand> {
        self.keys.get(&key.to_ascii_lowercase()).copied()
    }

    /// Key currently bound to `command`
    pub fn key_for(&self, command: ControlCommand) -> Option<char> {
        let mut bound = self.keys.iter().filter(|(_, c)| **c == command).map(|(k, _)| *k);
        let first = bound.next()?;
        // Space is the fixed stop key; show the configured one when there is one
        if first == ' ' {
            return Some(bound.next().unwrap_or(' '));
        }
        Some(first)
    }

    /// One line per command, for the startup banner
    pub fn help(&self) -> String {
        ControlCommand::ALL
            .into_iter()
            .filter_map(|c| {
                self.key_for(c).map(|k| {
                    let key = if k == ' ' { "space".to_string() } else { k.to_string() };
                    format!("{key:>5}  {c}")
                })
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self::from_config(&HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bindings() {
        let keys = KeyBindings::default();
        assert_eq!(keys.lookup('w'), Some(ControlCommand::Forward));
        assert_eq!(keys.lookup('W'), Some(ControlCommand::Forward));
        assert_eq!(keys.lookup(' '), Some(ControlCommand::Stop));
        assert_eq!(keys.lookup('q'), Some(ControlCommand::Quit));
        assert_eq!(keys.lookup('x'), None);
    }

    #[test]
    fn test_overrides_replace_defaults() {
        let overrides = HashMap::from([
            ("stop_conveyor".to_string(), "x".to_string()),
            ("teleport".to_string(), "t".to_string()),
        ]);
        let keys = KeyBindings::from_config(&overrides);
        assert_eq!(keys.lookup('x'), Some(ControlCommand::Stop));
        assert_eq!(keys.lookup(' '), Some(ControlCommand::Stop));
        assert_eq!(keys.lookup('t'), None);
        assert_eq!(keys.key_for(ControlCommand::Stop), Some('x'));
    }

    #[test]
    fn test_action_names_round_trip() {
        for command in ControlCommand::ALL {
            assert_eq!(ControlCommand::from_action_name(command.action_name()), Some(command));
        }
    }

    #[test]
    fn test_help_lists_every_command() {
        let help = KeyBindings::default().help();
        assert_eq!(help.lines().count(), ControlCommand::ALL.len());
        assert!(help.contains("space  stop_conveyor"));
    }
}
