//! Text commands understood by the LED controller firmware
//!
//! Every command is one ASCII line terminated by `\n`:
//!
//! | Command | Text | Example |
//! |---------|------|---------|
//! | reset | `RST` | `RST` |
//! | power | `PWR <0/1>` | `PWR 1` |
//! | pattern | `PAT <code> <n>` | `PAT S 1` |
//! | rainbow | `RBW <code> <0/1>` | `RBW S 0` |
//! | color | `COL <index> <RRGGBB>` | `COL 0 FF0000` |
//! | aux color | `COL <index>.<slot> <RRGGBB>` | `COL 0.2 00FF00` |
//! | brightness | `BRT <code> <0..5>` | `BRT S 5` |
//!
//! Zone-addressed commands use the zone's channel letter, color commands use
//! its numeric color channel.

use crate::types::{Color, Pattern, Zone};

/// A single firmware command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Reset token; required once per power-on
    Reset,
    /// Master LED switch
    Power(bool),
    /// Select a pattern on a zone
    Pattern(Zone, Pattern),
    /// Enable or disable the sticky rainbow mode on a zone
    Rainbow(Zone, bool),
    /// Primary color of a zone
    Color(Zone, Color),
    /// Auxiliary color slot (2 or 3) used by pulse-train patterns
    AuxColor(Zone, u8, Color),
    /// Brightness level 0..=5
    Brightness(Zone, u8),
}

impl DeviceCommand {
    /// Encode the command as the firmware's text form (without terminator)
    pub fn encode(&self) -> String {
        match *self {
            DeviceCommand::Reset => "RST".to_string(),
            DeviceCommand::Power(on) => format!("PWR {}", on as u8),
            DeviceCommand::Pattern(zone, pattern) => {
                format!("PAT {} {}", zone.channel_code(), pattern.code())
            }
            DeviceCommand::Rainbow(zone, on) => {
                format!("RBW {} {}", zone.channel_code(), on as u8)
            }
            DeviceCommand::Color(zone, color) => {
                format!("COL {} {}", zone.color_index(), color.to_hex())
            }
            DeviceCommand::AuxColor(zone, slot, color) => {
                format!("COL {}.{} {}", zone.color_index(), slot, color.to_hex())
            }
            DeviceCommand::Brightness(zone, level) => {
                format!("BRT {} {}", zone.channel_code(), level)
            }
        }
    }

    /// Encoded form with the line terminator, ready for the wire
    pub fn to_line(&self) -> String {
        let mut line = self.encode();
        line.push('\n');
        line
    }
}

impl std::fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_commands() {
        assert_eq!(DeviceCommand::Reset.encode(), "RST");
        assert_eq!(DeviceCommand::Power(true).encode(), "PWR 1");
        assert_eq!(
            DeviceCommand::Pattern(Zone::Skull, Pattern::Solid).encode(),
            "PAT S 1"
        );
        assert_eq!(DeviceCommand::Rainbow(Zone::Eyes, false).encode(), "RBW E 0");
        assert_eq!(
            DeviceCommand::Color(Zone::Front, Color::ORANGE).encode(),
            "COL 2 FFA500"
        );
        assert_eq!(
            DeviceCommand::AuxColor(Zone::Underglow, 3, Color::CYAN).encode(),
            "COL 3.3 00FFFF"
        );
        assert_eq!(DeviceCommand::Brightness(Zone::Skull, 5).encode(), "BRT S 5");
    }

    #[test]
    fn test_line_terminator() {
        assert_eq!(DeviceCommand::Power(false).to_line(), "PWR 0\n");
    }
}
