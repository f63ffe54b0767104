//! Core data types for minipc-led
//!
//! This module contains the fundamental data structures shared by the
//! device protocol, the state store, the controller and the IPC layer.
//!
//! # Main Types
//!
//! - [`Zone`] - One of the four independently controllable LED regions
//! - [`Pattern`] - A lighting behaviour (solid, breathing, rainbow, ...)
//! - [`Color`] - An immutable packed `0xRRGGBB` value
//! - [`Brightness`] - Percentage at the boundary, 0..=5 level on the device
//! - [`ZoneState`] / [`GlobalState`] - The persisted belief about hardware
//! - [`ConnectionStatus`] - Coarse connection state reported to clients
//!
//! # Brightness Quantization
//!
//! The firmware only understands six brightness levels. Percentages are
//! mapped with `round(percent / 20)`, so `55%` becomes level 3 and reads
//! back as `60%`. Round-trips are not exact; only the rounding direction
//! (nearest) is fixed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::LedError;

/// Schema version written into the persisted state file
pub const STATE_SCHEMA_VERSION: &str = "1.0";

/// Highest brightness level the firmware accepts
pub const MAX_BRIGHTNESS_LEVEL: u8 = 5;

// ==================== Zone ====================

/// One of the four LED regions on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Zone {
    /// Skull logo on the lid
    Skull,
    /// The skull's eyes
    Eyes,
    /// Front panel strip
    Front,
    /// Underglow strip along the base
    Underglow,
}

impl Zone {
    /// All zones in channel order
    pub const ALL: [Zone; 4] = [Zone::Skull, Zone::Eyes, Zone::Front, Zone::Underglow];

    /// Single-letter channel code used by pattern, rainbow and brightness commands
    pub fn channel_code(self) -> char {
        match self {
            Zone::Skull => 'S',
            Zone::Eyes => 'E',
            Zone::Front => 'F',
            Zone::Underglow => 'U',
        }
    }

    /// Numeric color channel used by color commands
    pub fn color_index(self) -> u8 {
        match self {
            Zone::Skull => 0,
            Zone::Eyes => 1,
            Zone::Front => 2,
            Zone::Underglow => 3,
        }
    }

    /// Reverse lookup of [`Zone::channel_code`]
    pub fn from_channel_code(code: char) -> Option<Zone> {
        Zone::ALL
            .into_iter()
            .find(|z| z.channel_code() == code.to_ascii_uppercase())
    }

    /// Reverse lookup of [`Zone::color_index`]
    pub fn from_color_index(index: u8) -> Option<Zone> {
        Zone::ALL.into_iter().find(|z| z.color_index() == index)
    }

    /// Display name for the zone
    pub fn display_name(self) -> &'static str {
        match self {
            Zone::Skull => "Skull",
            Zone::Eyes => "Eyes",
            Zone::Front => "Front",
            Zone::Underglow => "Underglow",
        }
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for Zone {
    type Err = LedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Zone::ALL
            .into_iter()
            .find(|z| z.display_name().to_ascii_lowercase() == lower)
            .or_else(|| {
                let mut chars = lower.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Zone::from_channel_code(c),
                    _ => None,
                }
            })
            .ok_or_else(|| LedError::Protocol(format!("Unknown zone '{}'", s)))
    }
}

// ==================== Pattern ====================

/// Lighting behaviour applied to a zone
///
/// Serialized as its numeric firmware code, both in the state file and on
/// the IPC wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Pattern {
    /// LEDs dark
    #[default]
    Off,
    /// Constant color
    Solid,
    /// Single pulse
    Pulse,
    /// Slow fade in and out
    Breathing,
    /// Fast flashing
    Strobe,
    /// Pulse train alternating two colors
    PulseTrain2,
    /// Pulse train cycling three colors
    PulseTrain3,
    /// Pulse train cycling three colors with a dark step
    PulseTrain4,
    /// Firmware rainbow cycle
    Rainbow,
    /// Firmware rainbow wave across the zone
    RainbowWave,
}

impl Pattern {
    /// All patterns, ordered by complexity
    pub const ALL: [Pattern; 10] = [
        Pattern::Off,
        Pattern::Solid,
        Pattern::Pulse,
        Pattern::Breathing,
        Pattern::Strobe,
        Pattern::PulseTrain2,
        Pattern::PulseTrain3,
        Pattern::PulseTrain4,
        Pattern::Rainbow,
        Pattern::RainbowWave,
    ];

    /// Numeric code sent to the firmware
    pub fn code(self) -> u8 {
        match self {
            Pattern::Off => 0,
            Pattern::Solid => 1,
            Pattern::Pulse => 2,
            Pattern::Breathing => 3,
            Pattern::Strobe => 4,
            Pattern::PulseTrain2 => 5,
            Pattern::PulseTrain3 => 6,
            Pattern::PulseTrain4 => 7,
            Pattern::Rainbow => 8,
            Pattern::RainbowWave => 9,
        }
    }

    /// Look up a pattern by firmware code
    pub fn from_code(code: u8) -> Option<Pattern> {
        Pattern::ALL.into_iter().find(|p| p.code() == code)
    }

    /// Patterns that hold a fixed output (safe first step of the zone sequence)
    pub fn is_static(self) -> bool {
        matches!(self, Pattern::Off | Pattern::Solid)
    }

    /// Firmware-driven rainbow modes
    pub fn is_rainbow(self) -> bool {
        matches!(self, Pattern::Rainbow | Pattern::RainbowWave)
    }

    /// Number of auxiliary color channels the pattern reads
    pub fn aux_color_count(self) -> usize {
        match self {
            Pattern::PulseTrain2 => 1,
            Pattern::PulseTrain3 | Pattern::PulseTrain4 => 2,
            _ => 0,
        }
    }

    /// Display name for the pattern
    pub fn display_name(self) -> &'static str {
        match self {
            Pattern::Off => "Off",
            Pattern::Solid => "Solid",
            Pattern::Pulse => "Pulse",
            Pattern::Breathing => "Breathing",
            Pattern::Strobe => "Strobe",
            Pattern::PulseTrain2 => "PulseTrain2",
            Pattern::PulseTrain3 => "PulseTrain3",
            Pattern::PulseTrain4 => "PulseTrain4",
            Pattern::Rainbow => "Rainbow",
            Pattern::RainbowWave => "RainbowWave",
        }
    }
}

impl From<Pattern> for u8 {
    fn from(pattern: Pattern) -> u8 {
        pattern.code()
    }
}

impl TryFrom<u8> for Pattern {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Pattern::from_code(code).ok_or_else(|| format!("unknown pattern code {}", code))
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for Pattern {
    type Err = LedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<u8>() {
            return Pattern::from_code(code)
                .ok_or_else(|| LedError::Protocol(format!("Unknown pattern code {}", code)));
        }
        let lower = trimmed.to_ascii_lowercase().replace(['-', '_'], "");
        Pattern::ALL
            .into_iter()
            .find(|p| p.display_name().to_ascii_lowercase() == lower)
            .ok_or_else(|| LedError::Protocol(format!("Unknown pattern '{}'", s)))
    }
}

// ==================== Color ====================

/// 24-bit RGB color packed as `0xRRGGBB`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(u32);

impl Color {
    pub const RED: Color = Color(0xFF0000);
    pub const GREEN: Color = Color(0x00FF00);
    pub const BLUE: Color = Color(0x0000FF);
    pub const YELLOW: Color = Color(0xFFFF00);
    pub const PURPLE: Color = Color(0x800080);
    pub const CYAN: Color = Color(0x00FFFF);
    pub const WHITE: Color = Color(0xFFFFFF);
    pub const BLACK: Color = Color(0x000000);
    pub const ORANGE: Color = Color(0xFFA500);
    /// Alias for [`Color::BLACK`]
    pub const OFF: Color = Color::BLACK;

    /// Create a color from a packed value; bits above 24 are discarded
    pub const fn from_packed(value: u32) -> Self {
        Color(value & 0x00FF_FFFF)
    }

    /// Create a color from components
    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Color(((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    /// Packed `0xRRGGBB` value
    pub const fn packed(self) -> u32 {
        self.0
    }

    /// Red, green and blue components
    pub const fn rgb(self) -> (u8, u8, u8) {
        ((self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8)
    }

    /// Whether the color produces no light
    pub const fn is_black(self) -> bool {
        self.0 == 0
    }

    /// Upper-case six digit hex form used by the firmware
    pub fn to_hex(self) -> String {
        format!("{:06X}", self.0)
    }

    /// Look up one of the named constants
    pub fn named(name: &str) -> Option<Color> {
        match name.trim().to_ascii_lowercase().as_str() {
            "red" => Some(Color::RED),
            "green" => Some(Color::GREEN),
            "blue" => Some(Color::BLUE),
            "yellow" => Some(Color::YELLOW),
            "purple" => Some(Color::PURPLE),
            "cyan" => Some(Color::CYAN),
            "white" => Some(Color::WHITE),
            "black" | "off" => Some(Color::BLACK),
            "orange" => Some(Color::ORANGE),
            _ => None,
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.to_hex())
    }
}

impl FromStr for Color {
    type Err = LedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(color) = Color::named(s) {
            return Ok(color);
        }
        let trimmed = s.trim();
        let hex = trimmed
            .strip_prefix('#')
            .or_else(|| trimmed.strip_prefix("0x"))
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if hex.len() != 6 {
            return Err(LedError::Protocol(format!("Invalid color '{}'", s)));
        }
        u32::from_str_radix(hex, 16)
            .map(Color::from_packed)
            .map_err(|_| LedError::Protocol(format!("Invalid color '{}'", s)))
    }
}

// ==================== Brightness ====================

/// Brightness expressed as a 0..=100 percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Brightness(u8);

impl Brightness {
    /// Full brightness
    pub const FULL: Brightness = Brightness(100);

    /// Create from a percentage, clamping above 100
    pub fn from_percent(percent: u8) -> Self {
        Brightness(percent.min(100))
    }

    /// Create from a firmware level, clamping above [`MAX_BRIGHTNESS_LEVEL`]
    pub fn from_level(level: u8) -> Self {
        Brightness(level.min(MAX_BRIGHTNESS_LEVEL) * 20)
    }

    /// Raw percentage as supplied
    pub fn percent(self) -> u8 {
        self.0
    }

    /// Firmware level: `round(percent / 20)`
    pub fn level(self) -> u8 {
        ((self.0 as u16 + 10) / 20) as u8
    }

    /// Percentage the device actually shows after quantization
    pub fn quantized(self) -> Brightness {
        Brightness::from_level(self.level())
    }
}

impl Default for Brightness {
    fn default() -> Self {
        Brightness::FULL
    }
}

impl std::fmt::Display for Brightness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

// ==================== Zone State ====================

/// Persisted configuration of one zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneState {
    /// Zone this record describes (kept in sync with the map key on load)
    #[serde(default = "default_zone")]
    pub zone: Zone,

    /// Primary color
    #[serde(default)]
    pub color: Color,

    /// Quantized brightness percentage
    #[serde(default)]
    pub brightness: Brightness,

    /// Active pattern
    #[serde(default)]
    pub pattern: Pattern,

    /// Whether the zone is lit
    #[serde(default)]
    pub enabled: bool,

    /// When this record last changed
    #[serde(default = "Utc::now")]
    pub last_changed: DateTime<Utc>,
}

fn default_zone() -> Zone {
    Zone::Skull
}

impl ZoneState {
    /// The all-off default for a zone
    pub fn off(zone: Zone) -> Self {
        Self {
            zone,
            color: Color::BLACK,
            brightness: Brightness::FULL,
            pattern: Pattern::Off,
            enabled: false,
            last_changed: Utc::now(),
        }
    }

    /// Whether the record differs from the given values (timestamp ignored)
    pub fn differs(
        &self,
        color: Color,
        brightness: Brightness,
        pattern: Pattern,
        enabled: bool,
    ) -> bool {
        self.color != color
            || self.brightness != brightness
            || self.pattern != pattern
            || self.enabled != enabled
    }

    /// Whether the restore pass should replay this zone
    pub fn needs_restore(&self) -> bool {
        self.enabled && !self.color.is_black() && self.pattern != Pattern::Off
    }
}

// ==================== Global State ====================

/// The application's belief about the hardware configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalState {
    /// Master LED switch
    #[serde(default)]
    pub leds_enabled: bool,

    /// Whether any enabled zone runs a firmware effect (rainbow)
    #[serde(default)]
    pub effects_enabled: bool,

    /// Per-zone records
    #[serde(default)]
    pub zones: BTreeMap<Zone, ZoneState>,

    /// Last time the state was written
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,

    /// Schema version of the file
    #[serde(default = "default_schema_version")]
    pub version: String,
}

fn default_schema_version() -> String {
    STATE_SCHEMA_VERSION.to_string()
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            leds_enabled: false,
            effects_enabled: false,
            zones: Zone::ALL.into_iter().map(|z| (z, ZoneState::off(z))).collect(),
            last_updated: Utc::now(),
            version: default_schema_version(),
        }
    }
}

impl GlobalState {
    /// Get a zone record; every zone is present after [`GlobalState::normalize`]
    pub fn zone(&self, zone: Zone) -> ZoneState {
        self.zones
            .get(&zone)
            .cloned()
            .unwrap_or_else(|| ZoneState::off(zone))
    }

    /// Fill missing zones, sync zone fields with map keys and recompute derived flags
    ///
    /// Used after loading a file written by an older or partial schema.
    pub fn normalize(&mut self) {
        for zone in Zone::ALL {
            let entry = self.zones.entry(zone).or_insert_with(|| ZoneState::off(zone));
            entry.zone = zone;
            entry.brightness = entry.brightness.quantized();
        }
        self.recompute_effects();
    }

    /// Recompute `effects_enabled` from the zone records
    pub fn recompute_effects(&mut self) {
        self.effects_enabled = self
            .zones
            .values()
            .any(|z| z.enabled && z.pattern.is_rainbow());
    }

    /// Whether every zone is disabled
    pub fn all_zones_off(&self) -> bool {
        self.zones.values().all(|z| !z.enabled)
    }

    /// Equality ignoring the `last_updated` and `last_changed` timestamps
    pub fn same_configuration(&self, other: &GlobalState) -> bool {
        self.leds_enabled == other.leds_enabled
            && self.effects_enabled == other.effects_enabled
            && self.version == other.version
            && Zone::ALL.iter().all(|&z| {
                let a = self.zone(z);
                let b = other.zone(z);
                !a.differs(b.color, b.brightness, b.pattern, b.enabled)
            })
    }
}

// ==================== Connection Status ====================

/// Coarse connection status reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// No open session
    #[default]
    Disconnected,
    /// Lock acquisition / verification in progress
    Connecting,
    /// Session open and verified
    Connected,
    /// Last connection attempt failed
    Error,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connecting => write!(f, "Connecting..."),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Error => write!(f, "Error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zone_mapping_is_bijective() {
        for zone in Zone::ALL {
            assert_eq!(Zone::from_channel_code(zone.channel_code()), Some(zone));
            assert_eq!(Zone::from_color_index(zone.color_index()), Some(zone));
        }
        assert_eq!(Zone::from_channel_code('x'), None);
        assert_eq!(Zone::from_color_index(4), None);
    }

    #[test]
    fn test_zone_from_str() {
        assert_eq!("skull".parse::<Zone>().unwrap(), Zone::Skull);
        assert_eq!("U".parse::<Zone>().unwrap(), Zone::Underglow);
        assert!("lid".parse::<Zone>().is_err());
    }

    #[test]
    fn test_pattern_codes_and_families() {
        for pattern in Pattern::ALL {
            assert_eq!(Pattern::from_code(pattern.code()), Some(pattern));
        }
        assert!(Pattern::Solid.is_static());
        assert!(!Pattern::Breathing.is_static());
        assert!(Pattern::RainbowWave.is_rainbow());
        assert_eq!(Pattern::PulseTrain2.aux_color_count(), 1);
        assert_eq!(Pattern::PulseTrain4.aux_color_count(), 2);
        assert_eq!("pulse-train3".parse::<Pattern>().unwrap(), Pattern::PulseTrain3);
        assert_eq!("8".parse::<Pattern>().unwrap(), Pattern::Rainbow);
    }

    #[test]
    fn test_pattern_serializes_as_code() {
        let json = serde_json::to_string(&Pattern::Breathing).unwrap();
        assert_eq!(json, "3");
        let parsed: Pattern = serde_json::from_str("8").unwrap();
        assert_eq!(parsed, Pattern::Rainbow);
        assert!(serde_json::from_str::<Pattern>("42").is_err());
    }

    #[test]
    fn test_color_parsing() {
        assert_eq!("red".parse::<Color>().unwrap(), Color::RED);
        assert_eq!("#00ff00".parse::<Color>().unwrap(), Color::GREEN);
        assert_eq!("0x0000FF".parse::<Color>().unwrap(), Color::BLUE);
        assert_eq!("FFA500".parse::<Color>().unwrap(), Color::ORANGE);
        assert!("#12345".parse::<Color>().is_err());
        assert_eq!(Color::from_rgb(0x12, 0x34, 0x56).to_hex(), "123456");
        assert_eq!(Color::from_packed(0xAB12_3456).packed(), 0x12_3456);
        assert!(Color::OFF.is_black());
    }

    #[test]
    fn test_brightness_quantization() {
        assert_eq!(Brightness::from_percent(0).level(), 0);
        assert_eq!(Brightness::from_percent(9).level(), 0);
        assert_eq!(Brightness::from_percent(10).level(), 1);
        assert_eq!(Brightness::from_percent(50).level(), 3);
        assert_eq!(Brightness::from_percent(55).quantized().percent(), 60);
        assert_eq!(Brightness::from_percent(100).level(), 5);
        assert_eq!(Brightness::from_percent(250).percent(), 100);
        assert_eq!(Brightness::from_level(9).percent(), 100);
    }

    #[test]
    fn test_default_global_state() {
        let state = GlobalState::default();
        assert!(!state.leds_enabled);
        assert_eq!(state.zones.len(), 4);
        assert!(state.all_zones_off());
        assert_eq!(state.zone(Zone::Eyes).brightness, Brightness::FULL);
        assert_eq!(state.version, STATE_SCHEMA_VERSION);
    }

    #[test]
    fn test_global_state_tolerates_missing_fields() {
        let json = r#"{"ledsEnabled": true, "zones": {"Eyes": {"color": 255, "enabled": true, "pattern": 8}}}"#;
        let mut state: GlobalState = serde_json::from_str(json).unwrap();
        state.normalize();

        assert!(state.leds_enabled);
        assert_eq!(state.zones.len(), 4);
        let eyes = state.zone(Zone::Eyes);
        assert_eq!(eyes.zone, Zone::Eyes);
        assert_eq!(eyes.color, Color::BLUE);
        assert_eq!(eyes.brightness, Brightness::FULL);
        assert!(state.effects_enabled);
        assert!(!state.zone(Zone::Front).enabled);
    }

    proptest! {
        #[test]
        fn prop_quantization_is_nearest_level(percent in 0u8..=100) {
            let b = Brightness::from_percent(percent);
            let shown = b.quantized().percent() as i16;
            prop_assert!((shown - percent as i16).abs() <= 10);
            prop_assert_eq!(shown % 20, 0);
            prop_assert!(b.level() <= MAX_BRIGHTNESS_LEVEL);
        }

        #[test]
        fn prop_quantization_is_idempotent(percent in 0u8..=255) {
            let once = Brightness::from_percent(percent).quantized();
            prop_assert_eq!(once.quantized(), once);
        }
    }
}
