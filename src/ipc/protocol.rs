//! IPC request and response types
//!
//! Requests and responses are camelCase JSON objects:
//!
//! ```json
//! {"version": 1, "commandType": "SetZone", "commandId": "4f1c...",
//!  "configuration": {"zone": "Eyes", "pattern": 1, "color": "#FF0000", "brightness": 80}}
//!
//! {"commandId": "4f1c...", "success": true, "message": "Eyes set to ...",
//!  "data": {...}}
//! ```
//!
//! Colors are accepted as packed numbers or as text (`#RRGGBB`, `RRGGBB`,
//! `0xRRGGBB`, or a color name). Patterns use their numeric code or name.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::controller::CommandResult;
use crate::device::ZoneApply;
use crate::error::{LedError, Result};
use crate::types::{Brightness, Color, Pattern, Zone};

/// Version carried by every request; a mismatch fails the request
pub const PROTOCOL_VERSION: u32 = 1;

/// Request kinds understood by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandType {
    Ping,
    Connect,
    Disconnect,
    GetStatus,
    SetZone,
    SetAllZones,
    TurnOn,
    TurnOffAll,
    Shutdown,
}

impl CommandType {
    /// Whether the request needs an open session (and may trigger a reconnect)
    pub fn touches_device(self) -> bool {
        matches!(
            self,
            CommandType::SetZone
                | CommandType::SetAllZones
                | CommandType::TurnOn
                | CommandType::TurnOffAll
        )
    }

    /// Whether the service answers before the work is done
    pub fn is_fire_and_forget(self) -> bool {
        matches!(self, CommandType::TurnOn | CommandType::TurnOffAll)
    }
}

impl std::fmt::Display for CommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ==================== Request ====================

/// A command sent to the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpcRequest {
    /// Missing versions read as 0 and are rejected like any other mismatch
    #[serde(default)]
    pub version: u32,
    pub command_type: CommandType,
    #[serde(default)]
    pub command_id: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub configuration: serde_json::Value,
}

impl IpcRequest {
    /// New request with a fresh command id and no configuration
    pub fn new(command_type: CommandType) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            command_type,
            command_id: uuid::Uuid::new_v4().to_string(),
            configuration: serde_json::Value::Null,
        }
    }

    /// Attach a configuration object
    pub fn with_configuration<T: Serialize>(mut self, configuration: &T) -> Result<Self> {
        self.configuration = serde_json::to_value(configuration)?;
        Ok(self)
    }

    /// Decode the configuration object
    pub fn configuration<T: DeserializeOwned>(&self) -> Result<T> {
        if self.configuration.is_null() {
            return Err(LedError::Protocol(format!(
                "{} requires a configuration object",
                self.command_type
            )));
        }
        serde_json::from_value(self.configuration.clone()).map_err(|e| {
            LedError::Protocol(format!("Invalid {} configuration: {}", self.command_type, e))
        })
    }

    /// Decode the configuration object, using the default when absent
    pub fn configuration_or_default<T: DeserializeOwned + Default>(&self) -> Result<T> {
        if self.configuration.is_null() {
            return Ok(T::default());
        }
        self.configuration()
    }
}

/// `Connect` configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
}

/// `SetZone` configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetZoneConfig {
    pub zone: Zone,
    #[serde(default = "default_pattern", deserialize_with = "pattern_value")]
    pub pattern: Pattern,
    #[serde(deserialize_with = "color_value")]
    pub color: Color,
    #[serde(
        default,
        deserialize_with = "optional_color_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub secondary_color: Option<Color>,
    #[serde(
        default,
        deserialize_with = "optional_color_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub tertiary_color: Option<Color>,
    #[serde(default, deserialize_with = "brightness_value")]
    pub brightness: Brightness,
}

impl SetZoneConfig {
    pub fn to_apply(&self) -> ZoneApply {
        ZoneApply::solid(self.zone, self.color, self.brightness)
            .with_pattern(self.pattern)
            .with_aux_colors(self.secondary_color, self.tertiary_color)
    }
}

/// `SetAllZones` configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAllZonesConfig {
    #[serde(deserialize_with = "color_value")]
    pub color: Color,
    #[serde(default, deserialize_with = "brightness_value")]
    pub brightness: Brightness,
}

fn default_pattern() -> Pattern {
    Pattern::Solid
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(u64),
    Text(String),
}

fn color_value<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Color, D::Error> {
    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(n) if n <= 0xFF_FFFF => Ok(Color::from_packed(n as u32)),
        NumberOrText::Number(n) => Err(serde::de::Error::custom(format!(
            "color {:#x} exceeds 24 bits",
            n
        ))),
        NumberOrText::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn optional_color_value<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<Color>, D::Error> {
    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(n)) if n <= 0xFF_FFFF => Ok(Some(Color::from_packed(n as u32))),
        Some(NumberOrText::Number(n)) => Err(serde::de::Error::custom(format!(
            "color {:#x} exceeds 24 bits",
            n
        ))),
        Some(NumberOrText::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

fn pattern_value<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Pattern, D::Error> {
    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(n) => u8::try_from(n)
            .ok()
            .and_then(Pattern::from_code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown pattern code {}", n))),
        NumberOrText::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Percentages above 100 clamp
fn brightness_value<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Brightness, D::Error> {
    let percent = u64::deserialize(deserializer)?;
    Ok(Brightness::from_percent(percent.min(100) as u8))
}

// ==================== Response ====================

/// The service's answer to one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpcResponse {
    pub command_id: String,
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

impl IpcResponse {
    pub fn ok(command_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            command_id: command_id.into(),
            success: true,
            message: message.into(),
            data: None,
            error_details: None,
        }
    }

    pub fn failure(
        command_id: impl Into<String>,
        message: impl Into<String>,
        details: Option<String>,
    ) -> Self {
        Self {
            command_id: command_id.into(),
            success: false,
            message: message.into(),
            data: None,
            error_details: details,
        }
    }

    /// Wrap a controller result
    pub fn from_result(command_id: impl Into<String>, result: CommandResult) -> Self {
        Self {
            command_id: command_id.into(),
            success: result.success,
            message: result.message,
            data: result.data,
            error_details: result.error_details,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let request = IpcRequest::new(CommandType::SetAllZones)
            .with_configuration(&SetAllZonesConfig {
                color: Color::RED,
                brightness: Brightness::from_percent(80),
            })
            .unwrap();
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["version"], 1);
        assert_eq!(value["commandType"], "SetAllZones");
        assert_eq!(value["configuration"]["color"], 0xFF0000);
        assert_eq!(value["configuration"]["brightness"], 80);
        assert!(uuid::Uuid::parse_str(value["commandId"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_set_zone_config_accepts_text_values() {
        let request: IpcRequest = serde_json::from_value(json!({
            "version": 1,
            "commandType": "SetZone",
            "commandId": "abc",
            "configuration": {
                "zone": "Eyes",
                "pattern": "PulseTrain2",
                "color": "#00FF00",
                "secondaryColor": "purple",
                "brightness": 250
            }
        }))
        .unwrap();

        let config: SetZoneConfig = request.configuration().unwrap();
        assert_eq!(config.zone, Zone::Eyes);
        assert_eq!(config.pattern, Pattern::PulseTrain2);
        assert_eq!(config.color, Color::GREEN);
        assert_eq!(config.secondary_color, Some(Color::PURPLE));
        assert_eq!(config.tertiary_color, None);
        assert_eq!(config.brightness, Brightness::FULL);
    }

    #[test]
    fn test_set_zone_config_defaults() {
        let config: SetZoneConfig =
            serde_json::from_value(json!({"zone": "Skull", "color": 255})).unwrap();
        assert_eq!(config.pattern, Pattern::Solid);
        assert_eq!(config.color, Color::BLUE);
        assert_eq!(config.brightness, Brightness::FULL);
    }

    #[test]
    fn test_invalid_configuration() {
        let mut request = IpcRequest::new(CommandType::SetZone);
        assert!(matches!(
            request.configuration::<SetZoneConfig>(),
            Err(LedError::Protocol(_))
        ));

        request.configuration = json!({"zone": "Lid", "color": 0});
        assert!(request.configuration::<SetZoneConfig>().is_err());

        request.configuration = json!({"zone": "Skull", "color": 0x1000000u64});
        assert!(request.configuration::<SetZoneConfig>().is_err());
    }

    #[test]
    fn test_connect_config_optional() {
        let request = IpcRequest::new(CommandType::Connect);
        let config: ConnectConfig = request.configuration_or_default().unwrap();
        assert_eq!(config.port, None);
    }

    #[test]
    fn test_response_from_result() {
        let response = IpcResponse::from_result(
            "id-1",
            CommandResult::failure("Not connected to LED device", "no session"),
        );
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["commandId"], "id-1");
        assert_eq!(value["success"], false);
        assert_eq!(value["errorDetails"], "no session");
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_fire_and_forget_commands() {
        assert!(CommandType::TurnOn.is_fire_and_forget());
        assert!(CommandType::TurnOffAll.touches_device());
        assert!(!CommandType::GetStatus.touches_device());
    }
}
