//! Test data builders for creating test objects

use minipc_led::ipc::protocol::SetZoneConfig;
use minipc_led::types::{Brightness, Color, Pattern, Zone};

/// Builder for `SetZone` request configurations
pub struct SetZoneBuilder {
    config: SetZoneConfig,
}

impl SetZoneBuilder {
    pub fn new(zone: Zone) -> Self {
        Self {
            config: SetZoneConfig {
                zone,
                pattern: Pattern::Solid,
                color: Color::WHITE,
                secondary_color: None,
                tertiary_color: None,
                brightness: Brightness::FULL,
            },
        }
    }

    pub fn color(mut self, color: Color) -> Self {
        self.config.color = color;
        self
    }

    pub fn brightness(mut self, percent: u8) -> Self {
        self.config.brightness = Brightness::from_percent(percent);
        self
    }

    pub fn pattern(mut self, pattern: Pattern) -> Self {
        self.config.pattern = pattern;
        self
    }

    pub fn secondary(mut self, color: Color) -> Self {
        self.config.secondary_color = Some(color);
        self
    }

    pub fn build(self) -> SetZoneConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_zone_builder() {
        let config = SetZoneBuilder::new(Zone::Eyes)
            .color(Color::RED)
            .brightness(40)
            .pattern(Pattern::PulseTrain2)
            .secondary(Color::BLUE)
            .build();

        assert_eq!(config.zone, Zone::Eyes);
        assert_eq!(config.brightness.percent(), 40);
        assert_eq!(config.secondary_color, Some(Color::BLUE));
    }
}
