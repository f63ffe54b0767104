//! Command sequencing for the LED controller
//!
//! The firmware has a persistent rainbow/demo mode that survives naive
//! overwrites. The only reliable way to leave it is, per zone and in this
//! exact order:
//!
//! 1. select a static pattern
//! 2. disable rainbow
//! 3. set the color (plus auxiliary colors for pulse-train patterns)
//! 4. set the brightness
//!
//! each separated by the settle delay. Swapping steps 1 and 2 re-triggers
//! rainbow mode, so the sequence is only reachable through
//! [`DeviceProtocol::apply_zone`] and the bulk operations built on it; the
//! individual steps are private.
//!
//! Bulk operations batch by command type across zones (all patterns, then
//! all rainbow-disables, ...). Batching by zone lets one zone's rainbow
//! bleed back into its neighbours.
//!
//! The device never acknowledges anything. Success here means no transport
//! error, nothing more.

use std::time::Duration;

use super::command::DeviceCommand;
use super::transport::DeviceTransport;
use crate::config::TimingConfig;
use crate::error::{LedError, Result};
use crate::types::{Brightness, Color, Pattern, Zone};

/// Number of anti-rainbow passes on each side of the default color in `power_on_default`
const POWER_ON_RAINBOW_PASSES: usize = 2;

/// Full configuration of one zone, applied atomically
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneApply {
    /// Target zone
    pub zone: Zone,
    /// Requested pattern
    pub pattern: Pattern,
    /// Primary color
    pub primary: Color,
    /// Second color (pulse-train patterns)
    pub secondary: Option<Color>,
    /// Third color (three-color pulse-train patterns)
    pub tertiary: Option<Color>,
    /// Brightness
    pub brightness: Brightness,
}

impl ZoneApply {
    /// Solid color on a zone
    pub fn solid(zone: Zone, color: Color, brightness: Brightness) -> Self {
        Self {
            zone,
            pattern: Pattern::Solid,
            primary: color,
            secondary: None,
            tertiary: None,
            brightness,
        }
    }

    /// Change the pattern
    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Set the auxiliary colors
    pub fn with_aux_colors(mut self, secondary: Option<Color>, tertiary: Option<Color>) -> Self {
        self.secondary = secondary;
        self.tertiary = tertiary;
        self
    }

    /// The static pattern selected in step 1
    fn static_pattern(&self) -> Pattern {
        if self.pattern == Pattern::Off {
            Pattern::Off
        } else {
            Pattern::Solid
        }
    }

    /// Auxiliary color writes for the requested pattern
    ///
    /// Missing colors fall back to the primary color.
    fn aux_commands(&self) -> Vec<DeviceCommand> {
        let colors = [self.secondary, self.tertiary];
        (0..self.pattern.aux_color_count())
            .map(|i| {
                let color = colors[i].unwrap_or(self.primary);
                DeviceCommand::AuxColor(self.zone, i as u8 + 2, color)
            })
            .collect()
    }

    /// Commands that select the requested animated pattern after the safe steps
    fn final_commands(&self) -> Vec<DeviceCommand> {
        if self.pattern.is_static() {
            return Vec::new();
        }
        let mut commands = vec![DeviceCommand::Pattern(self.zone, self.pattern)];
        if self.pattern.is_rainbow() {
            commands.push(DeviceCommand::Rainbow(self.zone, true));
        }
        commands
    }
}

/// Sequenced access to an open LED controller
pub struct DeviceProtocol {
    /// The open port
    transport: Box<dyn DeviceTransport>,
    /// Command pacing
    timing: TimingConfig,
    /// Commands written since the port was opened
    commands_sent: u64,
}

impl DeviceProtocol {
    /// Wrap an open transport
    pub fn new(transport: Box<dyn DeviceTransport>, timing: TimingConfig) -> Self {
        Self {
            transport,
            timing,
            commands_sent: 0,
        }
    }

    /// Port name of the underlying transport
    pub fn port_name(&self) -> &str {
        self.transport.port_name()
    }

    /// Number of commands written so far
    pub fn commands_sent(&self) -> u64 {
        self.commands_sent
    }

    /// Send the hardware reset token
    pub async fn reset(&mut self) -> Result<()> {
        self.send(DeviceCommand::Reset).await
    }

    /// Switch the LED subsystem on or off
    pub async fn set_power(&mut self, on: bool) -> Result<()> {
        self.send(DeviceCommand::Power(on)).await
    }

    /// Liveness check: power off then on
    ///
    /// Any transport error is a failure; a silent device cannot be told
    /// apart from a working one here, which is why the session treats the
    /// whole connect as failed on error rather than retrying commands.
    pub async fn power_cycle(&mut self) -> Result<()> {
        self.set_power(false).await?;
        self.set_power(true).await
    }

    /// Apply a complete configuration to one zone
    pub async fn apply_zone(&mut self, apply: &ZoneApply) -> Result<()> {
        tracing::debug!(
            "Applying {} to {} ({}, {})",
            apply.pattern,
            apply.zone,
            apply.primary,
            apply.brightness
        );

        let zone = apply.zone;
        self.send(DeviceCommand::Pattern(zone, apply.static_pattern()))
            .await?;
        self.send(DeviceCommand::Rainbow(zone, false)).await?;
        self.send(DeviceCommand::Color(zone, apply.primary)).await?;
        for command in apply.aux_commands() {
            self.send(command).await?;
        }
        self.send(DeviceCommand::Brightness(zone, apply.brightness.level()))
            .await?;
        for command in apply.final_commands() {
            self.send(command).await?;
        }
        Ok(())
    }

    /// Apply the same configuration to every zone
    pub async fn apply_all(
        &mut self,
        pattern: Pattern,
        color: Color,
        brightness: Brightness,
    ) -> Result<()> {
        tracing::debug!("Applying {} {} {} to all zones", pattern, color, brightness);

        let applies: Vec<ZoneApply> = Zone::ALL
            .into_iter()
            .map(|z| ZoneApply::solid(z, color, brightness).with_pattern(pattern))
            .collect();

        let patterns: Vec<DeviceCommand> = applies
            .iter()
            .map(|a| DeviceCommand::Pattern(a.zone, a.static_pattern()))
            .collect();
        let colors: Vec<DeviceCommand> = applies
            .iter()
            .map(|a| DeviceCommand::Color(a.zone, a.primary))
            .collect();
        let aux: Vec<DeviceCommand> = applies.iter().flat_map(|a| a.aux_commands()).collect();
        let levels: Vec<DeviceCommand> = applies
            .iter()
            .map(|a| DeviceCommand::Brightness(a.zone, a.brightness.level()))
            .collect();
        let finals: Vec<DeviceCommand> = applies.iter().flat_map(|a| a.final_commands()).collect();

        self.reset().await?;
        self.set_power(true).await?;
        self.batch(patterns).await?;
        self.batch(per_zone(|z| DeviceCommand::Rainbow(z, false))).await?;
        self.batch(colors).await?;
        self.batch(aux).await?;
        self.batch(levels).await?;
        self.batch(finals).await
    }

    /// Extended shutdown sequence
    ///
    /// The firmware re-enters rainbow mode on the next power-on unless
    /// rainbow was disabled on every zone before powering off. Rainbow only
    /// clears on a zone showing a static pattern, so one is selected first.
    pub async fn blackout(&mut self) -> Result<()> {
        tracing::debug!("Running blackout sequence");

        self.reset().await?;
        self.set_power(false).await?;
        self.batch(per_zone(|z| DeviceCommand::Pattern(z, Pattern::Solid)))
            .await?;
        self.batch(per_zone(|z| DeviceCommand::Rainbow(z, false)))
            .await?;
        self.batch(per_zone(|z| DeviceCommand::Pattern(z, Pattern::Off)))
            .await?;
        self.batch(per_zone(|z| DeviceCommand::Color(z, Color::BLACK)))
            .await?;
        self.set_power(false).await
    }

    /// Power on with a default visible color on every zone
    ///
    /// Runs anti-rainbow passes both before and after the color; a single
    /// pass is not always enough when the hardware is flaky.
    pub async fn power_on_default(&mut self, color: Color, brightness: Brightness) -> Result<()> {
        tracing::debug!("Running power-on sequence with {} {}", color, brightness);

        self.reset().await?;
        self.set_power(true).await?;
        for _ in 0..POWER_ON_RAINBOW_PASSES {
            self.anti_rainbow_pass().await?;
        }
        self.batch(per_zone(|z| DeviceCommand::Color(z, color)))
            .await?;
        self.batch(per_zone(|z| DeviceCommand::Brightness(z, brightness.level())))
            .await?;
        for _ in 0..POWER_ON_RAINBOW_PASSES {
            self.anti_rainbow_pass().await?;
        }
        Ok(())
    }

    /// Close the underlying transport
    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }

    /// Static pattern then rainbow-disable on every zone, batched by type
    async fn anti_rainbow_pass(&mut self) -> Result<()> {
        self.batch(per_zone(|z| DeviceCommand::Pattern(z, Pattern::Solid)))
            .await?;
        self.batch(per_zone(|z| DeviceCommand::Rainbow(z, false)))
            .await
    }

    async fn batch(&mut self, commands: Vec<DeviceCommand>) -> Result<()> {
        for command in commands {
            self.send(command).await?;
        }
        Ok(())
    }

    /// Write one command, then wait out the settle delay
    async fn send(&mut self, command: DeviceCommand) -> Result<()> {
        tracing::trace!("-> {}", command);

        let write_timeout = self.timing.write_timeout();
        match tokio::time::timeout(write_timeout, self.transport.send(&command)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(LedError::Timeout(format!(
                    "Writing '{}' took longer than {:?}",
                    command, write_timeout
                )))
            }
        }
        self.commands_sent += 1;

        let settle = self.timing.settle_delay();
        if settle > Duration::ZERO {
            tokio::time::sleep(settle).await;
        }
        Ok(())
    }
}

/// One command per zone, in zone order
fn per_zone(command: impl Fn(Zone) -> DeviceCommand) -> Vec<DeviceCommand> {
    Zone::ALL.into_iter().map(command).collect()
}
