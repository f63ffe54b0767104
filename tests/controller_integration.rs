//! Integration tests for the controller against the mock device
//!
//! These tests validate the end-to-end behaviour of LED operations:
//! - Brightness quantization as seen through status
//! - Idempotent turn-off
//! - Rainbow mode cleared by the command ordering, including on turn-off
//! - Store untouched when the device fails

#![cfg(feature = "mock-device")]

mod common;

use common::mock_helpers::{assert_rainbow_cleared, command_kinds};
use common::TestRig;
use minipc_led::controller::{ControllerEvent, NOT_CONNECTED_MESSAGE};
use minipc_led::device::mock::MockDevice;
use minipc_led::device::ZoneApply;
use minipc_led::types::{Brightness, Color, Pattern, Zone};

#[tokio::test]
async fn test_brightness_quantization_through_status() {
    let rig = TestRig::new();
    let mut controller = rig.connected_controller().await;

    for (requested, reported) in [(0u8, 0u8), (9, 0), (10, 20), (55, 60), (89, 80), (100, 100)] {
        let result = controller
            .set_zone_color(Zone::Front, Color::RED, Brightness::from_percent(requested))
            .await;
        assert!(result.success, "{:?}", result);

        let status = controller.status();
        assert_eq!(
            status.state.zone(Zone::Front).brightness.percent(),
            reported,
            "{}% should read back as {}%",
            requested,
            reported
        );
    }
}

#[tokio::test]
async fn test_turn_off_is_idempotent() {
    let rig = TestRig::new();
    let mut controller = rig.connected_controller().await;
    controller.set_all_zones(Color::ORANGE, Brightness::FULL).await;

    assert!(controller.turn_off().await.success);
    let once = controller.state();
    let commands_once = rig.device.commands().len();

    assert!(controller.turn_off().await.success);
    let twice = controller.state();

    assert!(once.same_configuration(&twice));
    assert!(!twice.leds_enabled);
    assert!(twice.all_zones_off());
    assert!(!rig.device.powered());
    // The blackout sequence is replayed in full
    assert_eq!(rig.device.commands().len() - commands_once, 19);
}

#[tokio::test]
async fn test_turn_off_clears_rainbow_zone() {
    let rig = TestRig::new();
    let mut controller = rig.connected_controller().await;
    let result = controller
        .set_zone(
            ZoneApply::solid(Zone::Eyes, Color::WHITE, Brightness::FULL)
                .with_pattern(Pattern::Rainbow),
        )
        .await;
    assert!(result.success, "{:?}", result);
    assert!(rig.device.rainbow_active(Zone::Eyes));

    assert!(controller.turn_off().await.success);

    assert_rainbow_cleared(&rig.device);
    assert!(!rig.device.powered());
    assert!(!controller.state().effects_enabled);
}

#[tokio::test]
async fn test_rainbow_then_solid_leaves_no_rainbow() {
    let rig = TestRig::new();
    let mut controller = rig.connected_controller().await;

    let steps = [
        ZoneApply::solid(Zone::Skull, Color::RED, Brightness::from_percent(100)),
        ZoneApply::solid(Zone::Skull, Color::RED, Brightness::from_percent(100))
            .with_pattern(Pattern::Rainbow),
        ZoneApply::solid(Zone::Skull, Color::BLUE, Brightness::from_percent(50)),
    ];
    for step in steps {
        let result = controller.set_zone(step).await;
        assert!(result.success, "{:?}", result);
    }

    let state = controller.state();
    let skull = state.zone(Zone::Skull);
    assert_eq!(skull.pattern, Pattern::Solid);
    assert_eq!(skull.color, Color::BLUE);
    assert_eq!(skull.brightness.percent(), 60);
    assert!(!state.effects_enabled);
    assert!(!rig.device.rainbow_active(Zone::Skull));
    assert_eq!(rig.device.zone(Zone::Skull).pattern, Pattern::Solid);
}

#[tokio::test]
async fn test_rainbow_cleared_from_stuck_device() {
    let rig = TestRig::with_device(MockDevice::stuck_in_rainbow());
    let mut controller = rig.connected_controller().await;

    assert_rainbow_cleared(&rig.device);

    let result = controller
        .set_zone_color(Zone::Skull, Color::GREEN, Brightness::FULL)
        .await;
    assert!(result.success);
    assert_rainbow_cleared(&rig.device);
    assert_eq!(rig.device.zone(Zone::Skull).color, Color::GREEN);
}

#[tokio::test]
async fn test_static_pattern_precedes_rainbow_disable() {
    let rig = TestRig::with_device(MockDevice::stuck_in_rainbow());
    let mut controller = rig.connected_controller().await;
    rig.device.clear_commands();

    controller
        .set_zone(ZoneApply::solid(Zone::Underglow, Color::BLUE, Brightness::FULL))
        .await;

    let commands = rig.device.commands();
    let pattern_at = commands.iter().position(|c| c == "PAT U 1").unwrap();
    let rainbow_at = commands.iter().position(|c| c == "RBW U 0").unwrap();
    assert!(pattern_at < rainbow_at);
}

#[tokio::test]
async fn test_turn_on_runs_extended_sequence() {
    let rig = TestRig::new();
    let mut controller = rig.connected_controller().await;
    rig.device.clear_commands();

    assert!(controller.turn_on().await.success);

    let commands = rig.device.commands();
    let kinds = command_kinds(&commands);
    assert_eq!(&kinds[..2], &["RST", "PWR"]);
    // Two anti-rainbow passes on each side of the color/brightness batch
    assert_eq!(kinds.iter().filter(|k| **k == "RBW").count(), 16);
    assert_eq!(kinds.iter().filter(|k| **k == "COL").count(), 4);

    let state = controller.state();
    assert!(state.leds_enabled);
    for zone in Zone::ALL {
        let z = state.zone(zone);
        assert!(z.enabled);
        assert_eq!(z.color, Color::WHITE);
        assert_eq!(z.brightness, Brightness::FULL);
    }
}

#[tokio::test]
async fn test_transport_failure_leaves_store_unchanged() {
    let rig = TestRig::new();
    let mut controller = rig.connected_controller().await;
    controller
        .set_zone_color(Zone::Eyes, Color::YELLOW, Brightness::from_percent(60))
        .await;
    let before = controller.state();
    let on_disk_before = std::fs::read_to_string(rig.state_path()).unwrap();

    rig.device.fail_writes_after(3);
    let result = controller
        .set_zone(
            ZoneApply::solid(Zone::Eyes, Color::RED, Brightness::FULL)
                .with_pattern(Pattern::Strobe),
        )
        .await;

    assert!(!result.success);
    assert!(controller.state().same_configuration(&before));
    assert_eq!(std::fs::read_to_string(rig.state_path()).unwrap(), on_disk_before);
}

#[tokio::test]
async fn test_reconnect_after_transport_failure() {
    let rig = TestRig::new();
    let mut controller = rig.connected_controller().await;

    rig.device.fail_all_writes();
    assert!(!controller.turn_on().await.success);
    assert!(!controller.is_connected());

    let result = controller.set_all_zones(Color::RED, Brightness::FULL).await;
    assert_eq!(result.message, NOT_CONNECTED_MESSAGE);

    rig.device.restore_writes();
    assert!(controller.connect(None).await.success);
    assert!(controller.set_all_zones(Color::RED, Brightness::FULL).await.success);
}

#[tokio::test]
async fn test_unchanged_zone_emits_no_state_event() {
    let rig = TestRig::new();
    let mut controller = rig.connected_controller().await;
    let events = controller.subscribe();

    controller
        .set_zone_color(Zone::Front, Color::CYAN, Brightness::FULL)
        .await;
    let first: Vec<_> = events.try_iter().collect();
    assert!(first
        .iter()
        .any(|e| matches!(e, ControllerEvent::StateChanged { .. })));

    // Same values again: the device is driven, the store does not change
    controller
        .set_zone_color(Zone::Front, Color::CYAN, Brightness::FULL)
        .await;
    let second: Vec<_> = events.try_iter().collect();
    assert!(!second
        .iter()
        .any(|e| matches!(e, ControllerEvent::StateChanged { .. })));
}

#[tokio::test]
async fn test_state_restored_by_new_controller() {
    let rig = TestRig::new();
    {
        let mut controller = rig.connected_controller().await;
        controller
            .set_zone(
                ZoneApply::solid(Zone::Skull, Color::PURPLE, Brightness::from_percent(40))
                    .with_pattern(Pattern::Breathing),
            )
            .await;
        controller.disconnect().await;
    }

    let device = MockDevice::new();
    let rig2 = TestRig {
        device: device.clone(),
        config: rig.config.clone(),
        dir: tempfile::tempdir().unwrap(),
    };
    let _controller = rig2.connected_controller().await;

    let skull = device.zone(Zone::Skull);
    assert_eq!(skull.color, Color::PURPLE);
    assert_eq!(skull.pattern, Pattern::Breathing);
    assert_eq!(skull.brightness_level, 2);
    assert_eq!(device.zone(Zone::Eyes).color, Color::BLACK);
}
