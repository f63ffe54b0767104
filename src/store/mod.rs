//! State Store
//!
//! Persists the application's belief about the hardware configuration so
//! it can be restored after a reconnect or a service restart.
//!
//! - Mutators are differential: a call that changes nothing returns
//!   `Ok(false)` without touching the file or notifying subscribers.
//! - Every write is a full atomic replace (temp file in the same
//!   directory, fsync, rename).
//! - A failed write keeps the in-memory mutation, since the hardware has
//!   already been changed, and returns [`LedError::Persistence`].
//!   Subscribers only hear about changes that reached the disk.
//! - Loading never fails: a missing file is created with defaults, an
//!   unreadable one is logged and replaced by defaults in memory.

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{LedError, Result};
use crate::types::{Brightness, Color, GlobalState, Pattern, Zone, ZoneState};

/// Change notification sent to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    /// One zone record changed
    ZoneChanged(ZoneState),
    /// The global state changed (sent after every mutation)
    GlobalChanged(GlobalState),
}

/// File-backed LED state
pub struct StateStore {
    path: PathBuf,
    state: GlobalState,
    subscribers: Vec<Sender<StateEvent>>,
}

impl StateStore {
    /// Open the store at `path` and load it
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let mut store = Self {
            path: path.into(),
            state: GlobalState::default(),
            subscribers: Vec::new(),
        };
        store.load();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file, replacing the in-memory state
    pub fn load(&mut self) -> GlobalState {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<GlobalState>(&content) {
                Ok(mut state) => {
                    state.normalize();
                    tracing::debug!("Loaded LED state from {:?}", self.path);
                    self.state = state;
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {:?}, using defaults: {}", self.path, e);
                    self.state = GlobalState::default();
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No LED state at {:?}, creating defaults", self.path);
                self.state = GlobalState::default();
                if let Err(e) = self.save() {
                    tracing::warn!("Failed to write default LED state: {}", e);
                }
            }
            Err(e) => {
                tracing::warn!("Failed to read {:?}, using defaults: {}", self.path, e);
                self.state = GlobalState::default();
            }
        }
        self.state.clone()
    }

    /// Write the full state to disk
    pub fn save(&mut self) -> Result<()> {
        self.state.last_updated = Utc::now();
        write_atomic(&self.path, &self.state)
            .map_err(|e| LedError::Persistence(format!("{:?}: {}", self.path, e)))
    }

    /// Current state
    pub fn snapshot(&self) -> GlobalState {
        self.state.clone()
    }

    /// Current record of one zone
    pub fn zone(&self, zone: Zone) -> ZoneState {
        self.state.zone(zone)
    }

    /// Receive a [`StateEvent`] for every effective mutation
    pub fn subscribe(&mut self) -> Receiver<StateEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Update one zone
    pub fn set_zone(
        &mut self,
        zone: Zone,
        color: Color,
        brightness: Brightness,
        pattern: Pattern,
        enabled: bool,
    ) -> Result<bool> {
        if !self.update_zone(zone, color, brightness, pattern, enabled) {
            return Ok(false);
        }
        self.commit(&[zone])
    }

    /// Update every zone with the same values
    pub fn set_all_zones(
        &mut self,
        color: Color,
        brightness: Brightness,
        pattern: Pattern,
        enabled: bool,
    ) -> Result<bool> {
        let changed: Vec<Zone> = Zone::ALL
            .into_iter()
            .filter(|&z| self.update_zone(z, color, brightness, pattern, enabled))
            .collect();
        if changed.is_empty() {
            return Ok(false);
        }
        self.commit(&changed)
    }

    /// Master LED switch
    pub fn set_global_enabled(&mut self, enabled: bool) -> Result<bool> {
        if self.state.leds_enabled == enabled {
            return Ok(false);
        }
        self.state.leds_enabled = enabled;
        self.commit(&[])
    }

    /// LEDs disabled and every zone dark
    pub fn set_all_off(&mut self) -> Result<bool> {
        let mut changed = Vec::new();
        for zone in Zone::ALL {
            let brightness = self.state.zone(zone).brightness;
            if self.update_zone(zone, Color::BLACK, brightness, Pattern::Off, false) {
                changed.push(zone);
            }
        }
        let global_changed = self.state.leds_enabled;
        self.state.leds_enabled = false;

        if changed.is_empty() && !global_changed {
            return Ok(false);
        }
        self.commit(&changed)
    }

    /// Apply a zone change in memory; returns whether anything differed
    fn update_zone(
        &mut self,
        zone: Zone,
        color: Color,
        brightness: Brightness,
        pattern: Pattern,
        enabled: bool,
    ) -> bool {
        let brightness = brightness.quantized();
        let entry = self
            .state
            .zones
            .entry(zone)
            .or_insert_with(|| ZoneState::off(zone));
        if !entry.differs(color, brightness, pattern, enabled) {
            return false;
        }
        entry.color = color;
        entry.brightness = brightness;
        entry.pattern = pattern;
        entry.enabled = enabled;
        entry.last_changed = Utc::now();
        true
    }

    /// Persist, then notify; a change that was not saved is not announced
    fn commit(&mut self, zones: &[Zone]) -> Result<bool> {
        self.state.recompute_effects();
        self.save()?;

        for &zone in zones {
            self.notify(StateEvent::ZoneChanged(self.state.zone(zone)));
        }
        self.notify(StateEvent::GlobalChanged(self.state.clone()));
        Ok(true)
    }

    fn notify(&mut self, event: StateEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Serialize `state` and atomically replace `path` with it
fn write_atomic(path: &Path, state: &GlobalState) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let content = serde_json::to_vec_pretty(state)?;
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(&content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path().join("led_state.json"));
        (dir, store)
    }

    #[test]
    fn test_fresh_store_writes_defaults() {
        let (dir, store) = temp_store();
        let path = dir.path().join("led_state.json");

        assert!(path.exists());
        let state = store.snapshot();
        assert!(!state.leds_enabled);
        assert!(!state.effects_enabled);
        for zone in Zone::ALL {
            let z = state.zone(zone);
            assert_eq!(z.pattern, Pattern::Off);
            assert_eq!(z.color, Color::BLACK);
            assert_eq!(z.brightness, Brightness::FULL);
            assert!(!z.enabled);
        }
    }

    #[test]
    fn test_round_trip() {
        let (dir, mut store) = temp_store();
        store
            .set_zone(Zone::Eyes, Color::PURPLE, Brightness::from_percent(60), Pattern::Breathing, true)
            .unwrap();
        store.set_global_enabled(true).unwrap();
        let before = store.snapshot();

        let reopened = StateStore::open(dir.path().join("led_state.json"));
        assert!(reopened.snapshot().same_configuration(&before));
        assert_eq!(reopened.zone(Zone::Eyes).pattern, Pattern::Breathing);
    }

    #[test]
    fn test_differential_noop() {
        let (_dir, mut store) = temp_store();
        let rx = store.subscribe();

        assert!(store
            .set_zone(Zone::Front, Color::RED, Brightness::from_percent(100), Pattern::Solid, true)
            .unwrap());
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        let written = std::fs::metadata(store.path()).unwrap().modified().unwrap();

        assert!(!store
            .set_zone(Zone::Front, Color::RED, Brightness::from_percent(100), Pattern::Solid, true)
            .unwrap());
        assert!(rx.try_iter().next().is_none());
        assert_eq!(
            std::fs::metadata(store.path()).unwrap().modified().unwrap(),
            written
        );
    }

    #[test]
    fn test_brightness_is_stored_quantized() {
        let (_dir, mut store) = temp_store();
        store
            .set_zone(Zone::Skull, Color::WHITE, Brightness::from_percent(55), Pattern::Solid, true)
            .unwrap();
        assert_eq!(store.zone(Zone::Skull).brightness.percent(), 60);

        // 61% quantizes to the same level: nothing to do
        assert!(!store
            .set_zone(Zone::Skull, Color::WHITE, Brightness::from_percent(61), Pattern::Solid, true)
            .unwrap());
    }

    #[test]
    fn test_set_all_off_is_idempotent() {
        let (_dir, mut store) = temp_store();
        store
            .set_all_zones(Color::BLUE, Brightness::FULL, Pattern::Rainbow, true)
            .unwrap();
        store.set_global_enabled(true).unwrap();
        assert!(store.snapshot().effects_enabled);

        assert!(store.set_all_off().unwrap());
        let once = store.snapshot();
        assert!(!once.leds_enabled);
        assert!(!once.effects_enabled);
        assert!(once.all_zones_off());

        assert!(!store.set_all_off().unwrap());
        assert!(store.snapshot().same_configuration(&once));
    }

    #[test]
    fn test_corrupt_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("led_state.json");
        std::fs::write(&path, "{ definitely not json").unwrap();

        let store = StateStore::open(&path);
        assert!(store.snapshot().same_configuration(&GlobalState::default()));
    }

    #[test]
    fn test_persistence_failure_keeps_memory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let mut store = StateStore::open(blocker.join("led_state.json"));

        let events = store.subscribe();

        let result = store.set_zone(Zone::Underglow, Color::GREEN, Brightness::FULL, Pattern::Solid, true);
        assert!(matches!(result, Err(LedError::Persistence(_))));
        assert_eq!(store.zone(Zone::Underglow).color, Color::GREEN);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let (_dir, mut store) = temp_store();
        let rx = store.subscribe();
        drop(rx);
        store.set_global_enabled(true).unwrap();
        assert!(store.subscribers.is_empty());
    }
}
