//! In-memory per-zone state.
//!
//! [`ZoneStateStore`] applies decoded responses and reports exactly which
//! fields changed. Fields update independently: a message carrying only a
//! volume never resets power or clears the selected source, and power is
//! written only by explicit power tokens or an all-zones-off broadcast.

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;

use crate::constants::ZONE_COUNT;
use crate::protocol::{Power, Response, ZoneAttribute};
use crate::utils::now_millis;

/// Snapshot of one zone's known state.
///
/// Every optional field starts unknown and is only ever written by a
/// message that carries its token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneState {
    /// Zone number (1-12).
    pub zone: u8,
    pub power: Power,
    /// Selected source (1-6).
    pub source: Option<u8>,
    /// Volume on the user-facing 1-100 scale.
    pub volume: Option<u8>,
    pub group: Option<u8>,
    pub bass: Option<i8>,
    pub treble: Option<i8>,
    pub volume_restore: Option<bool>,
    pub override_active: Option<bool>,
    /// Unix millis of the last applied mutation.
    pub last_updated: Option<u64>,
}

impl ZoneState {
    fn new(zone: u8) -> Self {
        Self {
            zone,
            power: Power::Unknown,
            source: None,
            volume: None,
            group: None,
            bass: None,
            treble: None,
            volume_restore: None,
            override_active: None,
            last_updated: None,
        }
    }

    /// Applies one attribute; returns whether the stored value changed.
    fn apply_attribute(&mut self, attribute: ZoneAttribute) -> bool {
        let changed = match attribute {
            ZoneAttribute::Power(power) => set(&mut self.power, power),
            ZoneAttribute::Source(v) => set(&mut self.source, Some(v)),
            ZoneAttribute::Volume(v) => set(&mut self.volume, Some(v)),
            ZoneAttribute::Group(v) => set(&mut self.group, Some(v)),
            ZoneAttribute::Bass(v) => set(&mut self.bass, Some(v)),
            ZoneAttribute::Treble(v) => set(&mut self.treble, Some(v)),
            ZoneAttribute::VolumeRestore(v) => set(&mut self.volume_restore, Some(v)),
            ZoneAttribute::OverrideActive(v) => set(&mut self.override_active, Some(v)),
        };
        if changed {
            self.last_updated = Some(now_millis());
        }
        changed
    }
}

fn set<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

/// Notification for a single mutated zone field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneChange {
    pub zone: u8,
    pub attribute: ZoneAttribute,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
}

/// Table of per-zone state for the fixed 12-zone topology.
#[derive(Debug)]
pub struct ZoneStateStore {
    zones: RwLock<Vec<ZoneState>>,
}

impl Default for ZoneStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoneStateStore {
    pub fn new() -> Self {
        Self {
            zones: RwLock::new((1..=ZONE_COUNT).map(ZoneState::new).collect()),
        }
    }

    /// Applies a decoded response, returning one change record per field
    /// that actually mutated. `DeviceFault` and `Unrecognized` responses
    /// touch nothing and return no changes.
    pub fn apply(&self, response: &Response) -> Vec<ZoneChange> {
        let timestamp = now_millis();
        let mut changes = Vec::new();
        match response {
            Response::AllOff => {
                let mut zones = self.zones.write();
                for state in zones.iter_mut() {
                    if state.apply_attribute(ZoneAttribute::Power(Power::Off)) {
                        changes.push(ZoneChange {
                            zone: state.zone,
                            attribute: ZoneAttribute::Power(Power::Off),
                            timestamp,
                        });
                    }
                }
            }
            Response::ZoneStatus { zone, attributes } => {
                let mut zones = self.zones.write();
                // Zone 0 can only come from a hand-built response; ignore it
                // like any other out-of-range zone
                let Some(state) = zone
                    .checked_sub(1)
                    .and_then(|index| zones.get_mut(usize::from(index)))
                else {
                    return changes;
                };
                for &attribute in attributes {
                    if state.apply_attribute(attribute) {
                        changes.push(ZoneChange {
                            zone: *zone,
                            attribute,
                            timestamp,
                        });
                    }
                }
            }
            Response::DeviceFault { .. } | Response::Unrecognized { .. } => {}
        }
        changes
    }

    /// Snapshot of one zone. `None` for out-of-range zone numbers.
    #[must_use]
    pub fn zone(&self, zone: u8) -> Option<ZoneState> {
        if !(1..=ZONE_COUNT).contains(&zone) {
            return None;
        }
        self.zones.read().get(usize::from(zone - 1)).cloned()
    }

    /// Snapshot of all zones in zone order.
    #[must_use]
    pub fn all_zones(&self) -> Vec<ZoneState> {
        self.zones.read().clone()
    }

    /// Sources currently playing: selected by at least one powered-on zone.
    #[must_use]
    pub fn derive_active_sources(&self) -> HashSet<u8> {
        self.zones
            .read()
            .iter()
            .filter(|z| z.power == Power::On)
            .filter_map(|z| z.source)
            .collect()
    }

    /// Serializes the current state to JSON.
    pub fn to_json(&self) -> serde_json::Value {
        json!({ "zones": *self.zones.read() })
    }

    /// Resets every zone to unknown. Used on session reinitialize; a fresh
    /// session re-polls full state from the device.
    pub fn reset(&self) {
        let mut zones = self.zones.write();
        *zones = (1..=ZONE_COUNT).map(ZoneState::new).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode;

    #[test]
    fn volume_only_message_changes_only_volume() {
        let store = ZoneStateStore::new();
        store.apply(&decode("#Z02PWRON,SRC3,VOL-20"));

        let changes = store.apply(&decode("#Z02VOL-10"));
        assert_eq!(changes.len(), 1);
        assert!(matches!(changes[0].attribute, ZoneAttribute::Volume(_)));

        let zone = store.zone(2).unwrap();
        assert_eq!(zone.power, Power::On);
        assert_eq!(zone.source, Some(3));
    }

    #[test]
    fn power_is_never_reset_by_non_power_message() {
        let store = ZoneStateStore::new();
        store.apply(&decode("#Z07PWRON"));
        store.apply(&decode("#Z07BASS+05,TREB-03"));
        assert_eq!(store.zone(7).unwrap().power, Power::On);
    }

    #[test]
    fn repeated_message_emits_no_changes() {
        let store = ZoneStateStore::new();
        let first = store.apply(&decode("#Z03PWRON,SRC2,GRP0,VOL-30"));
        assert_eq!(first.len(), 4);
        let second = store.apply(&decode("#Z03PWRON,SRC2,GRP0,VOL-30"));
        assert!(second.is_empty());
    }

    #[test]
    fn alloff_powers_down_every_zone() {
        let store = ZoneStateStore::new();
        store.apply(&decode("#Z01PWRON,SRC1"));
        store.apply(&decode("#Z02PWRON,SRC2"));

        let changes = store.apply(&Response::AllOff);
        // Only zones whose stored power actually changed report a change;
        // Unknown -> Off counts for the remaining ten.
        assert_eq!(changes.len(), usize::from(ZONE_COUNT));
        for state in store.all_zones() {
            assert_eq!(state.power, Power::Off);
        }
        // Sources survive AllOff; only power is broadcast
        assert_eq!(store.zone(1).unwrap().source, Some(1));
    }

    #[test]
    fn fault_and_unrecognized_touch_nothing() {
        let store = ZoneStateStore::new();
        store.apply(&decode("#Z05PWRON,SRC4"));
        let before = store.zone(5).unwrap();

        assert!(store.apply(&decode("#?SYNTAX ERR")).is_empty());
        assert!(store.apply(&decode("totally bogus")).is_empty());
        assert_eq!(store.zone(5).unwrap(), before);
    }

    #[test]
    fn out_of_range_zone_status_is_ignored() {
        let store = ZoneStateStore::new();
        for zone in [0u8, 13] {
            let changes = store.apply(&Response::ZoneStatus {
                zone,
                attributes: vec![ZoneAttribute::Power(Power::On)],
            });
            assert!(changes.is_empty());
        }
        assert!(store.all_zones().iter().all(|z| z.power == Power::Unknown));
    }

    #[test]
    fn derive_active_sources_requires_power_on() {
        let store = ZoneStateStore::new();
        store.apply(&decode("#Z01PWRON,SRC2"));
        store.apply(&decode("#Z02PWRON,SRC2"));
        store.apply(&decode("#Z03PWROFF,SRC5"));
        store.apply(&decode("#Z04PWRON,SRC6"));

        let active = store.derive_active_sources();
        assert!(active.contains(&2));
        assert!(active.contains(&6));
        assert!(!active.contains(&5));
        assert_eq!(active.len(), 2);
    }

    #[test]
    fn reset_returns_zones_to_unknown() {
        let store = ZoneStateStore::new();
        store.apply(&decode("#Z01PWRON,SRC2"));
        store.reset();
        let zone = store.zone(1).unwrap();
        assert_eq!(zone.power, Power::Unknown);
        assert_eq!(zone.source, None);
    }
}
