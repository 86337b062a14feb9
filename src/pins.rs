//! Pin catalog and mapping (C5).
//!
//! `available_pins` is server-authoritative; `mapped_pins` is
//! user-authoritative and persisted in the project file (see
//! [`crate::persistence`]).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::RemoteError;

/// Wire representation is a single octet (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PinType {
    None = 0,
    Input = 1,
    Output = 2,
    GeneralPurpose = 3,
}

impl PinType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::None),
            1 => Some(Self::Input),
            2 => Some(Self::Output),
            3 => Some(Self::GeneralPurpose),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for PinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Input => write!(f, "Input"),
            Self::Output => write!(f, "Output"),
            Self::GeneralPurpose => write!(f, "GeneralPurpose"),
        }
    }
}

/// A server-advertised pin. Id is globally unique *per session*; name is
/// stable across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    pub id: u32,
    pub name: String,
    pub pin_type: PinType,
}

impl Pin {
    pub fn new(id: u32, name: impl Into<String>, pin_type: PinType) -> Self {
        Self {
            id,
            name: name.into(),
            pin_type,
        }
    }
}

/// A user-chosen pin, bound to a concrete direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedPin {
    pub name: String,
    pub direction: PinType,
}

/// Ordered sequence of server-advertised pins, insertion order preserved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AvailablePinSet(pub Vec<Pin>);

impl AvailablePinSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Pin> {
        self.0.iter().find(|p| p.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if `other` advertises exactly the same `(id, name, type)`
    /// triples as `self` — order-independent (§4.5 reconnection rule).
    pub fn same_advertisement(&self, other: &[Pin]) -> bool {
        if self.0.len() != other.len() {
            return false;
        }
        other.iter().all(|p| {
            self.0
                .iter()
                .any(|existing| existing.id == p.id && existing.name == p.name && existing.pin_type == p.pin_type)
        })
    }
}

/// Owns the mapped-pin set plus the derived `inputs`/`outputs` value
/// tables. Key sets and the mapping set move together (§3 invariant).
#[derive(Debug, Clone, Default)]
pub struct PinCatalog {
    pub available: AvailablePinSet,
    pub mapped: Vec<MappedPin>,
    pub inputs: HashMap<u32, bool>,
    pub outputs: HashMap<u32, bool>,
}

impl PinCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a fresh `available_pins` advertisement from the server.
    ///
    /// If `self.available` was already non-empty and the new list
    /// advertises any pin absent from the old set, the mapped-pin set is
    /// reset entirely (pin ids may have been renumbered) and `true` is
    /// returned so the caller can raise a warning exactly once.
    pub fn apply_advertisement(&mut self, advertised: Vec<Pin>) -> bool {
        let was_populated = !self.available.is_empty();
        let reset = was_populated && !self.available.same_advertisement(&advertised);

        self.available = AvailablePinSet(advertised);

        if reset {
            self.mapped.clear();
            self.inputs.clear();
            self.outputs.clear();
        }

        reset
    }

    fn id_for(&self, name: &str) -> Option<u32> {
        self.available.find_by_name(name).map(|p| p.id)
    }

    /// Map an available pin by name to a concrete direction.
    ///
    /// Rules (§4.5):
    /// 1. The name must resolve to an available pin.
    /// 2. The available pin's type must be `GeneralPurpose` or equal to
    ///    `requested_dir`.
    /// 3. No existing mapped pin may share the name.
    pub fn map_pin(&mut self, name: &str, requested_dir: PinType) -> Result<(), RemoteError> {
        if requested_dir != PinType::Input && requested_dir != PinType::Output {
            return Err(RemoteError::mapping_rejected(format!(
                "cannot map a pin as {requested_dir}; mapping direction must be input or output"
            )));
        }

        let available = self
            .available
            .find_by_name(name)
            .ok_or_else(|| RemoteError::mapping_rejected(format!("no available pin named '{name}'")))?;

        if available.pin_type != PinType::GeneralPurpose && available.pin_type != requested_dir {
            return Err(RemoteError::mapping_rejected(format!(
                "pin '{name}' is {}, cannot map as {requested_dir}",
                available.pin_type
            )));
        }

        if self.mapped.iter().any(|m| m.name == name) {
            return Err(RemoteError::mapping_rejected(format!(
                "pin '{name}' is already mapped"
            )));
        }

        let id = self.id_for(name).expect("resolved above");
        self.mapped.push(MappedPin {
            name: name.to_string(),
            direction: requested_dir,
        });

        match requested_dir {
            PinType::Input => {
                self.inputs.insert(id, false);
            }
            PinType::Output => {
                self.outputs.insert(id, false);
            }
            _ => unreachable!("requested_dir is always Input or Output"),
        }

        Ok(())
    }

    /// Change-only input write (§4.8). Returns `Some(value)` if the
    /// stored value actually changed and an `UPDATE_INPUT` frame should
    /// be sent; `None` if the write was a no-op.
    pub fn set_input(&mut self, id: u32, value: bool) -> Option<bool> {
        let slot = self.inputs.entry(id).or_insert(!value);
        if *slot != value {
            *slot = value;
            Some(value)
        } else {
            None
        }
    }

    /// Server-authoritative output write: always applied, regardless of
    /// the prior value.
    pub fn set_output(&mut self, id: u32, value: bool) {
        self.outputs.insert(id, value);
    }

    pub fn mapped_count(&self) -> usize {
        self.mapped.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with(pins: Vec<Pin>) -> PinCatalog {
        let mut c = PinCatalog::new();
        c.apply_advertisement(pins);
        c
    }

    // ── PinType ─────────────────────────────────────────────────────

    #[test]
    fn pin_type_byte_roundtrip() {
        for t in [PinType::None, PinType::Input, PinType::Output, PinType::GeneralPurpose] {
            assert_eq!(PinType::from_byte(t.to_byte()), Some(t));
        }
    }

    #[test]
    fn pin_type_from_invalid_byte() {
        assert_eq!(PinType::from_byte(99), None);
    }

    // ── AvailablePinSet ────────────────────────────────────────────

    #[test]
    fn find_by_name_exact_match() {
        let set = AvailablePinSet(vec![Pin::new(1, "D0", PinType::Input)]);
        assert!(set.find_by_name("D0").is_some());
        assert!(set.find_by_name("D1").is_none());
    }

    #[test]
    fn same_advertisement_identical() {
        let a = AvailablePinSet(vec![Pin::new(1, "D0", PinType::Input)]);
        let b = vec![Pin::new(1, "D0", PinType::Input)];
        assert!(a.same_advertisement(&b));
    }

    #[test]
    fn same_advertisement_different_length() {
        let a = AvailablePinSet(vec![Pin::new(1, "D0", PinType::Input)]);
        let b = vec![Pin::new(1, "D0", PinType::Input), Pin::new(2, "D1", PinType::Output)];
        assert!(!a.same_advertisement(&b));
    }

    #[test]
    fn same_advertisement_renumbered_id() {
        let a = AvailablePinSet(vec![Pin::new(1, "D0", PinType::Input)]);
        let b = vec![Pin::new(2, "D0", PinType::Input)];
        assert!(!a.same_advertisement(&b));
    }

    // ── map_pin rules (S4) ──────────────────────────────────────────

    #[test]
    fn map_general_purpose_as_input_accepted() {
        let mut c = catalog_with(vec![
            Pin::new(7, "X", PinType::GeneralPurpose),
            Pin::new(8, "Y", PinType::Input),
        ]);
        assert!(c.map_pin("X", PinType::Input).is_ok());
        assert_eq!(c.mapped_count(), 1);
        assert_eq!(c.inputs.get(&7), Some(&false));
    }

    #[test]
    fn map_typed_pin_wrong_direction_rejected() {
        let mut c = catalog_with(vec![Pin::new(8, "Y", PinType::Input)]);
        assert!(c.map_pin("Y", PinType::Output).is_err());
    }

    #[test]
    fn map_duplicate_name_rejected() {
        let mut c = catalog_with(vec![Pin::new(7, "X", PinType::GeneralPurpose)]);
        c.map_pin("X", PinType::Input).unwrap();
        let err = c.map_pin("X", PinType::Output).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::MappingRejected);
    }

    #[test]
    fn map_unknown_name_rejected() {
        let mut c = catalog_with(vec![]);
        assert!(c.map_pin("Z", PinType::Input).is_err());
    }

    #[test]
    fn map_requesting_general_purpose_direction_rejected_not_panicking() {
        let mut c = catalog_with(vec![Pin::new(7, "X", PinType::GeneralPurpose)]);
        let err = c.map_pin("X", PinType::GeneralPurpose).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::MappingRejected);
    }

    #[test]
    fn map_requesting_none_direction_rejected() {
        let mut c = catalog_with(vec![Pin::new(7, "X", PinType::GeneralPurpose)]);
        assert!(c.map_pin("X", PinType::None).is_err());
    }

    // ── reconnection consistency (prop 4, 5) ─────────────────────────

    #[test]
    fn reconnect_same_advertisement_preserves_mapping() {
        let mut c = catalog_with(vec![Pin::new(1, "D0", PinType::Input)]);
        c.map_pin("D0", PinType::Input).unwrap();
        let reset = c.apply_advertisement(vec![Pin::new(1, "D0", PinType::Input)]);
        assert!(!reset);
        assert_eq!(c.mapped_count(), 1);
    }

    #[test]
    fn reconnect_different_advertisement_resets_mapping() {
        let mut c = catalog_with(vec![Pin::new(1, "D0", PinType::Input)]);
        c.map_pin("D0", PinType::Input).unwrap();
        let reset = c.apply_advertisement(vec![Pin::new(2, "D0", PinType::Input)]);
        assert!(reset);
        assert_eq!(c.mapped_count(), 0);
        assert!(c.inputs.is_empty());
    }

    #[test]
    fn first_advertisement_never_triggers_reset() {
        let mut c = PinCatalog::new();
        let reset = c.apply_advertisement(vec![Pin::new(1, "D0", PinType::Input)]);
        assert!(!reset);
    }

    // ── change-only input propagation (S5, prop 3) ───────────────────

    #[test]
    fn set_input_initial_false_to_false_is_noop() {
        let mut c = catalog_with(vec![Pin::new(1, "D0", PinType::Input)]);
        c.map_pin("D0", PinType::Input).unwrap();
        assert_eq!(c.set_input(1, false), None);
    }

    #[test]
    fn set_input_changes_emit_update() {
        let mut c = catalog_with(vec![Pin::new(1, "D0", PinType::Input)]);
        c.map_pin("D0", PinType::Input).unwrap();
        assert_eq!(c.set_input(1, true), Some(true));
        assert_eq!(c.set_input(1, true), None);
        assert_eq!(c.set_input(1, false), Some(false));
    }

    #[test]
    fn set_output_always_applies() {
        let mut c = PinCatalog::new();
        c.set_output(5, true);
        assert_eq!(c.outputs.get(&5), Some(&true));
        c.set_output(5, true);
        assert_eq!(c.outputs.get(&5), Some(&true));
    }
}
