//! The Field Catalog: external circuit names understood by the HTTP API and
//! the [`Circuit`] identifiers the decoder knows them by.
//!
//! The catalog is a fixed table.  Lookups are case-insensitive so that
//! `"filter"`, `"Filter"` and `"FILTER"` all resolve to [`Circuit::Filter`];
//! the canonical spelling reported back to clients is always upper-case.

use std::fmt;

use serde::{Serialize, Serializer};

/// A switchable circuit on the pool controller.
///
/// The declaration order is the catalog order; it drives the ordering of the
/// `circuits` object in every snapshot and of the `validCircuits` list
/// returned for unknown names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Circuit {
    Filter,
    Pool,
    Spa,
    Spillover,
    Lights,
    Heater1,
    Aux1,
    Aux2,
    Aux3,
    Aux4,
    Aux5,
    Aux6,
    Valve3,
    Valve4,
    HeaterAutoMode,
    SuperChlorinate,
    FilterLowSpeed,
}

impl Circuit {
    /// Every catalog entry, in catalog order.
    pub const ALL: [Circuit; 17] = [
        Circuit::Filter,
        Circuit::Pool,
        Circuit::Spa,
        Circuit::Spillover,
        Circuit::Lights,
        Circuit::Heater1,
        Circuit::Aux1,
        Circuit::Aux2,
        Circuit::Aux3,
        Circuit::Aux4,
        Circuit::Aux5,
        Circuit::Aux6,
        Circuit::Valve3,
        Circuit::Valve4,
        Circuit::HeaterAutoMode,
        Circuit::SuperChlorinate,
        Circuit::FilterLowSpeed,
    ];

    /// Canonical external name, e.g. `"HEATER_1"`.
    pub const fn name(self) -> &'static str {
        match self {
            Circuit::Filter => "FILTER",
            Circuit::Pool => "POOL",
            Circuit::Spa => "SPA",
            Circuit::Spillover => "SPILLOVER",
            Circuit::Lights => "LIGHTS",
            Circuit::Heater1 => "HEATER_1",
            Circuit::Aux1 => "AUX_1",
            Circuit::Aux2 => "AUX_2",
            Circuit::Aux3 => "AUX_3",
            Circuit::Aux4 => "AUX_4",
            Circuit::Aux5 => "AUX_5",
            Circuit::Aux6 => "AUX_6",
            Circuit::Valve3 => "VALVE_3",
            Circuit::Valve4 => "VALVE_4",
            Circuit::HeaterAutoMode => "HEATER_AUTO_MODE",
            Circuit::SuperChlorinate => "SUPER_CHLORINATE",
            Circuit::FilterLowSpeed => "FILTER_LOW_SPEED",
        }
    }

    /// Resolve an external name, ignoring ASCII case.
    ///
    /// Returns `None` for anything that is not in the catalog; no trimming or
    /// other normalisation is applied.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|circuit| circuit.name().eq_ignore_ascii_case(name))
    }

    /// All canonical names, in catalog order.
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|c| c.name()).collect()
    }
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Serialised as the bare canonical name so a circuit can be used directly as
// a JSON object key.
impl Serialize for Circuit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}
