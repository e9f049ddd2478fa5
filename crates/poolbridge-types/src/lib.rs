//! `poolbridge-types` – shared vocabulary of the pool bridge.
//!
//! - [`catalog`] – the Field Catalog ([`Circuit`]).
//! - [`snapshot`] – [`Snapshot`], the aggregate published to HTTP clients.
//! - [`Field`] / [`FieldValue`] / [`FieldReader`] – how the decoder exposes
//!   individual controller values.
//! - [`LinkError`] – failures reported by the hardware link.

pub mod catalog;
pub mod snapshot;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use catalog::Circuit;
pub use snapshot::Snapshot;

/// Identifier of one value exposed by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// A switchable circuit from the catalog.
    Circuit(Circuit),
    AirTemp,
    PoolTemp,
    SpaTemp,
    SaltLevel,
    PoolChlorinator,
    SpaChlorinator,
    PumpSpeed,
    PumpPower,
    IsMetric,
    IsHeaterEnabled,
    CheckSystemMsg,
}

impl Field {
    /// The scalar (non-circuit) telemetry fields.
    pub const TELEMETRY: [Field; 11] = [
        Field::AirTemp,
        Field::PoolTemp,
        Field::SpaTemp,
        Field::SaltLevel,
        Field::PoolChlorinator,
        Field::SpaChlorinator,
        Field::PumpSpeed,
        Field::PumpPower,
        Field::IsMetric,
        Field::IsHeaterEnabled,
        Field::CheckSystemMsg,
    ];
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Circuit(circuit) => return write!(f, "circuit {circuit}"),
            Field::AirTemp => "airTemp",
            Field::PoolTemp => "poolTemp",
            Field::SpaTemp => "spaTemp",
            Field::SaltLevel => "saltLevel",
            Field::PoolChlorinator => "poolChlorinator",
            Field::SpaChlorinator => "spaChlorinator",
            Field::PumpSpeed => "pumpSpeed",
            Field::PumpPower => "pumpPower",
            Field::IsMetric => "isMetric",
            Field::IsHeaterEnabled => "isHeaterEnabled",
            Field::CheckSystemMsg => "checkSystemMsg",
        };
        f.write_str(name)
    }
}

/// A decoded controller value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Circuit on/off.
    Switch(bool),
    /// Degrees in the controller's configured unit.
    Temperature(i32),
    /// Salt level as reported by the cell.
    Level(f64),
    /// Chlorinator output or pump speed, 0–100.
    Percent(u8),
    /// Pump power draw.
    Watts(u32),
    /// Status flag (metric units, heater enabled, system message pending).
    Flag(bool),
}

/// Read access to the decoder's current field values.
///
/// Implementations hand out a view that stays consistent for as long as it
/// is held, so a [`Snapshot::capture`] over one view never mixes two decoder
/// frames.
pub trait FieldReader {
    /// Resolve `field` to its current value.
    ///
    /// # Errors
    ///
    /// [`LinkError::UnsupportedField`] when the decoder does not know the
    /// field, or any other [`LinkError`] the decoder reports.
    fn read(&self, field: Field) -> Result<FieldValue, LinkError>;
}

/// Failures reported by the hardware link and its decoder.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkError {
    #[error("link I/O error: {0}")]
    Io(String),

    #[error("controller silent for {0} ms")]
    Timeout(u64),

    #[error("controller stream ended")]
    StreamEnded,

    #[error("decoder does not support {0}")]
    UnsupportedField(String),

    #[error("controller rejected command: {0}")]
    Rejected(String),
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_fields_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for field in Field::TELEMETRY {
            assert!(seen.insert(field), "{field} listed twice");
        }
    }

    #[test]
    fn field_display_matches_json_keys() {
        assert_eq!(Field::AirTemp.to_string(), "airTemp");
        assert_eq!(Field::CheckSystemMsg.to_string(), "checkSystemMsg");
        assert_eq!(Field::Circuit(Circuit::Aux2).to_string(), "circuit AUX_2");
    }

    #[test]
    fn link_error_display() {
        let err = LinkError::Io("serial port disconnected".to_string());
        assert!(err.to_string().contains("serial port disconnected"));
        assert!(LinkError::Timeout(2500).to_string().contains("2500"));
    }

    #[test]
    fn io_error_converts_to_link_error() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: LinkError = io.into();
        assert!(matches!(err, LinkError::Io(msg) if msg.contains("pipe closed")));
    }

    #[test]
    fn link_error_serialises() {
        let json = serde_json::to_string(&LinkError::StreamEnded).unwrap();
        let back: LinkError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, LinkError::StreamEnded);
    }
}
