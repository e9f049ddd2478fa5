//! [`Snapshot`] – an immutable capture of every controller field.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::catalog::Circuit;
use crate::{Field, FieldReader, FieldValue};

/// A complete, self-consistent view of the controller at one instant.
///
/// Built in a single pass over a [`FieldReader`] by [`Snapshot::capture`];
/// never patched field by field afterwards.  The JSON form uses the literal
/// keys consumed by the dashboards (`airTemp`, `poolTemp`, …, `circuits`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub air_temp: Option<i32>,
    pub pool_temp: Option<i32>,
    pub spa_temp: Option<i32>,
    pub salt_level: Option<f64>,
    pub pool_chlorinator: Option<u8>,
    pub spa_chlorinator: Option<u8>,
    pub pump_speed: Option<u8>,
    pub pump_power: Option<u32>,
    pub is_metric: bool,
    pub is_heater_enabled: bool,
    pub check_system_msg: bool,
    /// Circuit name → on/off, in catalog order.
    pub circuits: BTreeMap<Circuit, bool>,
}

impl Snapshot {
    /// Read every catalog field from `reader` and assemble a snapshot.
    ///
    /// Fields the decoder cannot resolve, or resolves to a value of the wrong
    /// kind, fall back to their default (`None` for numeric telemetry,
    /// `false` for flags and circuits) instead of failing the whole capture.
    pub fn capture(reader: &dyn FieldReader) -> Self {
        let circuits = Circuit::ALL
            .into_iter()
            .map(|circuit| {
                let on = read_as(reader, Field::Circuit(circuit), |value| match value {
                    FieldValue::Switch(on) => Some(on),
                    _ => None,
                });
                (circuit, on.unwrap_or(false))
            })
            .collect();

        Self {
            air_temp: read_as(reader, Field::AirTemp, temperature),
            pool_temp: read_as(reader, Field::PoolTemp, temperature),
            spa_temp: read_as(reader, Field::SpaTemp, temperature),
            salt_level: read_as(reader, Field::SaltLevel, |value| match value {
                FieldValue::Level(level) => Some(level),
                _ => None,
            }),
            pool_chlorinator: read_as(reader, Field::PoolChlorinator, percent),
            spa_chlorinator: read_as(reader, Field::SpaChlorinator, percent),
            pump_speed: read_as(reader, Field::PumpSpeed, percent),
            pump_power: read_as(reader, Field::PumpPower, |value| match value {
                FieldValue::Watts(watts) => Some(watts),
                _ => None,
            }),
            is_metric: read_as(reader, Field::IsMetric, flag).unwrap_or(false),
            is_heater_enabled: read_as(reader, Field::IsHeaterEnabled, flag).unwrap_or(false),
            check_system_msg: read_as(reader, Field::CheckSystemMsg, flag).unwrap_or(false),
            circuits,
        }
    }

    /// State of one circuit, `None` when the snapshot holds no circuits yet.
    pub fn circuit(&self, circuit: Circuit) -> Option<bool> {
        self.circuits.get(&circuit).copied()
    }
}

fn read_as<T>(
    reader: &dyn FieldReader,
    field: Field,
    pick: impl FnOnce(FieldValue) -> Option<T>,
) -> Option<T> {
    reader.read(field).ok().and_then(pick)
}

fn temperature(value: FieldValue) -> Option<i32> {
    match value {
        FieldValue::Temperature(degrees) => Some(degrees),
        _ => None,
    }
}

fn percent(value: FieldValue) -> Option<u8> {
    match value {
        FieldValue::Percent(pct) => Some(pct),
        _ => None,
    }
}

fn flag(value: FieldValue) -> Option<bool> {
    match value {
        FieldValue::Flag(on) => Some(on),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LinkError;
    use std::collections::HashMap;

    struct MapReader(HashMap<Field, FieldValue>);

    impl FieldReader for MapReader {
        fn read(&self, field: Field) -> Result<FieldValue, LinkError> {
            self.0
                .get(&field)
                .copied()
                .ok_or_else(|| LinkError::UnsupportedField(field.to_string()))
        }
    }

    fn full_reader() -> MapReader {
        let mut values = HashMap::new();
        values.insert(Field::AirTemp, FieldValue::Temperature(71));
        values.insert(Field::PoolTemp, FieldValue::Temperature(82));
        values.insert(Field::SpaTemp, FieldValue::Temperature(101));
        values.insert(Field::SaltLevel, FieldValue::Level(3.1));
        values.insert(Field::PoolChlorinator, FieldValue::Percent(45));
        values.insert(Field::SpaChlorinator, FieldValue::Percent(5));
        values.insert(Field::PumpSpeed, FieldValue::Percent(80));
        values.insert(Field::PumpPower, FieldValue::Watts(1250));
        values.insert(Field::IsMetric, FieldValue::Flag(false));
        values.insert(Field::IsHeaterEnabled, FieldValue::Flag(true));
        values.insert(Field::CheckSystemMsg, FieldValue::Flag(true));
        for circuit in Circuit::ALL {
            values.insert(
                Field::Circuit(circuit),
                FieldValue::Switch(circuit == Circuit::Filter),
            );
        }
        MapReader(values)
    }

    #[test]
    fn capture_reads_every_field() {
        let snap = Snapshot::capture(&full_reader());
        assert_eq!(snap.air_temp, Some(71));
        assert_eq!(snap.pool_temp, Some(82));
        assert_eq!(snap.spa_temp, Some(101));
        assert_eq!(snap.salt_level, Some(3.1));
        assert_eq!(snap.pool_chlorinator, Some(45));
        assert_eq!(snap.spa_chlorinator, Some(5));
        assert_eq!(snap.pump_speed, Some(80));
        assert_eq!(snap.pump_power, Some(1250));
        assert!(!snap.is_metric);
        assert!(snap.is_heater_enabled);
        assert!(snap.check_system_msg);
        assert_eq!(snap.circuits.len(), Circuit::ALL.len());
        assert_eq!(snap.circuit(Circuit::Filter), Some(true));
        assert_eq!(snap.circuit(Circuit::Spa), Some(false));
    }

    #[test]
    fn unresolved_fields_fall_back_to_defaults() {
        let mut reader = full_reader();
        reader.0.remove(&Field::Circuit(Circuit::Filter));
        reader.0.remove(&Field::AirTemp);
        reader.0.remove(&Field::IsHeaterEnabled);

        let snap = Snapshot::capture(&reader);
        assert_eq!(snap.circuit(Circuit::Filter), Some(false));
        assert_eq!(snap.air_temp, None);
        assert!(!snap.is_heater_enabled);
        // The rest of the capture is unaffected.
        assert_eq!(snap.pool_temp, Some(82));
    }

    #[test]
    fn mistyped_values_fall_back_to_defaults() {
        let mut reader = full_reader();
        reader
            .0
            .insert(Field::Circuit(Circuit::Lights), FieldValue::Percent(100));
        reader.0.insert(Field::PoolTemp, FieldValue::Flag(true));

        let snap = Snapshot::capture(&reader);
        assert_eq!(snap.circuit(Circuit::Lights), Some(false));
        assert_eq!(snap.pool_temp, None);
    }

    #[test]
    fn json_uses_dashboard_keys() {
        let snap = Snapshot::capture(&full_reader());
        let json = serde_json::to_value(&snap).unwrap();
        for key in [
            "airTemp",
            "poolTemp",
            "spaTemp",
            "saltLevel",
            "poolChlorinator",
            "spaChlorinator",
            "pumpSpeed",
            "pumpPower",
            "isMetric",
            "isHeaterEnabled",
            "checkSystemMsg",
            "circuits",
        ] {
            assert!(json.get(key).is_some(), "missing key {key}");
        }
        assert_eq!(json["circuits"]["FILTER"], true);
        assert_eq!(json["circuits"]["HEATER_1"], false);
        assert_eq!(json["pumpPower"], 1250);
    }

    #[test]
    fn empty_snapshot_serialises_nulls_and_no_circuits() {
        let json = serde_json::to_value(Snapshot::default()).unwrap();
        assert!(json["airTemp"].is_null());
        assert_eq!(json["isMetric"], false);
        assert_eq!(json["circuits"], serde_json::json!({}));
    }
}
