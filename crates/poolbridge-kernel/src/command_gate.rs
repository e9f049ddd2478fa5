//! [`CommandGate`] – the only path from an HTTP write to the controller.
//!
//! Every circuit command passes three checks, in order:
//!
//! 1. **Type check** – the requested state must be a JSON boolean.  Strings
//!    such as `"false"` or `"0"`, numbers, and `null` are refused outright:
//!    coercing them is how a circuit ends up switched on by accident.
//! 2. **Catalog check** – the circuit name is resolved case-insensitively
//!    through the Field Catalog; unknown names are refused with the full list
//!    of valid names.
//! 3. **Link check** – the command is sent only if the supervisor currently
//!    publishes a live link.
//!
//! Each failure maps to a distinct [`CommandRejection`] and HTTP status.

use poolbridge_types::{Circuit, LinkError};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

use crate::link_slot::LinkSlot;

/// A validated circuit command, ready for the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitCommand {
    pub circuit: Circuit,
    pub on: bool,
}

/// Result of a command the controller accepted for sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutcome {
    pub circuit: Circuit,
    pub on: bool,
    /// The controller's own acknowledgement.
    pub acknowledged: bool,
}

/// Why a command was refused.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandRejection {
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' must be a string, got {found}")]
    NotString { field: &'static str, found: String },

    #[error("field '{field}' must be a JSON boolean (true or false), got {found}")]
    NotBoolean { field: &'static str, found: String },

    #[error("Unknown circuit: {name}")]
    UnknownCircuit {
        name: String,
        valid: Vec<&'static str>,
    },

    #[error("Not connected to controller")]
    Unavailable,

    #[error("controller write failed: {0}")]
    WriteFailed(#[from] LinkError),
}

impl CommandRejection {
    /// HTTP status reported to the caller.
    pub fn status_code(&self) -> u16 {
        match self {
            CommandRejection::MissingField(_)
            | CommandRejection::NotString { .. }
            | CommandRejection::NotBoolean { .. }
            | CommandRejection::UnknownCircuit { .. } => 400,
            CommandRejection::Unavailable => 503,
            CommandRejection::WriteFailed(_) => 500,
        }
    }
}

/// Validates circuit commands and relays them to the live link.
#[derive(Clone)]
pub struct CommandGate {
    link: LinkSlot,
}

impl CommandGate {
    /// Gate writes through whatever link `link` currently holds.
    pub fn new(link: LinkSlot) -> Self {
        Self { link }
    }

    /// Check a `(name, value)` pair without touching the link.
    ///
    /// # Errors
    ///
    /// [`CommandRejection::NotBoolean`] for any non-boolean `value`,
    /// [`CommandRejection::UnknownCircuit`] for a name outside the catalog.
    pub fn validate(&self, name: &str, value: &Value) -> Result<CircuitCommand, CommandRejection> {
        let Value::Bool(on) = value else {
            return Err(CommandRejection::NotBoolean {
                field: "state",
                found: describe(value),
            });
        };

        let circuit = Circuit::from_name(name).ok_or_else(|| CommandRejection::UnknownCircuit {
            name: name.to_ascii_uppercase(),
            valid: Circuit::names(),
        })?;

        Ok(CircuitCommand { circuit, on: *on })
    }

    /// Validate a `{"circuit": <name>, "state": <bool>}` request body.
    ///
    /// # Errors
    ///
    /// [`CommandRejection::MissingField`] / [`CommandRejection::NotString`]
    /// for a malformed body, otherwise whatever [`validate`](Self::validate)
    /// reports.
    pub fn validate_body(&self, body: &Value) -> Result<CircuitCommand, CommandRejection> {
        let state = body
            .get("state")
            .ok_or(CommandRejection::MissingField("state"))?;
        if !state.is_boolean() {
            return Err(CommandRejection::NotBoolean {
                field: "state",
                found: describe(state),
            });
        }

        let name = match body.get("circuit") {
            None => return Err(CommandRejection::MissingField("circuit")),
            Some(Value::String(name)) => name,
            Some(other) => {
                return Err(CommandRejection::NotString {
                    field: "circuit",
                    found: describe(other),
                });
            }
        };

        self.validate(name, state)
    }

    /// Send a validated command to the live link.
    ///
    /// # Errors
    ///
    /// [`CommandRejection::Unavailable`] when no link is published,
    /// [`CommandRejection::WriteFailed`] when the link call itself fails.
    pub async fn apply(&self, command: CircuitCommand) -> Result<CommandOutcome, CommandRejection> {
        let link = self.link.current().ok_or(CommandRejection::Unavailable)?;

        match link.set_circuit(command.circuit, command.on).await {
            Ok(acknowledged) => {
                info!(
                    circuit = %command.circuit,
                    on = command.on,
                    acknowledged,
                    "circuit command sent"
                );
                Ok(CommandOutcome {
                    circuit: command.circuit,
                    on: command.on,
                    acknowledged,
                })
            }
            Err(e) => {
                error!(circuit = %command.circuit, error = %e, "circuit command failed");
                Err(CommandRejection::WriteFailed(e))
            }
        }
    }

    /// [`validate`](Self::validate) then [`apply`](Self::apply).
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate) and [`apply`](Self::apply).
    pub async fn submit(&self, name: &str, value: &Value) -> Result<CommandOutcome, CommandRejection> {
        let command = self.validate(name, value)?;
        self.apply(command).await
    }

    /// Whether a link is currently available for writes.
    pub fn link_available(&self) -> bool {
        self.link.is_connected()
    }
}

/// Short description of a JSON value for error messages.
fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean {b}"),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => format!("string \"{s}\""),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}
