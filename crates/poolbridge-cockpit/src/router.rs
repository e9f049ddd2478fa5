//! [`Router`] – maps a parsed [`Request`] onto the bridge's endpoints.
//!
//! | Method    | Path                        | Answer                           |
//! |-----------|-----------------------------|----------------------------------|
//! | `GET`     | `/state/all`                | full snapshot                    |
//! | `GET`     | `/state/circuits`           | circuits object only             |
//! | `GET`     | `/health`                   | `{"ok": true, "connected": ..}`  |
//! | `GET`     | `/events`, `/ws`            | event stream (SSE or WebSocket)  |
//! | `PUT`     | `/state/circuit/setState`   | circuit command                  |
//! | `OPTIONS` | any                         | `204` CORS preflight             |
//! | other     | other                       | `404 {"error": "not found"}`     |
//!
//! Query strings are ignored for routing.

use std::sync::Arc;

use poolbridge_kernel::{CommandGate, CommandRejection, StateStore};
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::http::{Request, Response};

/// What the connection handler should do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Write this response and close.
    Respond(Response),
    /// Hand the connection to the streaming fan-out.
    Stream,
}

/// Stateless request dispatcher over the shared store and command gate.
#[derive(Clone)]
pub struct Router {
    store: Arc<StateStore>,
    gate: CommandGate,
}

impl Router {
    pub fn new(store: Arc<StateStore>, gate: CommandGate) -> Self {
        Self { store, gate }
    }

    /// The store streams read from.
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Route `request` to its handler.
    pub async fn dispatch(&self, request: &Request) -> Dispatch {
        let response = match (request.method.as_str(), request.path()) {
            ("OPTIONS", _) => Response::no_content(),
            ("GET", "/state/all") => {
                let (snapshot, _) = self.store.read();
                Response::json(200, &*snapshot)
            }
            ("GET", "/state/circuits") => {
                let (snapshot, _) = self.store.read();
                Response::json(200, &snapshot.circuits)
            }
            ("GET", "/health") => Response::json(
                200,
                &json!({ "ok": true, "connected": self.gate.link_available() }),
            ),
            ("GET", path) if is_stream_path(path) => return Dispatch::Stream,
            ("PUT", "/state/circuit/setState") => self.set_circuit(&request.body).await,
            _ => Response::not_found(),
        };
        Dispatch::Respond(response)
    }

    async fn set_circuit(&self, body: &[u8]) -> Response {
        // An empty body is an empty object, so it fails on the missing field.
        let parsed = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Object(Map::new())
        } else {
            match serde_json::from_slice::<Value>(body) {
                Ok(value) => value,
                Err(_) => return Response::error(400, "invalid JSON"),
            }
        };

        let outcome = match self.gate.validate_body(&parsed) {
            Ok(command) => self.gate.apply(command).await,
            Err(rejection) => Err(rejection),
        };

        match outcome {
            Ok(outcome) => Response::json(
                200,
                &json!({
                    "ok": outcome.acknowledged,
                    "circuit": outcome.circuit.name(),
                    "state": outcome.on,
                }),
            ),
            Err(rejection) => {
                warn!(
                    status = rejection.status_code(),
                    reason = %rejection,
                    "circuit command rejected"
                );
                rejection_response(&rejection)
            }
        }
    }
}

fn is_stream_path(path: &str) -> bool {
    path == "/events" || path == "/ws" || path.starts_with("/ws/")
}

fn rejection_response(rejection: &CommandRejection) -> Response {
    let status = rejection.status_code();
    match rejection {
        CommandRejection::UnknownCircuit { valid, .. } => Response::json(
            status,
            &json!({ "error": rejection.to_string(), "validCircuits": valid }),
        ),
        _ => Response::error(status, &rejection.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
