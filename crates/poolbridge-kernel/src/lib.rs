//! `poolbridge-kernel` – Shared State & Safety Gate
//!
//! The pieces every other component shares.  Nothing here does I/O of its
//! own.
//!
//! # Modules
//!
//! - [`state_store`] – [`StateStore`]: the latest controller
//!   [`Snapshot`][poolbridge_types::Snapshot] plus a version counter, read and
//!   written under one lock so readers never see a torn pair.
//! - [`link_slot`] – [`LinkSlot`]: the cell in which the link supervisor
//!   publishes the live [`PanelLink`][poolbridge_hal::PanelLink] (or nothing,
//!   while disconnected).
//! - [`command_gate`] – [`CommandGate`]: strict validation of circuit
//!   commands before they reach the controller.

pub mod command_gate;
pub mod link_slot;
pub mod state_store;

pub use command_gate::{CircuitCommand, CommandGate, CommandOutcome, CommandRejection};
pub use link_slot::LinkSlot;
pub use state_store::StateStore;
