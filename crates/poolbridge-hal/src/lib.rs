//! `poolbridge-hal` – Hardware Abstraction Layer
//!
//! # Modules
//!
//! - [`link`] – [`PanelLink`] and [`PanelConnector`]: the capability a pool
//!   controller decoder provides to the bridge (read fields, toggle circuits,
//!   report changes).
//! - [`sim`] – [`SimPanel`][sim::SimPanel] and
//!   [`SimConnector`][sim::SimConnector]: an in-process simulated controller
//!   so the full bridge runs without RS-485 hardware.

pub mod link;
pub mod sim;

pub use link::{PanelChange, PanelConnector, PanelLink};
pub use sim::{SimConnector, SimPanel};
