//! `poolbridge-middleware` – Link Supervision
//!
//! Keeps the bridge attached to its pool controller.  [`LinkSupervisor`]
//! opens links through a [`PanelConnector`][poolbridge_hal::PanelConnector],
//! turns decoder notifications into versioned snapshots, and reconnects after
//! every failure until it is cancelled.

pub mod supervisor;

pub use supervisor::{DEFAULT_RETRY_DELAY, LinkState, LinkSupervisor, SupervisorConfig};
