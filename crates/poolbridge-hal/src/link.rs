//! The decoder capability: how the bridge talks to a pool controller.
//!
//! The bridge never parses controller bytes itself.  A protocol decoder
//! implements [`PanelConnector`] (open a link) and [`PanelLink`] (drive the
//! open link), and the rest of the system only ever talks to these traits.
//!
//! # Contract
//!
//! * [`PanelLink::process`] – runs for as long as the link is healthy,
//!   decoding frames and sending one [`PanelChange`] per observed change.
//!   It returns `Ok(())` on a clean end of stream and `Err` on any link
//!   failure; either way the link is considered dead afterwards.
//! * [`PanelLink::fields`] – a consistent read view over the decoded values.
//!   The view may hold a lock, so callers keep it only for the length of one
//!   capture and never across an `.await`.
//! * [`PanelLink::set_circuit`] – queue a circuit toggle on the controller.

use std::sync::Arc;

use async_trait::async_trait;
use poolbridge_types::{Circuit, Field, FieldReader, LinkError};
use tokio::sync::mpsc;

/// Change notification emitted by a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelChange {
    /// A single field changed value.
    Field(Field),
    /// A frame touching several fields was decoded.
    Frame,
}

/// An open connection to a pool controller.
#[async_trait]
pub trait PanelLink: Send + Sync {
    /// Borrow a consistent view of the decoded field values.
    fn fields(&self) -> Box<dyn FieldReader + '_>;

    /// Decode controller traffic, reporting changes on `changes`, until the
    /// link fails or the stream ends.
    ///
    /// A closed `changes` channel means nobody is listening any more; the
    /// implementation should return `Ok(())`.
    ///
    /// # Errors
    ///
    /// Any [`LinkError`] that ended the session (I/O failure, controller
    /// timeout, unexpected end of stream).
    async fn process(&self, changes: mpsc::Sender<PanelChange>) -> Result<(), LinkError>;

    /// Switch `circuit` on or off.
    ///
    /// Returns the controller's acknowledgement (`true` when the request was
    /// accepted or the circuit is already in the requested state).
    ///
    /// # Errors
    ///
    /// Returns a [`LinkError`] if the request could not be sent.
    async fn set_circuit(&self, circuit: Circuit, on: bool) -> Result<bool, LinkError>;
}

/// Factory for [`PanelLink`]s, called once per connection attempt.
#[async_trait]
pub trait PanelConnector: Send + Sync {
    /// Human-readable description of the target, used in log lines
    /// (e.g. `"/dev/ttyAMA0"` or `"simulated controller"`).
    fn target(&self) -> String;

    /// Open a fresh link to the controller.
    ///
    /// # Errors
    ///
    /// Returns a [`LinkError`] when the controller cannot be reached.
    async fn connect(&self) -> Result<Arc<dyn PanelLink>, LinkError>;
}
