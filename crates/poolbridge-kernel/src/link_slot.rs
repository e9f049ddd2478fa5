//! [`LinkSlot`] – where the live controller link is published.
//!
//! Only the link supervisor installs or clears the link.  Everyone else can
//! ask whether a link is present and borrow it for one call, but never
//! closes it.

use std::sync::{Arc, PoisonError, RwLock};

use poolbridge_hal::PanelLink;

/// Shared cell holding the current [`PanelLink`], if any.
///
/// Cheap to clone; all clones share the same cell.
#[derive(Clone, Default)]
pub struct LinkSlot {
    current: Arc<RwLock<Option<Arc<dyn PanelLink>>>>,
}

impl LinkSlot {
    /// Create an empty slot (no link).
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `link` as the live connection.
    pub fn install(&self, link: Arc<dyn PanelLink>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(link);
    }

    /// Drop the published link.  Returns whether one was present.
    pub fn clear(&self) -> bool {
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    /// Borrow the live link for one operation.
    pub fn current(&self) -> Option<Arc<dyn PanelLink>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a link is currently published.
    pub fn is_connected(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
