//! In-process simulated pool controller for development and tests.
//!
//! [`SimPanel`] behaves like a decoder attached to a live controller: it
//! emits a [`PanelChange::Frame`] on every tick (slowly drifting the air
//! temperature), acknowledges circuit toggles, and can be told to hang up or
//! to fail writes so the reconnect and error paths can be exercised without
//! hardware.  [`SimConnector`] hands out the same panel on every connection
//! attempt, optionally failing the first few.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use poolbridge_hal::sim::{SimConnector, SimPanel};
//!
//! let panel = Arc::new(SimPanel::new(Duration::from_millis(250)));
//! let connector = SimConnector::new(Arc::clone(&panel)).failing_first(2);
//! assert_eq!(connector.attempts(), 0);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use poolbridge_types::{Circuit, Field, FieldReader, FieldValue, LinkError};
use tokio::sync::{Notify, mpsc};
use tracing::debug;

use crate::link::{PanelChange, PanelConnector, PanelLink};

// ────────────────────────────────────────────────────────────────────────────
// SimPanel
// ────────────────────────────────────────────────────────────────────────────

struct SimState {
    values: HashMap<Field, FieldValue>,
    /// Fields changed since `process` last reported.
    pending: Vec<Field>,
    frame: u64,
}

/// A simulated controller plus decoder.
pub struct SimPanel {
    state: Mutex<SimState>,
    wake: Notify,
    hangup: Notify,
    tick: Duration,
    fail_writes: AtomicBool,
}

impl SimPanel {
    /// A panel with plausible default readings that emits a frame every
    /// `tick`.  Only the filter pump circuit starts switched on.
    pub fn new(tick: Duration) -> Self {
        let mut values = HashMap::new();
        values.insert(Field::AirTemp, FieldValue::Temperature(72));
        values.insert(Field::PoolTemp, FieldValue::Temperature(80));
        values.insert(Field::SpaTemp, FieldValue::Temperature(98));
        values.insert(Field::SaltLevel, FieldValue::Level(3.2));
        values.insert(Field::PoolChlorinator, FieldValue::Percent(50));
        values.insert(Field::SpaChlorinator, FieldValue::Percent(3));
        values.insert(Field::PumpSpeed, FieldValue::Percent(60));
        values.insert(Field::PumpPower, FieldValue::Watts(900));
        values.insert(Field::IsMetric, FieldValue::Flag(false));
        values.insert(Field::IsHeaterEnabled, FieldValue::Flag(true));
        values.insert(Field::CheckSystemMsg, FieldValue::Flag(false));
        for circuit in Circuit::ALL {
            values.insert(
                Field::Circuit(circuit),
                FieldValue::Switch(circuit == Circuit::Filter),
            );
        }

        Self {
            state: Mutex::new(SimState {
                values,
                pending: Vec::new(),
                frame: 0,
            }),
            wake: Notify::new(),
            hangup: Notify::new(),
            tick,
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Current value of `field`, if the simulated decoder supports it.
    pub fn value(&self, field: Field) -> Option<FieldValue> {
        self.lock().values.get(&field).copied()
    }

    /// Inject a controller-side change, as if the decoder had just parsed it.
    pub fn set_value(&self, field: Field, value: FieldValue) {
        {
            let mut state = self.lock();
            state.values.insert(field, value);
            state.pending.push(field);
        }
        self.wake.notify_one();
    }

    /// Stop supporting `field`; reads of it fail from now on.
    pub fn remove_field(&self, field: Field) {
        self.lock().values.remove(&field);
    }

    /// Make the running (or next) `process` call end with
    /// [`LinkError::StreamEnded`].
    pub fn hang_up(&self) {
        self.hangup.notify_one();
    }

    /// Make every subsequent [`PanelLink::set_circuit`] call fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of frames emitted so far.
    pub fn frames(&self) -> u64 {
        self.lock().frame
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advance_frame(&self) {
        let mut state = self.lock();
        state.frame += 1;
        let drift = if state.frame % 8 < 4 { 1 } else { -1 };
        if let Some(FieldValue::Temperature(degrees)) = state.values.get_mut(&Field::AirTemp) {
            *degrees += drift;
        }
    }

    fn take_pending(&self) -> Vec<Field> {
        std::mem::take(&mut self.lock().pending)
    }
}

struct SimView<'a>(MutexGuard<'a, SimState>);

impl FieldReader for SimView<'_> {
    fn read(&self, field: Field) -> Result<FieldValue, LinkError> {
        self.0
            .values
            .get(&field)
            .copied()
            .ok_or_else(|| LinkError::UnsupportedField(field.to_string()))
    }
}

#[async_trait]
impl PanelLink for SimPanel {
    fn fields(&self) -> Box<dyn FieldReader + '_> {
        Box::new(SimView(self.lock()))
    }

    async fn process(&self, changes: mpsc::Sender<PanelChange>) -> Result<(), LinkError> {
        // Announce the initial readings straight away.
        if changes.send(PanelChange::Frame).await.is_err() {
            return Ok(());
        }

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick of an interval completes immediately.
        ticker.tick().await;

        loop {
            let batch = tokio::select! {
                () = self.hangup.notified() => {
                    debug!("simulated controller hung up");
                    return Err(LinkError::StreamEnded);
                }
                () = self.wake.notified() => {
                    self.take_pending().into_iter().map(PanelChange::Field).collect()
                }
                _ = ticker.tick() => {
                    self.advance_frame();
                    vec![PanelChange::Frame]
                }
            };

            for change in batch {
                if changes.send(change).await.is_err() {
                    return Ok(());
                }
            }
        }
    }

    async fn set_circuit(&self, circuit: Circuit, on: bool) -> Result<bool, LinkError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LinkError::Io("simulated write failure".to_string()));
        }
        self.set_value(Field::Circuit(circuit), FieldValue::Switch(on));
        Ok(true)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimConnector
// ────────────────────────────────────────────────────────────────────────────

/// Connector that always returns the same [`SimPanel`].
pub struct SimConnector {
    panel: Arc<SimPanel>,
    fail_first: u32,
    attempts: AtomicU32,
}

impl SimConnector {
    /// Connect to `panel` on every attempt.
    pub fn new(panel: Arc<SimPanel>) -> Self {
        Self {
            panel,
            fail_first: 0,
            attempts: AtomicU32::new(0),
        }
    }

    /// Fail the first `n` connection attempts (builder-style).
    pub fn failing_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    /// Number of `connect` calls so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PanelConnector for SimConnector {
    fn target(&self) -> String {
        "simulated controller".to_string()
    }

    async fn connect(&self) -> Result<Arc<dyn PanelLink>, LinkError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            return Err(LinkError::Io(format!(
                "simulated connect failure {} of {}",
                attempt + 1,
                self.fail_first
            )));
        }
        let link: Arc<dyn PanelLink> = self.panel.clone();
        Ok(link)
    }
}
