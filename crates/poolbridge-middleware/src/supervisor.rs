//! [`LinkSupervisor`] – owns the single controller link.
//!
//! ```text
//!   Disconnected ──▶ Connecting ──▶ Connected
//!        ▲               │              │
//!        └── retry delay ┴── link error ┘
//! ```
//!
//! Each connection attempt runs as its own Tokio task.  The supervisor waits
//! on that task, so anything that goes wrong inside an attempt (a
//! [`LinkError`], a clean end of stream, even a panic in the decoder) ends
//! only that attempt.  The supervisor then clears the [`LinkSlot`], waits the
//! retry delay, and starts over.  The loop only stops when its
//! [`CancellationToken`] is cancelled.
//!
//! While connected, the decoder reports changes over an `mpsc` channel and
//! the supervisor turns every change into one full [`Snapshot`] written to
//! the [`StateStore`].  The supervisor is the store's only writer.

use std::sync::Arc;
use std::time::Duration;

use poolbridge_hal::{PanelChange, PanelConnector, PanelLink};
use poolbridge_kernel::{LinkSlot, StateStore};
use poolbridge_types::{LinkError, Snapshot};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause between a lost link and the next connection attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Buffered decoder notifications before the decoder is back-pressured.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Connection state of the controller link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Tunables for [`LinkSupervisor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Pause between a lost link and the next attempt.
    pub retry_delay: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Reconnecting owner of the controller link.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use poolbridge_hal::{SimConnector, SimPanel};
/// use poolbridge_kernel::{LinkSlot, StateStore};
/// use poolbridge_middleware::LinkSupervisor;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let panel = Arc::new(SimPanel::new(Duration::from_secs(1)));
///     let store = Arc::new(StateStore::new());
///     let slot = LinkSlot::new();
///     let cancel = CancellationToken::new();
///
///     let supervisor = LinkSupervisor::new(
///         Arc::new(SimConnector::new(panel)),
///         Arc::clone(&store),
///         slot.clone(),
///     );
///     supervisor.spawn(cancel.clone());
/// }
/// ```
pub struct LinkSupervisor {
    connector: Arc<dyn PanelConnector>,
    store: Arc<StateStore>,
    slot: LinkSlot,
    retry_delay: Duration,
    state: watch::Sender<LinkState>,
}

impl LinkSupervisor {
    /// Supervise links opened by `connector`, publishing snapshots into
    /// `store` and the live link into `slot`.
    pub fn new(connector: Arc<dyn PanelConnector>, store: Arc<StateStore>, slot: LinkSlot) -> Self {
        let (state, _) = watch::channel(LinkState::Disconnected);
        Self {
            connector,
            store,
            slot,
            retry_delay: DEFAULT_RETRY_DELAY,
            state,
        }
    }

    /// Apply `config` (builder-style).
    pub fn with_config(mut self, config: SupervisorConfig) -> Self {
        self.retry_delay = config.retry_delay;
        self
    }

    /// Override the delay between connection attempts (builder-style).
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Return the configured retry delay.
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Watch the link state.
    pub fn subscribe_state(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    /// Run the supervisor on a background task.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Supervise the link until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            target_link = %self.connector.target(),
            retry_delay_ms = duration_ms(self.retry_delay),
            "link supervisor started"
        );

        loop {
            self.state.send_replace(LinkState::Connecting);
            info!(target_link = %self.connector.target(), "connecting to controller");

            let session = tokio::spawn(run_session(
                Arc::clone(&self.connector),
                Arc::clone(&self.store),
                self.slot.clone(),
                self.state.clone(),
            ));
            let abort = session.abort_handle();
            tokio::pin!(session);

            let finished = tokio::select! {
                () = cancel.cancelled() => {
                    abort.abort();
                    // An attempt running on another worker finishes its
                    // current poll before the abort lands.
                    let _ = (&mut session).await;
                    None
                }
                joined = &mut session => Some(joined),
            };

            if self.slot.clear() {
                info!("controller link released");
            }
            self.state.send_replace(LinkState::Disconnected);

            let Some(joined) = finished else {
                break;
            };
            match joined {
                Ok(Ok(())) => warn!("controller stream ended (timeout or EOF)"),
                Ok(Err(e)) => error!(error = %e, "controller link error"),
                Err(e) if e.is_panic() => error!("controller session panicked"),
                Err(e) => error!(error = %e, "controller session aborted"),
            }

            info!(
                delay_ms = duration_ms(self.retry_delay),
                "reconnecting after delay"
            );
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.retry_delay) => {}
            }
        }

        self.slot.clear();
        self.state.send_replace(LinkState::Disconnected);
        info!("link supervisor stopped");
    }
}

/// One connection attempt: connect, publish the link, and pump decoder
/// changes into the store until the decoder stops.
async fn run_session(
    connector: Arc<dyn PanelConnector>,
    store: Arc<StateStore>,
    slot: LinkSlot,
    state: watch::Sender<LinkState>,
) -> Result<(), LinkError> {
    let link = connector.connect().await?;
    slot.install(Arc::clone(&link));
    state.send_replace(LinkState::Connected);
    info!("connected; processing controller data");

    let (changes_tx, mut changes_rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);
    let decoder = link.process(changes_tx);
    tokio::pin!(decoder);

    let result = loop {
        tokio::select! {
            result = &mut decoder => break result,
            Some(change) = changes_rx.recv() => {
                publish(link.as_ref(), &store, change);
            }
        }
    };

    // Changes sent just before the decoder stopped are still queued.
    while let Ok(change) = changes_rx.try_recv() {
        publish(link.as_ref(), &store, change);
    }
    result
}

/// Capture a full snapshot from `link` and write it to `store`.
fn publish(link: &dyn PanelLink, store: &StateStore, change: PanelChange) -> u64 {
    let snapshot = Snapshot::capture(link.fields().as_ref());
    let (air, pool, spa) = (snapshot.air_temp, snapshot.pool_temp, snapshot.spa_temp);
    let version = store.write(snapshot);
    debug!(version, ?change, ?air, ?pool, ?spa, "state updated");
    version
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
