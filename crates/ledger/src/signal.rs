//! # Gate Signals
//!
//! Read-only projections of eventually-consistent on-chain booleans
//! (network paused, operator authorization). Each signal is owned by a
//! single background refresher; consumers can only read the latest value,
//! never write it.
//!
//! A failed refresh keeps the previous value; a flaky poll must not flip
//! a gate.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{info, warn};

use dixn_common::types::Address;

use crate::client::{LedgerClient, LedgerError};

/// Refresh cadence for the pause and operator monitors.
pub const SIGNAL_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Latest-value view of a background-refreshed signal.
///
/// Cloning shares the underlying slot; all clones observe the same
/// refresher.
#[derive(Clone)]
pub struct Signal<T> {
    inner: Arc<RwLock<T>>,
    /// Fixed signals have no refresher and never change.
    fixed: bool,
}

impl<T: Clone> Signal<T> {
    /// A signal that permanently holds `value`. Used when the answer is
    /// known up front, e.g. operator status when indexer and operator
    /// identities coincide.
    #[must_use]
    pub fn fixed(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(value)),
            fixed: true,
        }
    }

    /// Latest observed value.
    pub fn current(&self) -> T {
        self.inner.read().clone()
    }

    /// Whether this signal is a constant.
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static,
{
    /// Start a background refresher polling `refresh` every `interval`.
    ///
    /// The refresher task holds the only write path. Refresh errors are
    /// logged and the previous value kept.
    pub fn spawn_refresher<F, Fut>(initial: T, interval: Duration, refresh: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, LedgerError>> + Send,
    {
        let inner = Arc::new(RwLock::new(initial));
        let slot = Arc::clone(&inner);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so the initial
            // value stands until one full interval has passed.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match refresh().await {
                    Ok(value) => {
                        let mut guard = slot.write();
                        if *guard != value {
                            let previous = guard.clone();
                            info!(?previous, now = ?value, "gate signal changed");
                        }
                        *guard = value;
                    }
                    Err(err) => {
                        let current = slot.read().clone();
                        warn!(
                            error = %err,
                            ?current,
                            "failed to refresh gate signal, assuming it has not changed"
                        );
                    }
                }
            }
        });

        Self {
            inner,
            fixed: false,
        }
    }
}

/// Monitor the network-wide pause flag.
///
/// Seeds the signal with an immediate read, then refreshes on
/// [`SIGNAL_REFRESH_INTERVAL`].
pub async fn monitor_network_pauses(
    client: Arc<dyn LedgerClient>,
) -> Result<Signal<bool>, LedgerError> {
    let initial = client.network_paused().await?;
    info!(paused = initial, "network pause monitor started");
    Ok(Signal::spawn_refresher(
        initial,
        SIGNAL_REFRESH_INTERVAL,
        move || {
            let client = Arc::clone(&client);
            async move { client.network_paused().await }
        },
    ))
}

/// Monitor operator authorization for `indexer`.
///
/// If indexer and operator identities are identical, operator status is
/// implicitly granted and the signal is permanently true, with no polling.
pub async fn monitor_operator_status(
    client: Arc<dyn LedgerClient>,
    operator: Address,
    indexer: Address,
) -> Result<Signal<bool>, LedgerError> {
    if operator == indexer {
        info!("indexer and operator are identical, operator status granted");
        return Ok(Signal::fixed(true));
    }

    let initial = client.is_operator(operator, indexer).await?;
    info!(is_operator = initial, "operator status monitor started");
    Ok(Signal::spawn_refresher(
        initial,
        SIGNAL_REFRESH_INTERVAL,
        move || {
            let client = Arc::clone(&client);
            async move { client.is_operator(operator, indexer).await }
        },
    ))
}
