//! # Reachability Monitor
//!
//! Process-wide network reachability signal.
//!
//! ## Overview
//!
//! [`Reachability`] holds the current [`ReachabilityState`] in a
//! `tokio::sync::watch` channel and broadcasts confirmed transitions as
//! [`NetworkEvent`]s. It is a pure signal source: no retry logic lives here.
//! The queue processor consumes only the unreachable direction (its
//! hard-cancel signal); the reachable direction drives the external re-drive
//! mechanism via [`spawn_reconnect_redrive`].
//!
//! State defaults to `Unconfirmed`, optimistic until the first confirmation
//! from the platform monitor arrives, so a cold start does not stall the
//! queue.

use crate::error::Result;
use bridge_traits::network::{NetworkMonitor, NetworkStatus};
use core_runtime::events::{CoreEvent, EventBus, NetworkEvent, RecvError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Process-wide reachability signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReachabilityState {
    /// No confirmation yet; treated optimistically
    #[default]
    Unconfirmed,
    /// The device has network access
    Reachable,
    /// The device has no network access
    Unreachable,
}

impl ReachabilityState {
    /// Get the string representation for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReachabilityState::Unconfirmed => "unconfirmed",
            ReachabilityState::Reachable => "reachable",
            ReachabilityState::Unreachable => "unreachable",
        }
    }
}

impl std::fmt::Display for ReachabilityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reachability monitor: current state plus transition broadcasts.
pub struct Reachability {
    state_tx: watch::Sender<ReachabilityState>,
    event_bus: EventBus,
}

impl Reachability {
    /// Create a monitor in the `Unconfirmed` state.
    pub fn new(event_bus: EventBus) -> Self {
        let (state_tx, _) = watch::channel(ReachabilityState::default());
        Self {
            state_tx,
            event_bus,
        }
    }

    /// The current reachability state.
    pub fn current(&self) -> ReachabilityState {
        *self.state_tx.borrow()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ReachabilityState> {
        self.state_tx.subscribe()
    }

    /// Record a state transition.
    ///
    /// Confirmed transitions are broadcast as [`NetworkEvent`]s; a regression
    /// to `Unconfirmed` updates the watch silently.
    pub fn set_state(&self, next: ReachabilityState) {
        let previous = self.current();
        if previous == next {
            return;
        }

        self.state_tx.send_replace(next);

        match next {
            ReachabilityState::Reachable => {
                info!(previous = %previous, "Network became reachable");
                self.event_bus
                    .emit(CoreEvent::Network(NetworkEvent::BecameReachable))
                    .ok();
            }
            ReachabilityState::Unreachable => {
                warn!(previous = %previous, "Network became unreachable");
                self.event_bus
                    .emit(CoreEvent::Network(NetworkEvent::BecameUnreachable))
                    .ok();
            }
            ReachabilityState::Unconfirmed => {}
        }
    }

    /// Feed this monitor from a platform [`NetworkMonitor`] change stream
    /// until the stream closes or `shutdown` fires.
    pub async fn drive(
        &self,
        monitor: Arc<dyn NetworkMonitor>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut changes = monitor.subscribe_changes().await?;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                info = changes.next() => match info {
                    Some(info) => self.set_state(map_status(info.status)),
                    None => {
                        debug!("Network change stream closed");
                        return Ok(());
                    }
                },
            }
        }
    }
}

fn map_status(status: NetworkStatus) -> ReachabilityState {
    match status {
        NetworkStatus::Connected => ReachabilityState::Reachable,
        NetworkStatus::Disconnected => ReachabilityState::Unreachable,
        NetworkStatus::Indeterminate => ReachabilityState::Unconfirmed,
    }
}

/// Spawn the external re-drive driver.
///
/// Invokes `on_reachable` for every `BecameReachable` transition (and after a
/// lagged receive, since a transition may have been missed). The queue
/// processor itself never consumes the reachable direction; this task is the
/// only bridge between restoration and queue draining.
pub fn spawn_reconnect_redrive<F>(
    event_bus: &EventBus,
    shutdown: CancellationToken,
    on_reachable: F,
) -> JoinHandle<()>
where
    F: Fn() + Send + 'static,
{
    let mut events = event_bus.subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Ok(CoreEvent::Network(NetworkEvent::BecameReachable)) => {
                        debug!("Reachability restored; requesting queue drive");
                        on_reachable();
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        debug!(missed, "Re-drive listener lagged; requesting drive");
                        on_reachable();
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    })
}
