//! Shared storage and producer driver
//!
//! Owns the state machine behind a single lock and the one background task
//! that pulls the producer. Waiters are tokio oneshot senders; they are
//! always resolved after the lock has been released.

use super::locked::Locked;
use super::state::{
    CacheStatus, DispatchSet, FirstAccess, Request, Resolution, StateMachine, Waiter,
};
use crate::error::ReplayError;
use crate::producer::BoxProducer;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};
use uuid::Uuid;

type Sender<T, E> = oneshot::Sender<Resolution<T, E>>;

impl<T, E> Waiter for Sender<T, E> {
    fn is_abandoned(&self) -> bool {
        self.is_closed()
    }
}

pub(crate) struct SharedStorage<T, E> {
    id: Uuid,
    label: Option<String>,
    runtime: Option<Handle>,
    machine: Locked<StateMachine<T, E, Sender<T, E>>>,
}

impl<T, E> SharedStorage<T, E>
where
    T: Clone + Send + 'static,
    E: Send + Sync + 'static,
{
    pub(crate) fn new(
        producer: BoxProducer<T, E>,
        label: Option<String>,
        runtime: Option<Handle>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            label,
            runtime,
            machine: Locked::new(StateMachine::new(producer)),
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub(crate) fn status(&self) -> CacheStatus {
        self.machine.with_lock(|m| m.status())
    }

    pub(crate) fn buffered_len(&self) -> usize {
        self.machine.with_lock(|m| m.buffered_len())
    }

    #[cfg(test)]
    pub(crate) fn waiting_count(&self) -> usize {
        self.machine.with_lock(|m| m.waiting_count())
    }

    /// Resolve the element at `idx`, starting the driver on first use
    pub(crate) async fn request_index(self: &Arc<Self>, idx: usize) -> Resolution<T, E> {
        if self.machine.with_lock(|m| m.is_initial()) {
            let Some(handle) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
                return Err(ReplayError::NoRuntime);
            };

            if let FirstAccess::StartDriver(producer) =
                self.machine.with_lock(|m| m.on_first_access())
            {
                self.start_driver(&handle, producer);
            }
        }

        let request = self.machine.with_lock(|m| m.request(idx, oneshot::channel));

        match request {
            Request::Immediate(resolution) => resolution,
            Request::Pending(rx) => {
                trace!(cache = %self.id, idx, "waiting for element");
                rx.await.unwrap_or(Err(ReplayError::DriverLost))
            }
        }
    }

    fn start_driver(self: &Arc<Self>, handle: &Handle, producer: BoxProducer<T, E>) {
        debug!(cache = %self.id, label = ?self.label, "starting producer driver");
        // Armed before spawning so a task dropped unpolled still fails waiters.
        let guard = DriverGuard {
            storage: Arc::clone(self),
            armed: true,
        };
        handle.spawn(drive(guard, producer));
    }
}

/// Pull the producer to completion, feeding every result into the state machine
async fn drive<T, E>(mut guard: DriverGuard<T, E>, mut producer: BoxProducer<T, E>)
where
    T: Clone + Send + 'static,
    E: Send + Sync + 'static,
{
    let storage = Arc::clone(&guard.storage);

    loop {
        match producer.pull().await {
            Ok(Some(element)) => {
                let batch = storage.machine.with_lock(|m| m.on_element_produced(element));
                trace!(cache = %storage.id, waiters = batch.len(), "element produced");
                dispatch(batch);
            }
            Ok(None) => {
                let (batch, len) = storage
                    .machine
                    .with_lock(|m| (m.on_finished(None), m.buffered_len()));
                guard.armed = false;
                debug!(cache = %storage.id, elements = len, waiters = batch.len(), "producer finished");
                dispatch(batch);
                break;
            }
            Err(e) => {
                let batch = storage.machine.with_lock(|m| m.on_finished(Some(e)));
                guard.armed = false;
                warn!(cache = %storage.id, label = ?storage.label, waiters = batch.len(), "producer failed");
                dispatch(batch);
                break;
            }
        }
    }
}

/// Fails every waiter if the driver task is dropped before it finishes
///
/// Covers a panicking producer, a runtime shutting down mid-run and a
/// runtime that was already gone when the driver was spawned.
struct DriverGuard<T: Clone, E> {
    storage: Arc<SharedStorage<T, E>>,
    armed: bool,
}

impl<T: Clone, E> Drop for DriverGuard<T, E> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let batch = self.storage.machine.with_lock(|m| m.on_driver_lost());
        warn!(cache = %self.storage.id, waiters = batch.len(), "producer driver lost");
        dispatch(batch);
    }
}

fn dispatch<T, E>(batch: DispatchSet<Sender<T, E>, T, E>) {
    for (tx, resolution) in batch {
        // The consumer may have stopped waiting.
        let _ = tx.send(resolution);
    }
}
