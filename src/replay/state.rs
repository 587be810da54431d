//! Replay cache state machine
//!
//! Pure transition logic over the cache lifecycle, the waiter registry and
//! the buffered elements. Callers serialize access; nothing here blocks,
//! awaits or wakes anyone. Transitions hand back the waiters to resolve
//! and the caller resolves them once the critical section is released.
//!
//! | State | Entered | Left |
//! |-------|---------|------|
//! | Initial | construction | first access |
//! | Buffering | first access | producer ends, fails or driver is lost |
//! | Finished | driver terminal | never |

use crate::error::ReplayError;
use crate::producer::BoxProducer;
use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::sync::Arc;

/// What a waiter is eventually handed: an element, end of sequence, or the
/// cached terminal error
pub(crate) type Resolution<T, E> = Result<Option<T>, ReplayError<E>>;

/// Waiters paired with what each should be resolved with
pub(crate) type DispatchSet<W, T, E> = Vec<(W, Resolution<T, E>)>;

/// A registered waiter that may have been abandoned by its consumer
pub(crate) trait Waiter {
    /// True once nobody is listening for the resolution anymore
    fn is_abandoned(&self) -> bool;
}

/// Public view of the lifecycle, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Nobody has asked for an element yet
    Initial,
    /// The driver is pulling the producer
    Buffering,
    /// The producer ended normally; the buffer is final
    Finished,
    /// The producer failed or its driver was lost
    Failed,
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Buffering => write!(f, "buffering"),
            Self::Finished => write!(f, "finished"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

pub(crate) enum CacheState<T, E> {
    Initial(BoxProducer<T, E>),
    Buffering(Vec<T>),
    Finished(Result<Vec<T>, ReplayError<E>>),
}

/// Outcome of the first access check
pub(crate) enum FirstAccess<T, E> {
    /// The caller won the race and must start the driver with this producer
    StartDriver(BoxProducer<T, E>),
    AlreadyStarted,
}

/// Outcome of an index request
#[derive(Debug)]
pub(crate) enum Request<T, E, R> {
    Immediate(Resolution<T, E>),
    /// A waiter was registered; `R` is the caller's half of it
    Pending(R),
}

/// Smallest waiter list length that triggers a prune
const MIN_PRUNE_LEN: usize = 4;

/// Waiters registered on one index
///
/// Abandoned waiters are pruned once the list doubles since the last
/// prune, so registration stays amortized constant time.
struct Slot<W> {
    waiters: Vec<W>,
    prune_at: usize,
}

impl<W: Waiter> Slot<W> {
    fn new() -> Self {
        Self {
            waiters: Vec::new(),
            prune_at: MIN_PRUNE_LEN,
        }
    }

    fn push(&mut self, waiter: W) {
        if self.waiters.len() >= self.prune_at {
            self.waiters.retain(|w| !w.is_abandoned());
            self.prune_at = (self.waiters.len() * 2).max(MIN_PRUNE_LEN);
        }
        self.waiters.push(waiter);
    }

    /// Waiters still listening
    fn into_live(self) -> impl Iterator<Item = W> {
        self.waiters.into_iter().filter(|w| !w.is_abandoned())
    }
}

pub(crate) struct StateMachine<T, E, W> {
    state: CacheState<T, E>,
    waiters: BTreeMap<usize, Slot<W>>,
}

impl<T: Clone, E, W: Waiter> StateMachine<T, E, W> {
    pub(crate) fn new(producer: BoxProducer<T, E>) -> Self {
        Self {
            state: CacheState::Initial(producer),
            waiters: BTreeMap::new(),
        }
    }

    pub(crate) fn status(&self) -> CacheStatus {
        match &self.state {
            CacheState::Initial(_) => CacheStatus::Initial,
            CacheState::Buffering(_) => CacheStatus::Buffering,
            CacheState::Finished(Ok(_)) => CacheStatus::Finished,
            CacheState::Finished(Err(_)) => CacheStatus::Failed,
        }
    }

    pub(crate) fn is_initial(&self) -> bool {
        matches!(self.state, CacheState::Initial(_))
    }

    /// Number of elements produced so far (zero after a failure)
    pub(crate) fn buffered_len(&self) -> usize {
        match &self.state {
            CacheState::Buffering(buffer) | CacheState::Finished(Ok(buffer)) => buffer.len(),
            _ => 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn waiting_count(&self) -> usize {
        self.waiters.values().map(|slot| slot.waiters.len()).sum()
    }

    /// Move `Initial` to `Buffering`, exactly once
    pub(crate) fn on_first_access(&mut self) -> FirstAccess<T, E> {
        if !self.is_initial() {
            return FirstAccess::AlreadyStarted;
        }

        match mem::replace(&mut self.state, CacheState::Buffering(Vec::new())) {
            CacheState::Initial(producer) => FirstAccess::StartDriver(producer),
            _ => unreachable!("state checked above"),
        }
    }

    /// Append a freshly produced element and release the waiters it satisfies
    ///
    /// # Panics
    ///
    /// Panics unless the cache is `Buffering`; only the driver produces.
    pub(crate) fn on_element_produced(&mut self, element: T) -> DispatchSet<W, T, E> {
        let CacheState::Buffering(buffer) = &mut self.state else {
            panic!("element produced while cache is {}", self.status());
        };
        buffer.push(element);

        let len = buffer.len();
        let pending = self.waiters.split_off(&len);
        let ready = mem::replace(&mut self.waiters, pending);

        ready
            .into_iter()
            .flat_map(|(idx, slot)| {
                let element = buffer[idx].clone();
                slot.into_live()
                    .map(move |w| (w, Ok(Some(element.clone()))))
            })
            .collect()
    }

    /// Enter `Finished` and release every registered waiter
    ///
    /// `None` is a normal end; `Some(error)` is a producer failure that is
    /// replayed to every index from now on.
    ///
    /// # Panics
    ///
    /// Panics unless the cache is `Buffering`. Finishing twice means the
    /// driver loop is broken.
    pub(crate) fn on_finished(&mut self, error: Option<E>) -> DispatchSet<W, T, E> {
        let buffer = match mem::replace(&mut self.state, CacheState::Buffering(Vec::new())) {
            CacheState::Buffering(buffer) => buffer,
            other => {
                self.state = other;
                panic!("finish signalled while cache is {}", self.status());
            }
        };

        self.state = match error {
            None => CacheState::Finished(Ok(buffer)),
            Some(e) => CacheState::Finished(Err(ReplayError::Producer(Arc::new(e)))),
        };
        self.drain_all()
    }

    /// Enter `Finished` with `DriverLost` if the driver vanished mid-run
    ///
    /// Returns nothing when the cache already finished.
    pub(crate) fn on_driver_lost(&mut self) -> DispatchSet<W, T, E> {
        if !matches!(self.state, CacheState::Buffering(_)) {
            return Vec::new();
        }
        self.state = CacheState::Finished(Err(ReplayError::DriverLost));
        self.drain_all()
    }

    /// Answer a request for `idx`, or register a waiter for it
    ///
    /// `make_waiter` is only called when the element is not available yet;
    /// it returns the registered half and the half handed back to the caller.
    ///
    /// # Panics
    ///
    /// Panics in `Initial`: `on_first_access` must run first.
    pub(crate) fn request<R>(
        &mut self,
        idx: usize,
        make_waiter: impl FnOnce() -> (W, R),
    ) -> Request<T, E, R> {
        match &self.state {
            CacheState::Initial(_) => panic!("index {} requested before first access", idx),
            CacheState::Buffering(buffer) => match buffer.get(idx) {
                Some(element) => Request::Immediate(Ok(Some(element.clone()))),
                None => {
                    let (waiter, handle) = make_waiter();
                    self.register(idx, waiter);
                    Request::Pending(handle)
                }
            },
            CacheState::Finished(Ok(buffer)) => Request::Immediate(Ok(buffer.get(idx).cloned())),
            CacheState::Finished(Err(e)) => Request::Immediate(Err(e.clone())),
        }
    }

    fn register(&mut self, idx: usize, waiter: W) {
        self.waiters.entry(idx).or_insert_with(Slot::new).push(waiter);
    }

    fn drain_all(&mut self) -> DispatchSet<W, T, E> {
        let waiters = mem::take(&mut self.waiters);
        let mut batch = Vec::new();

        for (idx, slot) in waiters {
            let resolution = match &self.state {
                CacheState::Finished(Ok(buffer)) => Ok(buffer.get(idx).cloned()),
                CacheState::Finished(Err(e)) => Err(e.clone()),
                _ => unreachable!("waiters drained outside a terminal state"),
            };
            batch.extend(slot.into_live().map(|w| (w, resolution.clone())));
        }

        batch
    }
}
