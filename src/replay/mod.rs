//! Multicast replay cache
//!
//! A `ReplayCache` wraps one single-use producer and lets any number of
//! cursors read the whole produced sequence, in order, at their own pace.
//! The producer is driven at most once, by a background task started on
//! the first read from any cursor.
//!
//! # Replay rules
//!
//! | Cache state | Buffered index | Index past buffer |
//! |-------------|----------------|-------------------|
//! | Buffering | element | waits |
//! | Finished | element | end of sequence |
//! | Failed | producer error | producer error |
//!
//! A failure is global: once the producer fails, every read fails with
//! the same error, including indices that were delivered before.
//!
//! # Example
//!
//! ```
//! use rebroadcast::{IterProducer, ReplayCache, ReplayError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ReplayError<std::io::Error>> {
//!     let cache = ReplayCache::new(IterProducer::<_, std::io::Error>::new(1..=3));
//!     let mut a = cache.attach();
//!     let mut b = cache.attach();
//!
//!     assert_eq!(a.next().await?, Some(1));
//!     assert_eq!(b.next().await?, Some(1));
//!
//!     while a.next().await?.is_some() {}
//!     assert_eq!(b.next().await?, Some(2));
//!     assert_eq!(cache.buffered_len(), 3);
//!     Ok(())
//! }
//! ```

mod locked;
mod state;
mod storage;

pub use state::CacheStatus;

use crate::error::ReplayError;
use crate::producer::Producer;
use futures_util::stream::{self, Stream};
use std::fmt;
use std::sync::Arc;
use storage::SharedStorage;
use tokio::runtime::Handle;
use uuid::Uuid;

/// Construction options for a `ReplayCache`
#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Name attached to log events
    pub label: Option<String>,

    /// Runtime the driver is spawned on; defaults to the first caller's
    pub runtime: Option<Handle>,
}

impl ReplayOptions {
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }
}

/// Caches one producer run and replays it to every attached cursor
///
/// Clones share the same cache.
pub struct ReplayCache<T, E> {
    storage: Arc<SharedStorage<T, E>>,
}

impl<T, E> ReplayCache<T, E>
where
    T: Clone + Send + 'static,
    E: Send + Sync + 'static,
{
    /// Wrap a producer; nothing is pulled until a cursor asks
    pub fn new<P>(producer: P) -> Self
    where
        P: Producer<Item = T, Error = E> + 'static,
    {
        Self::with_options(producer, ReplayOptions::default())
    }

    /// Wrap a producer with explicit options
    pub fn with_options<P>(producer: P, options: ReplayOptions) -> Self
    where
        P: Producer<Item = T, Error = E> + 'static,
    {
        Self {
            storage: Arc::new(SharedStorage::new(
                Box::new(producer),
                options.label,
                options.runtime,
            )),
        }
    }

    /// Create a new cursor positioned at the first element
    pub fn attach(&self) -> Cursor<T, E> {
        Cursor {
            storage: Arc::clone(&self.storage),
            position: 0,
        }
    }

    /// Unique id used in log events
    pub fn id(&self) -> Uuid {
        self.storage.id()
    }

    pub fn label(&self) -> Option<&str> {
        self.storage.label()
    }

    /// Current lifecycle state
    pub fn status(&self) -> CacheStatus {
        self.storage.status()
    }

    /// Number of elements buffered so far
    pub fn buffered_len(&self) -> usize {
        self.storage.buffered_len()
    }
}

impl<T, E> Clone for ReplayCache<T, E> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<T, E> fmt::Debug for ReplayCache<T, E>
where
    T: Clone + Send + 'static,
    E: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayCache")
            .field("id", &self.id())
            .field("label", &self.label())
            .field("status", &self.status())
            .field("buffered", &self.buffered_len())
            .finish()
    }
}

/// One consumer's position in a `ReplayCache`
pub struct Cursor<T, E> {
    storage: Arc<SharedStorage<T, E>>,
    position: usize,
}

impl<T, E> Cursor<T, E>
where
    T: Clone + Send + 'static,
    E: Send + Sync + 'static,
{
    /// Next element, `None` at the end of the sequence, or the cached
    /// producer error
    ///
    /// Waits only while the element has not been produced yet. After the
    /// end every call returns `None`; after a failure every call fails.
    pub async fn next(&mut self) -> Result<Option<T>, ReplayError<E>> {
        let element = self.storage.request_index(self.position).await?;
        if element.is_some() {
            self.position += 1;
        }
        Ok(element)
    }

    /// Index of the element the next call will return
    pub fn position(&self) -> usize {
        self.position
    }

    /// Turn the cursor into a stream that ends after the sequence ends or
    /// after the first error
    pub fn into_stream(self) -> impl Stream<Item = Result<T, ReplayError<E>>> + Send {
        stream::unfold(Some(self), |cursor| async move {
            let mut cursor = cursor?;
            match cursor.next().await {
                Ok(Some(element)) => Some((Ok(element), Some(cursor))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

impl<T, E> fmt::Debug for Cursor<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}
