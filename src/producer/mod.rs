//! Pull-based producer contract and adapters
//!
//! A producer yields elements one pull at a time until it reports the end
//! or fails. It is single-use: after `Ok(None)` or `Err` it must not be
//! pulled again. `ReplayCache` is the only caller in this crate.

mod on_complete;

pub use on_complete::OnComplete;

use crate::replay::{ReplayCache, ReplayOptions};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use std::marker::PhantomData;

/// Single-use, pull-based source of elements
#[async_trait]
pub trait Producer: Send {
    type Item: Send;
    type Error: Send;

    /// `Ok(Some)` for an element, `Ok(None)` at the end, `Err` on failure
    async fn pull(&mut self) -> Result<Option<Self::Item>, Self::Error>;
}

/// Type-erased producer
pub type BoxProducer<T, E> = Box<dyn Producer<Item = T, Error = E>>;

#[async_trait]
impl<P: Producer + ?Sized> Producer for Box<P> {
    type Item = P::Item;
    type Error = P::Error;

    async fn pull(&mut self) -> Result<Option<Self::Item>, Self::Error> {
        (**self).pull().await
    }
}

/// Combinators available on every producer
pub trait ProducerExt: Producer {
    /// Hide the concrete producer type
    fn boxed(self) -> BoxProducer<Self::Item, Self::Error>
    where
        Self: Sized + 'static,
    {
        Box::new(self)
    }

    /// Run `hook` once, the first time this producer reports the end
    fn on_complete<F>(self, hook: F) -> OnComplete<Self, F>
    where
        Self: Sized,
        F: FnOnce() + Send,
    {
        OnComplete::new(self, hook)
    }

    /// Cache this producer for replay to any number of cursors
    fn replay(self) -> ReplayCache<Self::Item, Self::Error>
    where
        Self: Sized + 'static,
        Self::Item: Clone + 'static,
        Self::Error: Sync + 'static,
    {
        ReplayCache::new(self)
    }

    /// Like `replay`, with explicit options
    fn replay_with(self, options: ReplayOptions) -> ReplayCache<Self::Item, Self::Error>
    where
        Self: Sized + 'static,
        Self::Item: Clone + 'static,
        Self::Error: Sync + 'static,
    {
        ReplayCache::with_options(self, options)
    }
}

impl<P: Producer + ?Sized> ProducerExt for P {}

/// Adapts a stream of `Result`s into a producer
#[derive(Debug)]
pub struct StreamProducer<S> {
    inner: S,
}

impl<S> StreamProducer<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S, T, E> Producer for StreamProducer<S>
where
    S: Stream<Item = Result<T, E>> + Unpin + Send,
    T: Send,
    E: Send,
{
    type Item = T;
    type Error = E;

    async fn pull(&mut self) -> Result<Option<T>, E> {
        self.inner.next().await.transpose()
    }
}

/// Infallible producer over an in-memory iterator
pub struct IterProducer<I, E> {
    iter: I,
    _error: PhantomData<fn() -> E>,
}

impl<I: Iterator, E> IterProducer<I, E> {
    pub fn new(items: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            iter: items.into_iter(),
            _error: PhantomData,
        }
    }
}

#[async_trait]
impl<I, E> Producer for IterProducer<I, E>
where
    I: Iterator + Send,
    I::Item: Send,
    E: Send,
{
    type Item = I::Item;
    type Error = E;

    async fn pull(&mut self) -> Result<Option<I::Item>, E> {
        Ok(self.iter.next())
    }
}
