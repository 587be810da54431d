//! Completion hook adapter

use super::Producer;
use async_trait::async_trait;

/// Forwards every pull and runs a hook the first time the inner producer
/// reports the end
///
/// Failures do not trigger the hook.
pub struct OnComplete<P, F> {
    inner: P,
    hook: Option<F>,
}

impl<P, F> OnComplete<P, F> {
    pub fn new(inner: P, hook: F) -> Self {
        Self {
            inner,
            hook: Some(hook),
        }
    }
}

#[async_trait]
impl<P, F> Producer for OnComplete<P, F>
where
    P: Producer,
    F: FnOnce() + Send,
{
    type Item = P::Item;
    type Error = P::Error;

    async fn pull(&mut self) -> Result<Option<Self::Item>, Self::Error> {
        let next = self.inner.pull().await?;
        if next.is_none() {
            if let Some(hook) = self.hook.take() {
                hook();
            }
        }
        Ok(next)
    }
}
