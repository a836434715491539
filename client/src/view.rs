use std::future::Future;

use parking_lot::Mutex;

use crate::error::ClientResult;

/// Per-view fetch state: what a page shows while data arrives.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Loadable<T> {
    #[default]
    Idle,
    Loading,
    Ready(T),
    /// Opaque, display-ready error text.
    Failed(String),
}

impl<T> Loadable<T> {
    pub fn from_result(res: ClientResult<T>) -> Self {
        match res {
            Ok(v) => Self::Ready(v),
            Err(e) => Self::Failed(e.to_string()),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(v) => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// A [`Loadable`] shared between a view and the tasks feeding it.
#[derive(Debug)]
pub struct ViewState<T> {
    inner: Mutex<Loadable<T>>,
}

impl<T: Clone> ViewState<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Loadable::Idle),
        }
    }

    /// Run `fetch`, flipping to `Loading` first. Calling it again is the retry.
    pub async fn load<F, Fut>(&self, fetch: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        *self.inner.lock() = Loadable::Loading;
        let res = fetch().await;
        *self.inner.lock() = Loadable::from_result(res);
    }

    /// Like [`load`](Self::load), but the outcome is only stored if
    /// `current` still holds once `fetch` returns. Returns whether it was.
    pub async fn load_if_current<F, Fut>(&self, fetch: F, current: impl FnOnce() -> bool) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        *self.inner.lock() = Loadable::Loading;
        let res = fetch().await;
        if !current() {
            return false;
        }
        *self.inner.lock() = Loadable::from_result(res);
        true
    }

    pub fn snapshot(&self) -> Loadable<T> {
        self.inner.lock().clone()
    }

    pub fn set(&self, value: Loadable<T>) {
        *self.inner.lock() = value;
    }

    /// Mutate the ready value in place; no-op while loading or failed.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        match &mut *self.inner.lock() {
            Loadable::Ready(v) => {
                f(v);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;

    #[tokio::test]
    async fn load_records_outcome() {
        let state: ViewState<u32> = ViewState::new();
        assert_eq!(state.snapshot(), Loadable::Idle);
        state
            .load(|| async { Err(ClientError::validation("boom")) })
            .await;
        assert_eq!(state.snapshot().error(), Some("boom"));
        assert!(!state.update(|v| *v += 1));

        state.load(|| async { Ok(41) }).await;
        assert!(state.update(|v| *v += 1));
        assert_eq!(state.snapshot().ready(), Some(&42));
    }

    #[tokio::test]
    async fn stale_outcome_is_dropped() {
        let state: ViewState<u32> = ViewState::new();
        assert!(!state.load_if_current(|| async { Ok(1) }, || false).await);
        // whoever superseded the fetch owns the state now
        state.set(Loadable::Ready(7));
        assert!(!state.load_if_current(|| async { Ok(1) }, || false).await);
        assert_eq!(state.snapshot(), Loadable::Ready(7));
        assert!(state.load_if_current(|| async { Ok(2) }, || true).await);
        assert_eq!(state.snapshot(), Loadable::Ready(2));
    }
}
