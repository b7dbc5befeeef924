//! Observable current-identity slot

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::watch;

use super::identity::Identity;

/// Holds who is signed in, if anyone.
///
/// Readers call [`current`](Self::current) or [`observe`](Self::observe); only
/// the session manager writes.
#[derive(Debug)]
pub struct SessionSignal {
    tx: watch::Sender<Option<Identity>>,
}

impl Default for SessionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// The identity right now
    pub fn current(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    pub fn is_set(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Stream of identity changes, starting with the latest value.
    ///
    /// Each call starts a fresh subscription. The stream ends when the signal
    /// is dropped.
    pub fn observe(&self) -> BoxStream<'static, Option<Identity>> {
        let mut rx = self.tx.subscribe();
        rx.mark_changed();
        stream::unfold(rx, |mut rx| async move {
            rx.changed().await.ok()?;
            let value = rx.borrow_and_update().clone();
            Some((value, rx))
        })
        .boxed()
    }

    /// Raw receiver for callers that prefer `watch` semantics
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }

    /// Replace the identity, notifying observers only when it changed
    pub(crate) fn set(&self, identity: Option<Identity>) {
        self.tx.send_if_modified(|current| {
            if *current == identity {
                false
            } else {
                *current = identity;
                true
            }
        });
    }
}
