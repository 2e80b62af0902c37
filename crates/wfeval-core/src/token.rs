//! Single-slot exclusivity token guarding evaluations of one entity.
//!
//! The token is exposed as a primitive instead of a blocking lock call so a
//! caller can poll it, wait for it, or race it against a deadline and fall
//! back to other work. Every successful acquisition returns an [`EvalGuard`]
//! that gives the token back when dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

/// Binary token: at most one holder at any time.
#[derive(Debug, Default)]
pub struct EvalToken {
    held: AtomicBool,
    released: Notify,
}

impl EvalToken {
    /// A new, available token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the token if it is available, without waiting.
    pub fn try_acquire(&self) -> Option<EvalGuard<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| EvalGuard::new(self))
    }

    /// Wait until the token is available and take it.
    ///
    /// Waits indefinitely while another holder keeps the token. Dropping the
    /// returned future abandons the attempt.
    pub async fn acquire(&self) -> EvalGuard<'_> {
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            // Register interest before polling so a concurrent free() is not missed.
            released.as_mut().enable();

            if let Some(guard) = self.try_acquire() {
                return guard;
            }
            released.await;
        }
    }

    /// Like [`EvalToken::acquire`], but gives up after `timeout`.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Option<EvalGuard<'_>> {
        tokio::time::timeout(timeout, self.acquire()).await.ok()
    }

    /// Return the token. Idempotent: freeing an available token does nothing.
    pub fn free(&self) {
        if self.held.swap(false, Ordering::Release) {
            self.released.notify_one();
        }
    }

    /// Whether some caller currently holds the token.
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Proof of exclusive access to an entity's evaluation.
///
/// Frees the token on drop. Use [`EvalGuard::detach`] when the token must
/// outlive the guard; the holder is then responsible for calling
/// [`crate::EvalState::free`].
#[must_use = "the token is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct EvalGuard<'a> {
    token: &'a EvalToken,
    armed: bool,
}

impl<'a> EvalGuard<'a> {
    fn new(token: &'a EvalToken) -> Self {
        Self { token, armed: true }
    }

    /// Keep holding the token after this guard goes away.
    pub fn detach(mut self) {
        self.armed = false;
    }

    /// Release the token now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for EvalGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.token.free();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_token_is_available() {
        let token = EvalToken::new();
        assert!(!token.is_held());
        let guard = token.try_acquire();
        assert!(guard.is_some());
        assert!(token.is_held());
    }

    #[test]
    fn test_second_try_acquire_fails_while_held() {
        let token = EvalToken::new();
        let _guard = token.try_acquire().expect("first acquire");
        assert!(token.try_acquire().is_none());
    }

    #[test]
    fn test_guard_drop_frees_token() {
        let token = EvalToken::new();
        token.try_acquire().expect("acquire").release();
        assert!(!token.is_held());
        assert!(token.try_acquire().is_some());
    }

    #[test]
    fn test_detached_guard_keeps_token_until_free() {
        let token = EvalToken::new();
        token.try_acquire().expect("acquire").detach();
        assert!(token.is_held());
        assert!(token.try_acquire().is_none());

        token.free();
        assert!(token.try_acquire().is_some());
    }

    #[test]
    fn test_free_is_idempotent() {
        let token = EvalToken::new();
        token.free();
        token.free();
        let _first = token.try_acquire().expect("available");
        // A double free must not have filled a second slot.
        assert!(token.try_acquire().is_none());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let token = std::sync::Arc::new(EvalToken::new());
        token.try_acquire().expect("acquire").detach();

        let waiter = {
            let token = std::sync::Arc::clone(&token);
            tokio::spawn(async move {
                let guard = token.acquire().await;
                guard.detach();
            })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        token.free();
        waiter.await.unwrap();
        assert!(token.is_held());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_timeout_gives_up() {
        let token = EvalToken::new();
        let _held = token.try_acquire().expect("acquire");
        let attempt = token.acquire_timeout(Duration::from_millis(50)).await;
        assert!(attempt.is_none());
    }
}
