//! Call-chain guard around the orchestrator's pipeline state.
//!
//! The pipeline state lives behind a mutex. Entering records the calling
//! thread as the owner once the lock is held, and release happens in `Drop`,
//! so every exit path (early return, `?`, panic unwind) clears it.
//!
//! A thread that already owns the guard is inside a collaborator callback of
//! its own call chain: it is refused with [`EnterError::Nested`] instead of
//! deadlocking on its own lock. Other threads wait for the lock and run after
//! the current holder finishes.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Owner value while nobody holds the guard.
pub const NO_OWNER: u64 = 0;

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(NO_OWNER + 1);

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
}

/// Process-unique, never `NO_OWNER`.
fn current_thread_token() -> u64 {
    THREAD_TOKEN.with(|token| *token)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterError {
    /// The calling thread already holds the guard.
    Nested,
    /// A previous holder panicked while holding the state.
    Poisoned,
}

/// Exclusive access to `T` for one call chain.
pub struct InProgressGuard<'a, T> {
    owner: &'a AtomicU64,
    state: MutexGuard<'a, T>,
}

impl<'a, T> InProgressGuard<'a, T> {
    /// Take the state for the calling thread, waiting for other threads.
    ///
    /// Never blocks when the calling thread is already the owner.
    pub fn enter(owner: &'a AtomicU64, state: &'a Mutex<T>) -> Result<Self, EnterError> {
        let token = current_thread_token();
        // Only this thread ever stores its own token, so a match means the
        // call is nested inside a call this thread is still running.
        if owner.load(Ordering::Acquire) == token {
            return Err(EnterError::Nested);
        }
        let state = state.lock().map_err(|_| EnterError::Poisoned)?;
        owner.store(token, Ordering::Release);
        Ok(Self { owner, state })
    }
}

impl<T> Deref for InProgressGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.state
    }
}

impl<T> DerefMut for InProgressGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.state
    }
}

impl<T> Drop for InProgressGuard<'_, T> {
    // Runs before the `MutexGuard` field is dropped, so the owner is cleared
    // while the lock is still held.
    fn drop(&mut self) {
        self.owner.store(NO_OWNER, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_nested_enter_on_same_thread_rejected() {
        let owner = AtomicU64::new(NO_OWNER);
        let state = Mutex::new(0u32);

        let guard = InProgressGuard::enter(&owner, &state).unwrap();
        assert!(matches!(
            InProgressGuard::enter(&owner, &state),
            Err(EnterError::Nested)
        ));
        drop(guard);

        assert!(InProgressGuard::enter(&owner, &state).is_ok());
        assert_eq!(owner.load(Ordering::Acquire), NO_OWNER);
    }

    #[test]
    fn test_other_thread_waits_for_release() {
        let owner = Arc::new(AtomicU64::new(NO_OWNER));
        let state = Arc::new(Mutex::new(0u32));

        let mut guard = InProgressGuard::enter(&owner, &state).unwrap();
        *guard += 1;

        let waiter = {
            let owner = Arc::clone(&owner);
            let state = Arc::clone(&state);
            thread::spawn(move || {
                let mut guard = InProgressGuard::enter(&owner, &state).unwrap();
                *guard += 10;
                *guard
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());
        drop(guard);

        assert_eq!(waiter.join().unwrap(), 11);
    }

    #[test]
    fn test_released_on_early_return() {
        fn fails(owner: &AtomicU64, state: &Mutex<u32>) -> Result<(), EnterError> {
            let _guard = InProgressGuard::enter(owner, state)?;
            Err(EnterError::Nested)
        }

        let owner = AtomicU64::new(NO_OWNER);
        let state = Mutex::new(0u32);
        assert!(fails(&owner, &state).is_err());
        assert_eq!(owner.load(Ordering::Acquire), NO_OWNER);
        assert!(InProgressGuard::enter(&owner, &state).is_ok());
    }

    #[test]
    fn test_panic_clears_owner_and_poisons_state() {
        let owner = AtomicU64::new(NO_OWNER);
        let state = Mutex::new(0u32);

        let result = std::panic::catch_unwind(|| {
            let _guard = InProgressGuard::enter(&owner, &state);
            panic!("collaborator blew up");
        });

        assert!(result.is_err());
        assert_eq!(owner.load(Ordering::Acquire), NO_OWNER);
        assert!(matches!(
            InProgressGuard::enter(&owner, &state),
            Err(EnterError::Poisoned)
        ));
    }
}
