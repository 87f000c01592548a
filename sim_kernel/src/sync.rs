//! Lock helpers

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a mutex, recovering the guard if a previous holder panicked
///
/// Every critical section in the kernel leaves its data consistent before
/// calling anything that could panic, so a poisoned lock still protects
/// valid state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
