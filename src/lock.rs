use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering from poisoning. The shared state here (position
/// tracker, mic profile, connection) stays consistent across panics because
/// writers replace values wholesale.
pub(crate) fn lock_or_recover<'a, T>(lock: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        crate::log_debug(&format!("Recovered poisoned lock ({context})"));
        poisoned.into_inner()
    })
}
