//! Lifecycle guards

use std::sync::atomic::{AtomicBool, Ordering};

use super::state::SharedState;

/// Marks a connect attempt as in progress for as long as it lives.
///
/// Acquisition fails while another attempt holds the flag. The flag is
/// released on drop, so every exit path of the attempt clears it.
pub(crate) struct ConnectGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ConnectGuard<'a> {
    pub(crate) fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Resets the published state to `Disconnected` when dropped while armed.
///
/// Lifecycle operations hold one across their await points so that a caller
/// dropping the future mid-join or mid-leave cannot strand the manager in
/// `Connecting` or `Connected` without a call handle.
pub(crate) struct ResetOnDrop<'a> {
    shared: &'a SharedState,
    armed: bool,
}

impl<'a> ResetOnDrop<'a> {
    pub(crate) fn new(shared: &'a SharedState) -> Self {
        Self { shared, armed: true }
    }

    /// Keep the current state
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.reset_disconnected();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConnectionState;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let flag = AtomicBool::new(false);
        let guard = ConnectGuard::try_acquire(&flag);
        assert!(guard.is_some());
        assert!(ConnectGuard::try_acquire(&flag).is_none());
        // A failed acquire must not clear the holder's flag
        assert!(flag.load(Ordering::Acquire));

        drop(guard);
        assert!(!flag.load(Ordering::Acquire));
        assert!(ConnectGuard::try_acquire(&flag).is_some());
    }

    #[test]
    fn test_released_on_early_return() {
        fn attempt(flag: &AtomicBool) -> Result<(), &'static str> {
            let _guard = ConnectGuard::try_acquire(flag).ok_or("busy")?;
            Err("join failed")
        }

        let flag = AtomicBool::new(false);
        assert_eq!(attempt(&flag), Err("join failed"));
        assert!(!flag.load(Ordering::Acquire));
    }

    #[test]
    fn test_reset_unless_disarmed() {
        let shared = SharedState::new(8);
        shared.set_state(ConnectionState::Connecting);
        drop(ResetOnDrop::new(&shared));
        assert_eq!(shared.state(), ConnectionState::Disconnected);

        shared.set_state(ConnectionState::Connected);
        ResetOnDrop::new(&shared).disarm();
        assert_eq!(shared.state(), ConnectionState::Connected);
    }
}
