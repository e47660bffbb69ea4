//! Two-state re-entrancy guard for settlement entry points.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::ErrorKind;

const IDLE: u8 = 0;
const EXECUTING: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Idle,
    Executing,
}

/// Busy flag set on entry and cleared on exit. Entering while already
/// `Executing` fails fast with [`ErrorKind::Reentrant`].
#[derive(Debug, Default)]
pub struct ExecutionGuard(AtomicU8);

impl ExecutionGuard {
    pub fn new() -> Self {
        Self(AtomicU8::new(IDLE))
    }

    pub fn enter(&self) -> Result<GuardTicket<'_>, ErrorKind> {
        self.0
            .compare_exchange(IDLE, EXECUTING, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ErrorKind::Reentrant)?;
        Ok(GuardTicket(self))
    }

    pub fn state(&self) -> GuardState {
        match self.0.load(Ordering::Acquire) {
            IDLE => GuardState::Idle,
            _ => GuardState::Executing,
        }
    }
}

/// Returns the guard to `Idle` when dropped, including on early return.
#[derive(Debug)]
pub struct GuardTicket<'a>(&'a ExecutionGuard);

impl Drop for GuardTicket<'_> {
    fn drop(&mut self) {
        self.0 .0.store(IDLE, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_entry_fails() {
        let guard = ExecutionGuard::new();
        let ticket = guard.enter().unwrap();
        assert_eq!(guard.state(), GuardState::Executing);
        assert_eq!(guard.enter().unwrap_err(), ErrorKind::Reentrant);
        drop(ticket);
        assert_eq!(guard.state(), GuardState::Idle);
        assert!(guard.enter().is_ok());
    }

    #[test]
    fn released_on_early_return() {
        fn fails(guard: &ExecutionGuard) -> Result<(), ErrorKind> {
            let _ticket = guard.enter()?;
            Err(ErrorKind::ExecutionFailed)
        }
        let guard = ExecutionGuard::new();
        assert_eq!(fails(&guard), Err(ErrorKind::ExecutionFailed));
        assert_eq!(guard.state(), GuardState::Idle);
    }
}
