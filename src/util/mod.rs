//! Utility modules: retry, busy flag, clock.

pub mod clock;
pub mod flag;
pub mod retry;
