// src/signals.rs
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::error::{NocturneError, NocturneResult};

/// Termination stages. Stage 1 stops admission; stage 2 (entered by the
/// driver once stage-1 actions ran) permits final teardown when both
/// connection sets have drained.
pub const TERM_NONE: u8 = 0;
pub const TERM_STAGE1: u8 = 1;
pub const TERM_STAGE2: u8 = 2;

/// Deferred-signal flags. Raisers are async-signal handlers installed by the
/// embedder; the loop only consumes the flags at the top of each iteration,
/// never inside the wait.
#[derive(Debug, Default)]
pub struct SignalFlags {
    hangup: AtomicBool,
    child: AtomicBool,
    alarm: AtomicBool,
    terminate: AtomicU8,
}

impl SignalFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise_hangup(&self) {
        self.hangup.store(true, Ordering::Release);
    }

    pub fn raise_child(&self) {
        self.child.store(true, Ordering::Release);
    }

    pub fn raise_alarm(&self) {
        self.alarm.store(true, Ordering::Release);
    }

    /// Request graceful shutdown. Only effective once; later raises while a
    /// shutdown is already staged are ignored.
    pub fn raise_terminate(&self) {
        let _ = self.terminate.compare_exchange(
            TERM_NONE,
            TERM_STAGE1,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn take_hangup(&self) -> bool {
        self.hangup.swap(false, Ordering::AcqRel)
    }

    pub fn take_child(&self) -> bool {
        self.child.swap(false, Ordering::AcqRel)
    }

    pub fn take_alarm(&self) -> bool {
        self.alarm.swap(false, Ordering::AcqRel)
    }

    pub fn terminate_stage(&self) -> u8 {
        self.terminate.load(Ordering::Acquire)
    }

    /// Driver-side transition after stage-1 actions have run.
    pub fn advance_terminate(&self) {
        self.terminate.store(TERM_STAGE2, Ordering::Release);
    }

    /// Wire Ctrl-C / SIGTERM to terminate stage 1 for graceful shutdown.
    pub fn install_terminate_handler(self: &Arc<Self>) -> NocturneResult<()> {
        let flags = Arc::clone(self);
        ctrlc::set_handler(move || flags.raise_terminate())
            .map_err(|e| NocturneError::Other(format!("ctrlc handler: {}", e)))
    }
}
