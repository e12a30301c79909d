// src/backend/mod.rs
//
// One contract, two OS facilities: level-triggered epoll on Linux and
// edge-triggered kqueue on macOS. Both speak the same normalized event
// vocabulary so the loop and the sweep never see platform bits.
use std::os::fd::RawFd;
use std::time::Duration;

use crate::error::NocturneResult;

#[cfg(target_os = "linux")]
mod epoll;
#[cfg(target_os = "linux")]
pub use epoll::EpollBackend;

#[cfg(target_os = "macos")]
mod kqueue;
#[cfg(target_os = "macos")]
pub use kqueue::KqueueBackend;

#[cfg(target_os = "linux")]
pub type DefaultBackend = EpollBackend;
#[cfg(target_os = "macos")]
pub type DefaultBackend = KqueueBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// Normalized readiness flags.
pub const READY_READ: u8 = 1 << 0;
pub const READY_WRITE: u8 = 1 << 1;
pub const READY_ERROR: u8 = 1 << 2;
pub const READY_HANGUP: u8 = 1 << 3;

#[derive(Debug, Clone, Copy)]
pub struct ReadyEvent {
    pub fd: RawFd,
    pub flags: u8,
}

/// Result buffer of one wait call, reused across iterations. Holds at most
/// `capacity` events; the sweep queries it for the previous tick's readiness.
pub struct ReadyList {
    events: Vec<ReadyEvent>,
    capacity: usize,
}

impl ReadyList {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn push(&mut self, fd: RawFd, flags: u8) {
        if self.events.len() < self.capacity {
            self.events.push(ReadyEvent { fd, flags });
        }
    }

    /// Membership query: did the last wait report `fd` actionable for `dir`?
    ///
    /// Bitwise superset match: auxiliary condition bits alongside the
    /// expected direction still count, and error/hangup conditions match
    /// either direction so the owner can observe the failure on its next
    /// I/O attempt instead of stalling.
    pub fn is_ready(&self, fd: RawFd, dir: Direction) -> bool {
        let want = match dir {
            Direction::Read => READY_READ,
            Direction::Write => READY_WRITE,
        } | READY_ERROR
            | READY_HANGUP;
        self.events.iter().any(|ev| ev.fd == fd && ev.flags & want != 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// Events (possibly none) were collected.
    Complete,
    /// The wait was interrupted by a signal; retry the iteration from the top.
    Interrupted,
    /// A watched descriptor vanished mid-wait; proceed with partial results,
    /// the owning connection self-corrects or gets reaped by the sweep.
    Stale,
}

/// Contract every readiness backend satisfies. Construction is per-facility
/// (`EpollBackend::new`, `KqueueBackend::new`) and its failure is fatal.
pub trait ReadinessBackend {
    /// (Re-)register interest. Replaces any existing registration for the
    /// descriptor; interests are never accumulated.
    fn watch(&mut self, fd: RawFd, dir: Direction) -> NocturneResult<()>;

    /// Drop all interest for a descriptor. Unknown descriptors are a no-op.
    fn unwatch(&mut self, fd: RawFd) -> NocturneResult<()>;

    /// Block up to `timeout` for at most `out.capacity()` events. Any error
    /// other than the two tolerated statuses surfaces as `Err` and is fatal.
    fn wait(&mut self, out: &mut ReadyList, timeout: Duration) -> NocturneResult<WaitStatus>;
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::error::NocturneError;
    use std::collections::VecDeque;
    use std::io;

    pub(crate) enum ScriptedWait {
        Ready(Vec<(RawFd, u8)>),
        Interrupted,
        Stale(Vec<(RawFd, u8)>),
        Fail,
    }

    /// Scripted backend for sweep and driver tests.
    pub(crate) struct MockBackend {
        pub watches: Vec<(RawFd, Direction)>,
        pub unwatches: Vec<RawFd>,
        pub script: VecDeque<ScriptedWait>,
        pub waits: usize,
    }

    impl MockBackend {
        pub(crate) fn new(script: Vec<ScriptedWait>) -> Self {
            Self {
                watches: Vec::new(),
                unwatches: Vec::new(),
                script: script.into(),
                waits: 0,
            }
        }
    }

    impl ReadinessBackend for MockBackend {
        fn watch(&mut self, fd: RawFd, dir: Direction) -> NocturneResult<()> {
            self.watches.push((fd, dir));
            Ok(())
        }

        fn unwatch(&mut self, fd: RawFd) -> NocturneResult<()> {
            self.unwatches.push(fd);
            Ok(())
        }

        fn wait(&mut self, out: &mut ReadyList, _timeout: Duration) -> NocturneResult<WaitStatus> {
            self.waits += 1;
            out.clear();
            match self.script.pop_front() {
                Some(ScriptedWait::Ready(events)) => {
                    for (fd, flags) in events {
                        out.push(fd, flags);
                    }
                    Ok(WaitStatus::Complete)
                }
                Some(ScriptedWait::Interrupted) => Ok(WaitStatus::Interrupted),
                Some(ScriptedWait::Stale(events)) => {
                    for (fd, flags) in events {
                        out.push(fd, flags);
                    }
                    Ok(WaitStatus::Stale)
                }
                Some(ScriptedWait::Fail) => Err(NocturneError::Backend {
                    op: "mock_wait",
                    source: io::Error::other("scripted failure"),
                }),
                // Script exhausted: keep reporting quiet completions.
                None => Ok(WaitStatus::Complete),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_ready_matches_superset_flags() {
        let mut list = ReadyList::with_capacity(4);
        list.push(3, READY_READ | READY_HANGUP);
        list.push(4, READY_WRITE);

        assert!(list.is_ready(3, Direction::Read));
        // Hangup alongside the read bit still matches a write query.
        assert!(list.is_ready(3, Direction::Write));
        assert!(list.is_ready(4, Direction::Write));
        assert!(!list.is_ready(4, Direction::Read));
        assert!(!list.is_ready(5, Direction::Read));
    }

    #[test]
    fn error_only_event_matches_either_direction() {
        let mut list = ReadyList::with_capacity(4);
        list.push(9, READY_ERROR);
        assert!(list.is_ready(9, Direction::Read));
        assert!(list.is_ready(9, Direction::Write));
    }

    #[test]
    fn capacity_caps_recorded_events() {
        let mut list = ReadyList::with_capacity(2);
        list.push(1, READY_READ);
        list.push(2, READY_READ);
        list.push(3, READY_READ);
        assert_eq!(list.len(), 2);
        assert!(!list.is_ready(3, Direction::Read));
    }
}
