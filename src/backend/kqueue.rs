// src/backend/kqueue.rs
//
// Edge-triggered kqueue adapter. kqueue registers per (ident, filter), so a
// direction change must delete the old filter before adding the new one —
// otherwise both filters stay live and the "exactly one registration per
// descriptor" rule breaks.
use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::ptr;
use std::time::Duration;

use libc::{c_int, c_void};

use super::{
    Direction, READY_ERROR, READY_HANGUP, READY_READ, READY_WRITE, ReadinessBackend, ReadyList,
    WaitStatus,
};
use crate::error::{NocturneError, NocturneResult};

pub struct KqueueBackend {
    kq: c_int,
    registered: HashMap<RawFd, Direction>,
    buf: Vec<libc::kevent>,
}

impl KqueueBackend {
    /// Create the kqueue instance. Failure here is fatal to the caller.
    pub fn new() -> NocturneResult<Self> {
        let kq = unsafe { libc::kqueue() };
        if kq < 0 {
            return Err(NocturneError::Backend {
                op: "kqueue",
                source: io::Error::last_os_error(),
            });
        }
        Ok(Self {
            kq,
            registered: HashMap::new(),
            buf: Vec::new(),
        })
    }

    fn filter_for(dir: Direction) -> i16 {
        match dir {
            Direction::Read => libc::EVFILT_READ,
            Direction::Write => libc::EVFILT_WRITE,
        }
    }

    fn change(&self, fd: RawFd, filter: i16, action: u16) -> c_int {
        let change = libc::kevent {
            ident: fd as usize,
            filter,
            flags: action,
            fflags: 0,
            data: 0,
            udata: ptr::null_mut::<c_void>(),
        };
        unsafe { libc::kevent(self.kq, &change, 1, ptr::null_mut(), 0, ptr::null()) }
    }
}

impl ReadinessBackend for KqueueBackend {
    fn watch(&mut self, fd: RawFd, dir: Direction) -> NocturneResult<()> {
        // Replace, never accumulate: drop the stale filter on a direction
        // change before arming the new one.
        if let Some(prev) = self.registered.get(&fd).copied() {
            if prev != dir {
                self.change(fd, Self::filter_for(prev), libc::EV_DELETE);
            }
        }

        let res = self.change(
            fd,
            Self::filter_for(dir),
            libc::EV_ADD | libc::EV_ENABLE | libc::EV_CLEAR,
        );
        if res < 0 {
            return Err(NocturneError::Backend {
                op: "kevent_add",
                source: io::Error::last_os_error(),
            });
        }
        self.registered.insert(fd, dir);
        Ok(())
    }

    fn unwatch(&mut self, fd: RawFd) -> NocturneResult<()> {
        // Deleting filters that were never added fails with ENOENT; both
        // directions are attempted and failures ignored, like the delete
        // path of the epoll adapter.
        self.change(fd, libc::EVFILT_READ, libc::EV_DELETE);
        self.change(fd, libc::EVFILT_WRITE, libc::EV_DELETE);
        self.registered.remove(&fd);
        Ok(())
    }

    fn wait(&mut self, out: &mut ReadyList, timeout: Duration) -> NocturneResult<WaitStatus> {
        out.clear();
        if self.buf.len() < out.capacity() {
            self.buf.resize(out.capacity(), libc::kevent {
                ident: 0,
                filter: 0,
                flags: 0,
                fflags: 0,
                data: 0,
                udata: ptr::null_mut::<c_void>(),
            });
        }

        let ts = libc::timespec {
            tv_sec: timeout.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
            tv_nsec: timeout.subsec_nanos() as libc::c_long,
        };
        let res = unsafe {
            libc::kevent(
                self.kq,
                ptr::null(),
                0,
                self.buf.as_mut_ptr(),
                out.capacity() as c_int,
                &ts,
            )
        };

        if res < 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::EINTR) => Ok(WaitStatus::Interrupted),
                Some(libc::EBADF) => Ok(WaitStatus::Stale),
                _ => Err(NocturneError::Backend {
                    op: "kevent_wait",
                    source: err,
                }),
            };
        }

        for ev in &self.buf[..res as usize] {
            let mut flags = 0u8;
            if ev.filter == libc::EVFILT_READ {
                flags |= READY_READ;
            }
            if ev.filter == libc::EVFILT_WRITE {
                flags |= READY_WRITE;
            }
            if ev.flags & libc::EV_ERROR != 0 {
                flags |= READY_ERROR;
            }
            if ev.flags & libc::EV_EOF != 0 {
                flags |= READY_HANGUP;
            }
            out.push(ev.ident as RawFd, flags);
        }
        Ok(WaitStatus::Complete)
    }
}

impl Drop for KqueueBackend {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.kq);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscalls::create_pipe;

    fn wait_once(backend: &mut KqueueBackend, ms: u64) -> ReadyList {
        let mut out = ReadyList::with_capacity(16);
        let status = backend.wait(&mut out, Duration::from_millis(ms)).unwrap();
        assert_eq!(status, WaitStatus::Complete);
        out
    }

    #[test]
    fn pipe_read_end_becomes_ready_after_write() {
        let mut backend = KqueueBackend::new().unwrap();
        let (rd, wr) = create_pipe().unwrap();

        backend.watch(rd, Direction::Read).unwrap();
        let quiet = wait_once(&mut backend, 0);
        assert!(!quiet.is_ready(rd, Direction::Read));

        unsafe {
            libc::write(wr, b"x".as_ptr() as *const libc::c_void, 1);
        }
        let ready = wait_once(&mut backend, 1000);
        assert!(ready.is_ready(rd, Direction::Read));

        unsafe {
            libc::close(rd);
            libc::close(wr);
        }
    }

    #[test]
    fn direction_change_replaces_the_old_filter() {
        let mut backend = KqueueBackend::new().unwrap();
        let (rd, wr) = create_pipe().unwrap();

        backend.watch(wr, Direction::Read).unwrap();
        backend.watch(wr, Direction::Write).unwrap();
        assert_eq!(backend.registered.get(&wr), Some(&Direction::Write));

        // A fresh pipe write end is immediately writable.
        let ready = wait_once(&mut backend, 1000);
        assert!(ready.is_ready(wr, Direction::Write));

        unsafe {
            libc::close(rd);
            libc::close(wr);
        }
    }

    #[test]
    fn unwatch_is_tolerant_and_forgets_the_descriptor() {
        let mut backend = KqueueBackend::new().unwrap();
        let (rd, wr) = create_pipe().unwrap();

        backend.watch(rd, Direction::Read).unwrap();
        backend.unwatch(rd).unwrap();
        backend.unwatch(rd).unwrap();
        assert!(!backend.registered.contains_key(&rd));

        unsafe {
            libc::close(rd);
            libc::close(wr);
        }
    }
}
