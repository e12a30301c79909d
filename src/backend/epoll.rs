// src/backend/epoll.rs
//
// Level-triggered epoll adapter. Readiness persists until the condition is
// drained, so the sweep's re-register-and-scan flow needs no re-arming
// beyond the idempotent add below.
use std::io;
use std::os::fd::RawFd;
use std::ptr;
use std::time::Duration;

use libc::c_int;

use super::{
    Direction, READY_ERROR, READY_HANGUP, READY_READ, READY_WRITE, ReadinessBackend, ReadyList,
    WaitStatus,
};
use crate::error::{NocturneError, NocturneResult};

pub struct EpollBackend {
    epfd: c_int,
    buf: Vec<libc::epoll_event>,
}

impl EpollBackend {
    /// Create the epoll instance. Failure here is fatal to the caller; the
    /// loop has no fallback facility.
    pub fn new() -> NocturneResult<Self> {
        let epfd = unsafe { libc::epoll_create1(0) };
        if epfd < 0 {
            return Err(NocturneError::Backend {
                op: "epoll_create1",
                source: io::Error::last_os_error(),
            });
        }
        Ok(Self {
            epfd,
            buf: Vec::new(),
        })
    }

    fn interest_bits(dir: Direction) -> u32 {
        match dir {
            Direction::Read => libc::EPOLLIN as u32,
            Direction::Write => libc::EPOLLOUT as u32,
        }
    }
}

impl ReadinessBackend for EpollBackend {
    fn watch(&mut self, fd: RawFd, dir: Direction) -> NocturneResult<()> {
        let mut event = libc::epoll_event {
            events: Self::interest_bits(dir),
            u64: fd as u64,
        };

        // Idempotent add: a descriptor already registered gets its interest
        // replaced via MOD, never duplicated.
        let res = unsafe { libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_ADD, fd, &mut event) };
        if res < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EEXIST) {
                return Err(NocturneError::Backend {
                    op: "epoll_ctl_add",
                    source: err,
                });
            }
            let res = unsafe { libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_MOD, fd, &mut event) };
            if res < 0 {
                return Err(NocturneError::Backend {
                    op: "epoll_ctl_mod",
                    source: io::Error::last_os_error(),
                });
            }
        }
        Ok(())
    }

    fn unwatch(&mut self, fd: RawFd) -> NocturneResult<()> {
        let res = unsafe { libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_DEL, fd, ptr::null_mut()) };
        if res < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOENT) {
                return Err(NocturneError::Backend {
                    op: "epoll_ctl_del",
                    source: err,
                });
            }
        }
        Ok(())
    }

    fn wait(&mut self, out: &mut ReadyList, timeout: Duration) -> NocturneResult<WaitStatus> {
        out.clear();
        if self.buf.len() < out.capacity() {
            self.buf
                .resize(out.capacity(), libc::epoll_event { events: 0, u64: 0 });
        }

        let timeout_ms = timeout.as_millis().min(c_int::MAX as u128) as c_int;
        let res = unsafe {
            libc::epoll_wait(
                self.epfd,
                self.buf.as_mut_ptr(),
                out.capacity() as c_int,
                timeout_ms,
            )
        };

        if res < 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::EINTR) => Ok(WaitStatus::Interrupted),
                Some(libc::EBADF) => Ok(WaitStatus::Stale),
                _ => Err(NocturneError::Backend {
                    op: "epoll_wait",
                    source: err,
                }),
            };
        }

        for ev in &self.buf[..res as usize] {
            let mut flags = 0u8;
            if ev.events & libc::EPOLLIN as u32 != 0 {
                flags |= READY_READ;
            }
            if ev.events & libc::EPOLLOUT as u32 != 0 {
                flags |= READY_WRITE;
            }
            if ev.events & libc::EPOLLERR as u32 != 0 {
                flags |= READY_ERROR;
            }
            if ev.events & (libc::EPOLLHUP as u32 | libc::EPOLLRDHUP as u32) != 0 {
                flags |= READY_HANGUP;
            }
            out.push(ev.u64 as RawFd, flags);
        }
        Ok(WaitStatus::Complete)
    }
}

impl Drop for EpollBackend {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epfd);
        }
    }
}
