// src/conn.rs
use std::os::fd::RawFd;

/// Which of a connection's descriptors a watch targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdRole {
    /// The client socket itself.
    Client,
    /// Side-channel read descriptor (e.g. a generated-content pipe).
    PipeIn,
    /// Side-channel write descriptor (e.g. a downstream body consumer).
    PipeOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnState {
    Reading = 0,
    Writing = 1,
    PipeWriting = 2,
    BodyWriting = 3,
    PipeReading = 4,
    Done = 5,
    Dead = 6,
}

impl Default for ConnState {
    fn default() -> Self {
        ConnState::Reading
    }
}

/// Per-connection record driven through the loop. The request processor owns
/// the buffered I/O; the engine only tracks what it must watch and when it
/// must give up.
#[derive(Debug, Clone)]
pub struct Conn {
    pub fd: RawFd,          // client socket
    pub pipe_in_fd: RawFd,  // -1 when absent
    pub pipe_out_fd: RawFd, // -1 when absent
    pub state: ConnState,
    /// Previously buffered output bytes remain unflushed.
    pub output_pending: bool,
    /// Unix seconds of last observed I/O activity.
    pub last_active: u64,
    /// Keepalive reuses already granted.
    pub keepalive_count: u32,
    /// True once any byte of a next request has been read.
    pub has_request_line: bool,
}

impl Conn {
    pub fn new(fd: RawFd) -> Self {
        Self {
            fd,
            pipe_in_fd: -1,
            pipe_out_fd: -1,
            state: ConnState::Reading,
            output_pending: false,
            last_active: 0,
            keepalive_count: 0,
            has_request_line: false,
        }
    }

    /// Resolve a watch role to the concrete descriptor.
    pub fn role_fd(&self, role: FdRole) -> RawFd {
        match role {
            FdRole::Client => self.fd,
            FdRole::PipeIn => self.pipe_in_fd,
            FdRole::PipeOut => self.pipe_out_fd,
        }
    }
}
