// src/syscalls.rs
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::ptr;

use libc::{c_int, c_void, socklen_t};

use crate::error::NocturneResult;

/// Create a non-blocking TCP listening socket with SO_REUSEADDR.
pub fn create_listen_socket(host: &str, port: u16) -> NocturneResult<RawFd> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let domain = match addr {
        SocketAddr::V4(_) => libc::AF_INET,
        SocketAddr::V6(_) => libc::AF_INET6,
    };

    unsafe {
        let fd = libc::socket(domain, libc::SOCK_STREAM, 0);
        if fd < 0 {
            return Err(io::Error::last_os_error().into());
        }

        let one: c_int = 1;
        if libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &one as *const _ as *const c_void,
            mem::size_of_val(&one) as socklen_t,
        ) < 0
        {
            return Err(close_on_error(fd));
        }

        if set_nonblocking(fd) < 0 {
            return Err(close_on_error(fd));
        }

        bind_addr(fd, &addr)?;

        if libc::listen(fd, libc::SOMAXCONN) < 0 {
            return Err(close_on_error(fd));
        }
        Ok(fd)
    }
}

unsafe fn close_on_error(fd: c_int) -> crate::error::NocturneError {
    let err = io::Error::last_os_error();
    unsafe {
        libc::close(fd);
    }
    err.into()
}

fn set_nonblocking(fd: c_int) -> c_int {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        if flags < 0 {
            return flags;
        }
        libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK)
    }
}

fn bind_addr(fd: c_int, addr: &SocketAddr) -> NocturneResult<()> {
    unsafe {
        let res = match addr {
            SocketAddr::V4(a) => {
                let mut sin: libc::sockaddr_in = mem::zeroed();
                sin.sin_family = libc::AF_INET as libc::sa_family_t;
                sin.sin_port = a.port().to_be();
                sin.sin_addr = libc::in_addr {
                    s_addr: u32::from_ne_bytes(a.ip().octets()),
                };
                libc::bind(
                    fd,
                    &sin as *const _ as *const libc::sockaddr,
                    mem::size_of_val(&sin) as socklen_t,
                )
            }
            SocketAddr::V6(a) => {
                let mut sin6: libc::sockaddr_in6 = mem::zeroed();
                sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
                sin6.sin6_port = a.port().to_be();
                sin6.sin6_addr = libc::in6_addr {
                    s6_addr: a.ip().octets(),
                };
                sin6.sin6_scope_id = a.scope_id();
                libc::bind(
                    fd,
                    &sin6 as *const _ as *const libc::sockaddr,
                    mem::size_of_val(&sin6) as socklen_t,
                )
            }
        };
        if res < 0 {
            return Err(close_on_error(fd));
        }
        Ok(())
    }
}

/// Accept a connection; the returned socket is non-blocking.
/// `Ok(None)` when no connection is pending.
pub fn accept_connection(listen_fd: RawFd) -> NocturneResult<Option<RawFd>> {
    unsafe {
        let fd = libc::accept(listen_fd, ptr::null_mut(), ptr::null_mut());
        if fd < 0 {
            let err = io::Error::last_os_error();
            return if err.kind() == io::ErrorKind::WouldBlock {
                Ok(None)
            } else {
                Err(err.into())
            };
        }
        if set_nonblocking(fd) < 0 {
            return Err(close_on_error(fd));
        }
        Ok(Some(fd))
    }
}

/// Non-blocking read. `Ok(None)` when the descriptor is not ready;
/// `Ok(Some(0))` is EOF.
pub fn read_nonblocking(fd: RawFd, buf: &mut [u8]) -> NocturneResult<Option<usize>> {
    unsafe {
        let res = libc::read(fd, buf.as_mut_ptr() as *mut c_void, buf.len());
        if res < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                Ok(None)
            } else {
                Err(err.into())
            }
        } else {
            Ok(Some(res as usize))
        }
    }
}

/// Non-blocking write. `Ok(None)` when the descriptor is not ready.
pub fn write_nonblocking(fd: RawFd, buf: &[u8]) -> NocturneResult<Option<usize>> {
    unsafe {
        let res = libc::write(fd, buf.as_ptr() as *const c_void, buf.len());
        if res < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                Ok(None)
            } else {
                Err(err.into())
            }
        } else {
            Ok(Some(res as usize))
        }
    }
}

/// Create a Unix pipe with a non-blocking read end. Returns (read_fd, write_fd).
pub fn create_pipe() -> NocturneResult<(RawFd, RawFd)> {
    let mut fds = [0 as c_int; 2];
    unsafe {
        if libc::pipe(fds.as_mut_ptr()) < 0 {
            return Err(io::Error::last_os_error().into());
        }
        if set_nonblocking(fds[0]) < 0 {
            let err = io::Error::last_os_error();
            libc::close(fds[0]);
            libc::close(fds[1]);
            return Err(err.into());
        }
    }
    Ok((fds[0], fds[1]))
}

/// Close a descriptor, ignoring errors (teardown path).
pub fn close_fd(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_round_trip() {
        let (rd, wr) = create_pipe().unwrap();

        let mut buf = [0u8; 8];
        // Nothing written yet: the non-blocking read end reports not-ready.
        assert_eq!(read_nonblocking(rd, &mut buf).unwrap(), None);

        assert_eq!(write_nonblocking(wr, b"ok").unwrap(), Some(2));
        assert_eq!(read_nonblocking(rd, &mut buf).unwrap(), Some(2));
        assert_eq!(&buf[..2], b"ok");

        // Writer closed: EOF.
        close_fd(wr);
        assert_eq!(read_nonblocking(rd, &mut buf).unwrap(), Some(0));
        close_fd(rd);
    }

    #[test]
    fn listener_accept_reports_not_ready_when_idle() {
        let fd = create_listen_socket("127.0.0.1", 0).unwrap();
        assert_eq!(accept_connection(fd).unwrap(), None);
        close_fd(fd);
    }
}
