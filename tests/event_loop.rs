// tests/event_loop.rs
//
// End-to-end: a real listener, a real client, the platform backend. The
// handler accepts, reads one payload, tears the connection down and requests
// graceful shutdown; the loop must exit via stage-2.
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::os::fd::{IntoRawFd, RawFd};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nocturne::{
    Conn, ConnState, DefaultBackend, EventLoop, LoopConfig, LoopContext, Membership,
    NocturneResult, RequestHandler, SignalFlags, syscalls,
};

struct OneShotHandler {
    signals: Arc<SignalFlags>,
    received: Vec<u8>,
}

impl OneShotHandler {
    fn teardown(&mut self, ctx: &mut LoopContext, idx: usize, fd: RawFd) {
        ctx.table.remove(idx);
        syscalls::close_fd(fd);
        self.signals.raise_terminate();
    }
}

impl RequestHandler for OneShotHandler {
    fn process_requests(&mut self, server_fd: RawFd, ctx: &mut LoopContext) -> NocturneResult<()> {
        if ctx.take_pending_accept() {
            while let Some(fd) = syscalls::accept_connection(server_fd)? {
                let mut conn = Conn::new(fd);
                conn.last_active = ctx.now;
                conn.state = ConnState::Reading;
                assert!(ctx.table.insert(conn, Membership::Blocked).is_some());
            }
        }

        for idx in ctx.table.ready_indices() {
            let Some((fd, state)) = ctx.table.get(idx).map(|c| (c.fd, c.state)) else {
                continue;
            };
            if state == ConnState::Dead {
                self.teardown(ctx, idx, fd);
                continue;
            }
            let mut buf = [0u8; 256];
            match syscalls::read_nonblocking(fd, &mut buf)? {
                // Not actually readable yet: back to the blocked set.
                None => ctx.table.block_request(idx),
                Some(n) => {
                    self.received.extend_from_slice(&buf[..n]);
                    self.teardown(ctx, idx, fd);
                }
            }
        }
        Ok(())
    }

    fn log_error_doc(&mut self, _conn: &Conn) {}
}

#[test]
fn loop_accepts_reads_and_shuts_down() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    let server_fd = listener.into_raw_fd();

    let signals = Arc::new(SignalFlags::new());
    let handler = OneShotHandler {
        signals: Arc::clone(&signals),
        received: Vec::new(),
    };

    let client = thread::spawn(move || {
        let mut stream = loop {
            match TcpStream::connect(addr) {
                Ok(s) => break s,
                Err(_) => thread::sleep(Duration::from_millis(10)),
            }
        };
        stream.write_all(b"ping").unwrap();
        // Hold the socket open so the loop observes data, not just EOF.
        thread::sleep(Duration::from_millis(200));
    });

    let cfg = LoopConfig {
        keepalive_timeout_secs: 1,
        request_timeout_secs: 2,
        ..LoopConfig::default()
    };
    let backend = DefaultBackend::new().unwrap();
    let mut lp = EventLoop::new(backend, handler, Arc::clone(&signals), cfg);

    lp.run_event_loop(server_fd).unwrap();
    client.join().unwrap();

    assert_eq!(lp.handler().received, b"ping");
    assert!(lp.context().table.is_empty());
    syscalls::close_fd(server_fd);
}
