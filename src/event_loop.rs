// src/event_loop.rs
use std::os::fd::RawFd;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::backend::{Direction, ReadinessBackend, ReadyList, WaitStatus};
use crate::config::LoopConfig;
use crate::conn::Conn;
use crate::error::NocturneResult;
use crate::signals::{SignalFlags, TERM_STAGE1, TERM_STAGE2};
use crate::sweep;
use crate::table::ConnTable;

/// External request processor the loop collaborates with. Parsing, response
/// generation and CGI plumbing live behind this boundary.
pub trait RequestHandler {
    /// Service the Ready set; may accept new connections when the
    /// pending-accept flag is set, and move connections between sets.
    fn process_requests(&mut self, server_fd: RawFd, ctx: &mut LoopContext) -> NocturneResult<()>;

    /// Record a diagnostic for a connection that exceeded the absolute timeout.
    fn log_error_doc(&mut self, conn: &Conn);

    fn on_hangup(&mut self) {}
    fn on_child_reap(&mut self) {}
    fn on_alarm(&mut self) {}
}

/// Loop-owned state threaded explicitly through the sweep and the request
/// processor; there is no ambient global.
pub struct LoopContext {
    pub table: ConnTable,
    /// Tick clock, Unix seconds: refreshed once per iteration, right after
    /// the wait returns, so all timeout arithmetic in an iteration agrees.
    pub now: u64,
    pending_accept: bool,
    accepting: bool,
}

impl LoopContext {
    fn new(cfg: &LoopConfig) -> Self {
        Self {
            table: ConnTable::new(cfg.max_connections),
            now: unix_now(),
            pending_accept: false,
            accepting: true,
        }
    }

    /// Consume the pending-accept flag. Returns false once admission stopped.
    pub fn take_pending_accept(&mut self) -> bool {
        std::mem::take(&mut self.pending_accept) && self.accepting
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }
}

/// Single-threaded cooperative event loop. The only suspension point is the
/// backend wait; signal flags are consumed at the top of every iteration.
pub struct EventLoop<B, H> {
    backend: B,
    handler: H,
    signals: Arc<SignalFlags>,
    cfg: LoopConfig,
    ctx: LoopContext,
    ready: ReadyList,
}

impl<B, H> EventLoop<B, H>
where
    B: ReadinessBackend,
    H: RequestHandler,
{
    pub fn new(backend: B, handler: H, signals: Arc<SignalFlags>, cfg: LoopConfig) -> Self {
        let ctx = LoopContext::new(&cfg);
        let ready = ReadyList::with_capacity(cfg.event_capacity);
        Self {
            backend,
            handler,
            signals,
            cfg,
            ctx,
            ready,
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn context(&self) -> &LoopContext {
        &self.ctx
    }

    /// Drive the loop until stage-2 shutdown (`Ok`) or a fatal backend
    /// failure (`Err`). Never returns otherwise.
    pub fn run_event_loop(&mut self, server_fd: RawFd) -> NocturneResult<()> {
        self.backend.watch(server_fd, Direction::Read)?;
        info!(server_fd, "event loop started");

        loop {
            if self.signals.take_hangup() {
                self.handler.on_hangup();
            }
            if self.signals.take_child() {
                self.handler.on_child_reap();
            }
            if self.signals.take_alarm() {
                self.handler.on_alarm();
            }

            match self.signals.terminate_stage() {
                TERM_STAGE1 => {
                    info!("graceful shutdown: admission stopped");
                    self.ctx.accepting = false;
                    self.ctx.pending_accept = false;
                    self.backend.unwatch(server_fd)?;
                    self.signals.advance_terminate();
                }
                TERM_STAGE2 if self.ctx.table.is_empty() => {
                    info!("graceful shutdown: connections drained, exiting");
                    return Ok(());
                }
                _ => {}
            }

            if self.ctx.table.blocked_count() > 0 {
                sweep::update_blocked(
                    &mut self.ctx.table,
                    &mut self.backend,
                    &mut self.handler,
                    &self.ready,
                    self.ctx.now,
                    &self.cfg,
                )?;
            }

            self.handler.process_requests(server_fd, &mut self.ctx)?;

            let timeout = compute_wait_timeout(
                self.ctx.table.ready_count(),
                self.ctx.table.blocked_count(),
                &self.cfg,
            );
            match self.backend.wait(&mut self.ready, timeout)? {
                WaitStatus::Interrupted => continue,
                WaitStatus::Stale => {
                    warn!("stale descriptor during wait, proceeding with partial results");
                }
                WaitStatus::Complete => {}
            }

            self.ctx.now = unix_now();

            if self.ctx.accepting && self.ready.is_ready(server_fd, Direction::Read) {
                self.ctx.pending_accept = true;
            }
        }
    }
}

/// Next wait timeout: drain the Ready set without blocking; otherwise bound
/// the wait by the keepalive window (request timeout when keepalive is
/// disabled). With nothing to watch the wait stays non-blocking so a newly
/// ready listener is picked up immediately.
pub fn compute_wait_timeout(ready: usize, blocked: usize, cfg: &LoopConfig) -> Duration {
    if ready > 0 {
        Duration::ZERO
    } else if blocked > 0 {
        let secs = if cfg.keepalive_timeout_secs > 0 {
            cfg.keepalive_timeout_secs
        } else {
            cfg.request_timeout_secs
        };
        Duration::from_secs(secs)
    } else {
        Duration::ZERO
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}
