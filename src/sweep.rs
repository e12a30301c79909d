// src/sweep.rs
use tracing::{trace, warn};

use crate::backend::{ReadinessBackend, ReadyList};
use crate::config::LoopConfig;
use crate::conn::ConnState;
use crate::event_loop::RequestHandler;
use crate::error::NocturneResult;
use crate::table::{ConnTable, Membership};
use crate::watch::desired_watch;

/// One pass over the Blocked set: apply timeout rules against the tick-clock
/// snapshot, then promote connections whose readiness the previous wait
/// already satisfied, re-arming interest for the rest.
pub fn update_blocked<B, H>(
    table: &mut ConnTable,
    backend: &mut B,
    handler: &mut H,
    ready: &ReadyList,
    now: u64,
    cfg: &LoopConfig,
) -> NocturneResult<()>
where
    B: ReadinessBackend,
    H: RequestHandler,
{
    for idx in table.blocked_indices() {
        // The snapshot may be stale: servicing an earlier entry cannot move
        // this one, but stay defensive about membership anyway.
        if table.membership(idx) != Some(Membership::Blocked) {
            continue;
        }
        let Some(conn) = table.get_mut(idx) else {
            continue;
        };

        let elapsed = now.saturating_sub(conn.last_active);
        let mut timed_out = false;
        if conn.keepalive_count < cfg.max_keepalive_reuses
            && elapsed >= cfg.keepalive_timeout_secs
            && !conn.has_request_line
        {
            // Routine keepalive expiry: silent.
            conn.state = ConnState::Dead;
        } else if elapsed > cfg.request_timeout_secs {
            conn.state = ConnState::Dead;
            timed_out = true;
        }

        let watch = desired_watch(conn.state, conn.output_pending)
            .map(|(role, dir)| (conn.role_fd(role), dir));

        if timed_out {
            if let Some(conn) = table.get(idx) {
                warn!(fd = conn.fd, elapsed, "connection timed out");
                handler.log_error_doc(conn);
            }
        }

        match watch {
            // Dead connections are immediately actionable; no backend query.
            None => table.ready_request(idx),
            Some((fd, dir)) => {
                if ready.is_ready(fd, dir) {
                    trace!(fd, "blocked connection promoted");
                    table.ready_request(idx);
                } else {
                    backend.watch(fd, dir)?;
                }
            }
        }
    }
    Ok(())
}
