// src/lib.rs
//
// nocturne: the readiness-driven multiplexing engine of a single-process
// HTTP server. One loop, two interchangeable OS backends (level-triggered
// epoll, edge-triggered kqueue), a shared watch policy, and a timeout sweep
// over the blocked connection set.
pub mod backend;
pub mod config;
pub mod conn;
pub mod error;
pub mod event_loop;
pub mod signals;
pub mod sweep;
pub mod syscalls;
pub mod table;
pub mod watch;

// Re-exports for users
pub use backend::{DefaultBackend, Direction, ReadinessBackend, ReadyList, WaitStatus};
pub use config::LoopConfig;
pub use conn::{Conn, ConnState, FdRole};
pub use error::{NocturneError, NocturneResult};
pub use event_loop::{EventLoop, LoopContext, RequestHandler};
pub use signals::SignalFlags;
pub use table::{ConnTable, Membership};
pub use watch::desired_watch;
