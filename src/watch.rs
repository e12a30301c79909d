// src/watch.rs
//
// Single source of truth for "what should this connection be watched for",
// shared by every backend and by the timeout sweep.
use crate::backend::Direction;
use crate::conn::{ConnState, FdRole};

/// Map a connection's state and buffered-output flag to the descriptor role
/// and direction it must next be watched on. `None` means the connection is
/// always ready and needs no OS wait (only `Dead` connections qualify).
///
/// Unflushed output takes priority over the state dispatch: nothing else can
/// make progress until the client socket drains.
pub fn desired_watch(state: ConnState, output_pending: bool) -> Option<(FdRole, Direction)> {
    if output_pending && state != ConnState::Dead {
        return Some((FdRole::Client, Direction::Write));
    }

    match state {
        ConnState::Writing | ConnState::Done => Some((FdRole::Client, Direction::Write)),
        ConnState::PipeWriting | ConnState::BodyWriting => {
            Some((FdRole::PipeOut, Direction::Write))
        }
        ConnState::PipeReading => Some((FdRole::PipeIn, Direction::Read)),
        ConnState::Dead => None,
        ConnState::Reading => Some((FdRole::Client, Direction::Read)),
    }
}
