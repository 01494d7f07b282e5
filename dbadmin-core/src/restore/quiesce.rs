//! Deciding how to bring a server down before its files are replaced.

use crate::control::ServerState;
use crate::utils::errors::Sentinel;

/// Outcome of the previous stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopAttempt {
    pub forced: bool,
    pub succeeded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuiesceAction {
    Stop { force: bool },
    Proceed,
    Abort(Sentinel),
}

/// Next step given the reported `state` and the last stop attempt, if any.
///
/// A full restore discards live state, so the server is killed outright.
/// Replaying the log needs a clean shutdown when one is possible: graceful
/// first, then a kill. A state that is neither running nor stopped is never
/// touched.
pub fn next_quiesce_action(replay_log: bool, state: &ServerState, last: Option<StopAttempt>) -> QuiesceAction {
    match (replay_log, last) {
        (false, None) => QuiesceAction::Stop { force: true },
        (_, Some(StopAttempt { succeeded: true, .. })) => QuiesceAction::Proceed,
        // Killing a server that was not running is expected to fail.
        (false, Some(_)) if *state == ServerState::Stopped => QuiesceAction::Proceed,
        (false, Some(_)) => QuiesceAction::Abort(Sentinel::StopStartFailed),
        (true, None) => match state {
            ServerState::Running => QuiesceAction::Stop { force: false },
            ServerState::Stopped => QuiesceAction::Proceed,
            ServerState::Other(_) => QuiesceAction::Abort(Sentinel::UnknownState),
        },
        (true, Some(StopAttempt { forced: false, .. })) => QuiesceAction::Stop { force: true },
        (true, Some(StopAttempt { forced: true, .. })) => QuiesceAction::Abort(Sentinel::StopStartFailed),
    }
}
