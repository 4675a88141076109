//! Circuit state types.

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

/// The three states a circuit can be in. There is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    /// Normal operation: calls run the guarded command.
    #[default]
    Closed,
    /// Failing fast: calls go straight to the fallback.
    Open,
    /// Cooldown elapsed: the next outcome decides between closed and open.
    HalfOpen,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Closed => write!(f, "closed"),
            State::Open => write!(f, "open"),
            State::HalfOpen => write!(f, "halfopen"),
        }
    }
}

/// Everything guarded by the breaker's transition lock.
#[derive(Debug, Default)]
pub(crate) struct Circuit {
    pub state: State,
    /// Pending open → half-open timer, if any.
    pub reset_timer: Option<JoinHandle<()>>,
    /// Bumped whenever the pending timer is replaced or cancelled. A timer only
    /// fires its transition if the epoch it was scheduled under is still current.
    pub reset_epoch: u64,
}

impl Circuit {
    /// Cancel the pending reset timer and invalidate any timer already past its
    /// sleep. Returns the new epoch.
    pub fn cancel_reset_timer(&mut self) -> u64 {
        if let Some(timer) = self.reset_timer.take() {
            timer.abort();
        }
        self.reset_epoch = self.reset_epoch.wrapping_add(1);
        self.reset_epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_closed() {
        assert_eq!(State::default(), State::Closed);
        assert_eq!(Circuit::default().state, State::Closed);
    }

    #[test]
    fn display_and_serde_agree() {
        for state in [State::Closed, State::Open, State::HalfOpen] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{state}\""));
            let back: State = serde_json::from_str(&json).unwrap();
            assert_eq!(back, state);
        }
    }

    #[test]
    fn cancelling_advances_epoch() {
        let mut circuit = Circuit::default();
        let first = circuit.cancel_reset_timer();
        let second = circuit.cancel_reset_timer();
        assert_ne!(first, second);
        assert!(circuit.reset_timer.is_none());
    }
}
