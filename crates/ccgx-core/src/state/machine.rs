//! Flash sequence state machine.
//!
//! `Idle -> Unlocking -> InfoRefresh -> Writing -> BootSwitching -> Resetting -> Done`
//!
//! Every state may fall into `Failed`; there are no other back-edges. A
//! failed sequence is restarted from `Idle` as a whole.

use std::fmt;

/// State of one flash sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlashState {
    #[default]
    Idle,
    Unlocking,
    InfoRefresh,
    Writing,
    BootSwitching,
    Resetting,
    Done,
    Failed,
}

impl fmt::Display for FlashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashState::Idle => write!(f, "IDLE"),
            FlashState::Unlocking => write!(f, "UNLOCKING"),
            FlashState::InfoRefresh => write!(f, "INFO_REFRESH"),
            FlashState::Writing => write!(f, "WRITING"),
            FlashState::BootSwitching => write!(f, "BOOT_SWITCHING"),
            FlashState::Resetting => write!(f, "RESETTING"),
            FlashState::Done => write!(f, "DONE"),
            FlashState::Failed => write!(f, "FAILED"),
        }
    }
}

impl FlashState {
    /// The state that follows on success.
    pub fn next(self) -> Option<Self> {
        match self {
            FlashState::Idle => Some(FlashState::Unlocking),
            FlashState::Unlocking => Some(FlashState::InfoRefresh),
            FlashState::InfoRefresh => Some(FlashState::Writing),
            FlashState::Writing => Some(FlashState::BootSwitching),
            FlashState::BootSwitching => Some(FlashState::Resetting),
            FlashState::Resetting => Some(FlashState::Done),
            FlashState::Done | FlashState::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FlashState::Done | FlashState::Failed)
    }
}

/// Runtime state of one flash sequence.
#[derive(Debug, Default)]
pub struct FlashStateMachine {
    /// Current state.
    pub state: FlashState,
    /// Rows in the image being written.
    pub rows_total: usize,
    /// Rows acknowledged by the transport.
    pub rows_done: usize,
    /// Row address that aborted the write, if any.
    pub failed_row: Option<u16>,
}

impl FlashStateMachine {
    pub fn new(rows_total: usize) -> Self {
        Self {
            rows_total,
            ..Default::default()
        }
    }

    /// Advance to the next linear state and return it.
    pub fn advance(&mut self) -> FlashState {
        let next = self.state.next().unwrap_or(self.state);
        self.goto_state(next);
        next
    }

    /// Abort the sequence.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.goto_state(FlashState::Failed);
        }
    }

    pub fn row_done(&mut self) {
        self.rows_done += 1;
    }

    fn goto_state(&mut self, new_state: FlashState) {
        tracing::debug!(from = %self.state, to = %new_state, "State transition");
        self.state = new_state;
    }
}
