use thiserror::Error;

/// Lifecycle of the single supervised backend.
///
/// `Failed` is treated like `Idle` for retry purposes: a later `start()`
/// is allowed from both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Idle,
    Starting,
    Running,
    Stopping,
    Failed,
}

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("invalid transition: {0:?} -> {1:?}")]
    InvalidTransition(State, State),
}

pub struct StateMachine {
    pub state: State,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self { state: State::Idle }
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_transition(&self, to: &State) -> bool {
        matches!(
            (&self.state, to),
            (State::Idle, State::Starting)
                | (State::Failed, State::Starting)
                | (State::Starting, State::Running)
                | (State::Starting, State::Failed)
                | (State::Starting, State::Idle)
                | (State::Running, State::Stopping)
                | (State::Running, State::Idle)
                | (State::Running, State::Failed)
                | (State::Stopping, State::Idle)
        )
    }

    pub fn transition(&mut self, to: State) -> Result<(), TransitionError> {
        if self.can_transition(&to) {
            tracing::info!("Backend state transition: {:?} -> {:?}", self.state, to);
            self.state = to;
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition(self.state.clone(), to))
        }
    }
}
