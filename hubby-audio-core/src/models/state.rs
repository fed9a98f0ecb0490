/// Observable lifecycle of an engine.
///
/// ```text
/// idle → running → stopping → idle
/// ```
///
/// `Stopping` covers the window between the flag being cleared and the worker
/// finishing its teardown (header patch, file close, device release).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Stopping,
}

impl EngineState {
    pub(crate) fn from_flags(flag_set: bool, worker_alive: bool) -> Self {
        match (flag_set, worker_alive) {
            (true, _) => Self::Running,
            (false, true) => Self::Stopping,
            (false, false) => Self::Idle,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}
