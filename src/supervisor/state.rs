//! Per-supervisor `ProcessState` and the transition table from spec §4.4.

#[cfg_attr(doc, aquamarine::aquamarine)]
/// ```mermaid
/// stateDiagram-v2
///     [*] --> Idle
///     Idle --> Starting: start
///     Starting --> Running: health gate passes
///     Starting --> BackingOff: spawn failed
///     Starting --> Failed: startup budget exhausted
///     BackingOff --> Starting: backoff timer elapsed
///     Running --> Stopping: stop / unhealthy (liveness)
///     Running --> BackingOff: instance exit (restartable)
///     Stopping --> Stopped: all instances stopped
///     Stopping --> Stopped: escalation timeout
///     Stopped --> Starting: start
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Idle,
    Starting,
    Running,
    Degraded,
    BackingOff,
    Stopping,
    Stopped,
    Failed,
}

impl ProcessState {
    pub fn is_terminal_for_shutdown(&self) -> bool {
        matches!(self, ProcessState::Stopped)
    }

    pub fn is_live(&self) -> bool {
        matches!(
            self,
            ProcessState::Starting
                | ProcessState::Running
                | ProcessState::Degraded
                | ProcessState::BackingOff
        )
    }
}
